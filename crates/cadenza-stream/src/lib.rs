//! Shared-memory audio transport and device sessions.
//!
//! Rings live in named shared-memory regions so sample data crosses the
//! process boundary without copies through the control plane. The control
//! plane itself is small serde/bincode messages: session creation, stream
//! bindings (published transactionally per graph update), format-change
//! invalidation.

pub mod bindings;
pub mod byte_ring;
pub mod descriptor;
pub mod error;
pub mod frame_ring;
pub mod protocol;
pub mod session;
pub mod shm;

pub use bindings::{
    allocate_binding, BindingPublisher, BindingTransport, PublishOutcome, StreamBinding,
};
pub use byte_ring::{byte_ring_region_len, ByteRingReader, ByteRingWriter};
pub use descriptor::RingStreamDescriptor;
pub use error::{Error, Result};
pub use frame_ring::{
    frame_ring_region_len, FrameRingConsumer, FrameRingFormat, FrameRingProducer, OverflowPolicy,
    TimelineAnchor,
};
pub use protocol::{ClientMessage, InvalidationReason, ServerMessage};
pub use session::{DeviceInfo, SessionEvent, SessionRegistry};
pub use shm::SharedRegion;
