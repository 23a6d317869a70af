//! Core render-thread kernel: audio buses, channel mixing, the graph wire
//! codec, and lock-free transport primitives.
//!
//! Everything here is usable from a real-time thread: no allocation after
//! construction, no blocking, no mutexes.

pub mod bus;
pub mod config;
pub mod diag;
pub mod error;
pub mod lockfree;
pub mod mixing;
pub mod wire;

pub use bus::AudioBus;
pub use config::EngineConfig;
pub use diag::ThrottleGate;
pub use error::{Error, Result};
pub use lockfree::{record_ring, AtomicCounter, AtomicFlag, AtomicFloat, RingConsumer, RingProducer};
pub use mixing::ChannelInterpretation;
pub use wire::{WireError, WireReader, WireWriter};

pub use std::sync::atomic::Ordering;

/// Default number of frames rendered per quantum.
pub const RENDER_QUANTUM_FRAMES: usize = 128;

/// Upper bound on channels any mixing path will touch.
pub const MAX_CHANNEL_COUNT: usize = 32;
