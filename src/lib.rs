//! # Cadenza - Real-time Audio Render Graph Engine
//!
//! Engine core for a declarative audio graph rendered on a dedicated
//! real-time thread, built from modular subsystems.
//!
//! ## Architecture
//!
//! Cadenza is an umbrella crate that coordinates:
//! - **cadenza-core** - Audio buses, lock-free rings, wire primitives, config
//! - **cadenza-graph** - Node descriptions, snapshot/diff, render nodes,
//!   the render-thread executor, and the script-processor bridge
//! - **cadenza-stream** - Shared-memory rings, stream bindings, session
//!   control protocol, and device sessions
//!
//! ## Quick Start
//!
//! ```ignore
//! use cadenza::prelude::*;
//!
//! let engine = CadenzaEngine::builder()
//!     .sample_rate(48_000.0)
//!     .build()?;
//!
//! // Describe the graph
//! engine.edit_graph(|graph| {
//!     let dest = graph.add_node(LiveNodeSpec::Destination { channel_count: 2 });
//!     let osc = graph.add_node(LiveNodeSpec::Oscillator {
//!         waveform: Waveform::Sine,
//!         frequency: 440.0,
//!         detune: 0.0,
//!         start_time: 0.0,
//!         stop_time: -1.0,
//!     });
//!     graph.connect(osc, dest, 0, 0)
//! })?;
//! engine.commit()?;
//!
//! // Hand the render half to the device callback
//! let mut renderer = engine.take_renderer()?;
//! ```

/// Re-export of cadenza-core for direct access
pub use cadenza_core as core;

// Core types
pub use cadenza_core::{
    record_ring,
    // Lock-free primitives
    AtomicCounter,
    AtomicFlag,
    AtomicFloat,
    // Audio graph plumbing
    AudioBus,
    ChannelInterpretation,
    EngineConfig,
    RingConsumer,
    RingProducer,
    ThrottleGate,
    WireReader,
    WireWriter,
    MAX_CHANNEL_COUNT,
    RENDER_QUANTUM_FRAMES,
};

/// Re-export of cadenza-graph for direct access
pub use cadenza_graph as graph;

pub use cadenza_graph::{
    AutomationKind, GraphDescription, LiveGraph, LiveNodeSpec, NodeDescription, NodeId, ParamKey,
    UpdateKind, UpdateSummary,
};

pub use cadenza_graph::bridge::ProcessorFn;
pub use cadenza_graph::description::Waveform;

/// Re-export of cadenza-stream for direct access
pub use cadenza_stream as stream;

pub use cadenza_stream::{
    BindingPublisher, DeviceInfo, FrameRingFormat, OverflowPolicy, RingStreamDescriptor,
    SessionRegistry,
};

mod builder;
mod engine;
mod error;

pub use builder::CadenzaEngineBuilder;
pub use engine::{CadenzaEngine, Renderer};
pub use error::{Error, Result};

/// Convenience prelude for common imports
pub mod prelude {
    // Main engine
    pub use crate::{CadenzaEngine, CadenzaEngineBuilder, Renderer};

    // Essential types
    pub use crate::core::{AudioBus, EngineConfig};
    pub use crate::graph::{GraphDescription, LiveGraph, LiveNodeSpec, NodeId};
    pub use crate::graph::description::Waveform;

    // Streaming
    pub use crate::stream::{RingStreamDescriptor, SessionRegistry};
}
