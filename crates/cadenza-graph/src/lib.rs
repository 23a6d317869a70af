//! Audio graph model and real-time execution.
//!
//! The control thread mutates a [`LiveGraph`], snapshots it into an
//! immutable [`GraphDescription`] (which also round-trips through a
//! versioned wire encoding), and installs it on a [`GraphController`].
//! The paired [`GraphExecutor`] runs on the render thread and swaps
//! whole graph generations at quantum boundaries without allocating,
//! blocking, or taking locks.

pub mod bridge;
pub mod codec;
pub mod description;
pub mod error;
pub mod executor;
pub mod nodes;
pub mod snapshot;

pub use bridge::{BridgeEndpoint, BridgeService, ProcessorFn};
pub use codec::{GraphDescription, WIRE_VERSION};
pub use description::{
    AutomationEvent, AutomationKind, ChannelConfig, Connection, NodeDescription, NodeId, ParamKey,
    UpdateKind,
};
pub use error::{Error, Result};
pub use executor::{
    executor_pair, EngineUpdate, GraphController, GraphExecutor, UpdateSummary,
};
pub use nodes::{BuildContext, NoResources, RenderContext, RenderNode, ResourceResolver};
pub use snapshot::{LiveGraph, LiveNodeSpec};
