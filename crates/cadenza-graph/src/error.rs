//! Error types for cadenza-graph.

use crate::description::NodeId;
use thiserror::Error;

/// Error type for graph description, snapshot, and executor operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Wire decode failed: {0}")]
    Wire(#[from] cadenza_core::WireError),

    #[error(transparent)]
    Core(#[from] cadenza_core::Error),

    #[error("Connection references unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("Graph has no destination node")]
    MissingDestination,

    #[error("Update queue is full")]
    UpdateQueueFull,

    #[error("Live graph handle {0:?} is no longer valid")]
    StaleHandle(NodeId),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
