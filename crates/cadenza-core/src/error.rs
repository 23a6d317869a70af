//! Error types for cadenza-core.

use thiserror::Error;

/// Error type for cadenza-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Channel index {index} out of bounds ({count} channels)")]
    ChannelOutOfBounds { index: usize, count: usize },

    #[error("Channel count {requested} exceeds capacity {capacity}")]
    ChannelCapacityExceeded { requested: usize, capacity: usize },

    #[error("Ring capacity {0} is not a power of two")]
    InvalidRingCapacity(usize),

    #[error("Wire decode failed: {0}")]
    Wire(#[from] crate::wire::WireError),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
