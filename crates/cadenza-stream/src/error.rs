//! Error types for shared-memory streaming and device sessions.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("shared memory `{name}` unavailable: {source}")]
    SharedMemory {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("shared region too small: need {needed} bytes, mapped {mapped}")]
    RegionTooSmall { needed: usize, mapped: usize },

    #[error("ring capacity {0} is not valid (must be nonzero)")]
    InvalidCapacity(usize),

    #[error("ring format mismatch: header says {header} channels, caller expects {expected}")]
    FormatMismatch { header: u32, expected: u32 },

    #[error("unknown session {0}")]
    UnknownSession(u64),

    #[error("unknown device `{0}`")]
    UnknownDevice(String),

    #[error("stream binding publish failed: {0}")]
    PublishFailed(String),

    #[error("stream binding publish abandoned after {attempts} attempts")]
    PublishAbandoned { attempts: u32 },

    #[error("message codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error(transparent)]
    Core(#[from] cadenza_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
