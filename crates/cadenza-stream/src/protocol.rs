//! Session control protocol between the rendering process and the
//! device-owning process.
//!
//! The transport is a collaborator; the only contract relied on here is
//! exactly-once, in-order delivery of opaque byte buffers, so messages are
//! plain serde enums encoded with bincode.

use crate::descriptor::RingStreamDescriptor;
use crate::error::Result;
use crate::frame_ring::OverflowPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    CreateOutputSession {
        device_id: String,
        target_latency_ms: u32,
    },
    DestroyOutputSession {
        session_id: u64,
    },
    CreateInputStream {
        device_id: String,
        sample_rate_hz: u32,
        channel_count: u32,
        capacity_frames: u32,
        policy: OverflowPolicy,
    },
    DestroyInputStream {
        stream_id: u64,
    },
    /// Opaque wire-encoded render graph (see the graph codec).
    SetRenderGraph {
        encoded: Vec<u8>,
    },
    SetStreamBindings {
        bindings: Vec<RingStreamDescriptor>,
    },
    /// Generation-tagged so a stale suspend cannot override a newer
    /// resume that overtook it on another path.
    SetSuspended {
        generation: u64,
        suspended: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidationReason {
    DeviceFormatChanged,
    DeviceLost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    OutputSessionCreated {
        session_id: u64,
        descriptor: RingStreamDescriptor,
    },
    InputStreamCreated {
        stream_id: u64,
        descriptor: RingStreamDescriptor,
    },
    SessionInvalidated {
        session_id: u64,
        reason: InvalidationReason,
    },
    Error {
        message: String,
    },
}

impl ClientMessage {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

impl ServerMessage {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_roundtrip() {
        let message = ClientMessage::CreateOutputSession {
            device_id: "default".to_string(),
            target_latency_ms: 20,
        };
        let bytes = message.encode().unwrap();
        assert_eq!(ClientMessage::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn test_suspend_carries_generation() {
        let message = ClientMessage::SetSuspended {
            generation: 41,
            suspended: true,
        };
        let bytes = message.encode().unwrap();
        match ClientMessage::decode(&bytes).unwrap() {
            ClientMessage::SetSuspended {
                generation,
                suspended,
            } => {
                assert_eq!(generation, 41);
                assert!(suspended);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_decode_garbage_is_a_typed_error() {
        assert!(ServerMessage::decode(&[0xFF; 3]).is_err());
    }
}
