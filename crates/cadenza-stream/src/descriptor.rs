//! Control-plane description of a shared-memory ring stream.

use crate::frame_ring::{FrameRingFormat, OverflowPolicy};
use serde::{Deserialize, Serialize};

/// Everything a peer needs to attach to a ring: format, overflow policy,
/// the shared-memory segment name, and an optional notification token a
/// wake-up mechanism can be looked up by. The descriptor does not own the
/// ring; the session that allocated it does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingStreamDescriptor {
    pub stream_id: u64,
    pub format: FrameRingFormat,
    pub policy: OverflowPolicy,
    pub shm_name: String,
    pub notify_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_bincode_roundtrip() {
        let descriptor = RingStreamDescriptor {
            stream_id: 7,
            format: FrameRingFormat {
                sample_rate_hz: 48_000,
                channel_count: 2,
                channel_capacity: 2,
                capacity_frames: 4096,
            },
            policy: OverflowPolicy::DropOldest,
            shm_name: "out_7".to_string(),
            notify_token: Some("evt_7".to_string()),
        };
        let bytes = bincode::serialize(&descriptor).unwrap();
        let back: RingStreamDescriptor = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, descriptor);
    }
}
