//! Device sessions and their registry.
//!
//! A session owns one direction of device audio: an output session holds
//! the consumer half of a ring the rendering process writes into, an
//! input stream holds the producer half of a ring capture data flows out
//! of. The registry is an explicit object scoped to the owning
//! connection, never a process singleton. Device format changes
//! invalidate every session bound to that device; each affected client
//! gets an event so it can rebuild its pipeline instead of producing
//! garbled audio.

use crate::descriptor::RingStreamDescriptor;
use crate::error::{Error, Result};
use crate::frame_ring::{
    frame_ring_region_len, FrameRingConsumer, FrameRingFormat, FrameRingProducer, OverflowPolicy,
};
use crate::protocol::InvalidationReason;
use crate::shm::SharedRegion;
use cadenza_core::AudioBus;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::HashMap;
use std::sync::Arc;

/// What the device enumeration collaborator tells us about one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
    pub sample_rate_hz: u32,
    pub channel_count: u32,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    OutputCreated {
        session_id: u64,
        descriptor: RingStreamDescriptor,
    },
    InputCreated {
        stream_id: u64,
        descriptor: RingStreamDescriptor,
    },
    Invalidated {
        session_id: u64,
        reason: InvalidationReason,
    },
}

struct OutputSession {
    device_id: String,
    consumer: FrameRingConsumer,
    /// Keeps the mapping (and the creator-side unlink) alive.
    _region: Arc<SharedRegion>,
    underrun_frames: u64,
}

struct InputStream {
    device_id: String,
    producer: FrameRingProducer,
    _region: Arc<SharedRegion>,
}

pub struct SessionRegistry {
    next_id: u64,
    quantum_size: usize,
    /// Prefix for shared-memory segment names, so registries of separate
    /// connections never collide.
    namespace: String,
    devices: HashMap<String, DeviceInfo>,
    outputs: HashMap<u64, OutputSession>,
    inputs: HashMap<u64, InputStream>,
    events: Sender<SessionEvent>,
}

impl SessionRegistry {
    pub fn new(namespace: &str, quantum_size: usize) -> (Self, Receiver<SessionEvent>) {
        let (events, receiver) = unbounded();
        (
            Self {
                next_id: 1,
                quantum_size,
                namespace: namespace.to_string(),
                devices: HashMap::new(),
                outputs: HashMap::new(),
                inputs: HashMap::new(),
                events,
            },
            receiver,
        )
    }

    pub fn register_device(&mut self, info: DeviceInfo) {
        self.devices.insert(info.id.clone(), info);
    }

    pub fn device(&self, device_id: &str) -> Option<&DeviceInfo> {
        self.devices.get(device_id)
    }

    /// Negotiates an output session: the ring is sized to the requested
    /// latency at the device rate, rounded up to a whole number of render
    /// quanta. Returns the descriptor the rendering process attaches its
    /// producer to.
    pub fn create_output_session(
        &mut self,
        device_id: &str,
        target_latency_ms: u32,
    ) -> Result<(u64, RingStreamDescriptor)> {
        let device = self
            .devices
            .get(device_id)
            .ok_or_else(|| Error::UnknownDevice(device_id.to_string()))?
            .clone();
        let capacity_frames = self.latency_frames(device.sample_rate_hz, target_latency_ms);
        let format = FrameRingFormat {
            sample_rate_hz: device.sample_rate_hz,
            channel_count: device.channel_count,
            channel_capacity: device.channel_count,
            capacity_frames,
        };

        let session_id = self.next_id;
        self.next_id += 1;
        let shm_name = format!("{}_out_{session_id}", self.namespace);
        let region = Arc::new(SharedRegion::create(
            &shm_name,
            frame_ring_region_len(&format),
        )?);
        // Initialize the header producer-side conventions, then keep only
        // the consumer half; the render process attaches as producer.
        FrameRingProducer::new(Arc::clone(&region), format, OverflowPolicy::DropOldest)?;
        let consumer = FrameRingConsumer::attach(Arc::clone(&region))?;

        let descriptor = RingStreamDescriptor {
            stream_id: session_id,
            format,
            policy: OverflowPolicy::DropOldest,
            shm_name,
            notify_token: Some(format!("out_evt_{session_id}")),
        };
        self.outputs.insert(
            session_id,
            OutputSession {
                device_id: device.id,
                consumer,
                _region: region,
                underrun_frames: 0,
            },
        );
        let _ = self.events.send(SessionEvent::OutputCreated {
            session_id,
            descriptor: descriptor.clone(),
        });
        Ok((session_id, descriptor))
    }

    pub fn destroy_output_session(&mut self, session_id: u64) -> Result<()> {
        self.outputs
            .remove(&session_id)
            .map(|_| ())
            .ok_or(Error::UnknownSession(session_id))
    }

    /// Creates an input stream with an explicit format and overflow
    /// policy; the registry keeps the producer half for the capture
    /// callback.
    pub fn create_input_stream(
        &mut self,
        device_id: &str,
        sample_rate_hz: u32,
        channel_count: u32,
        capacity_frames: u32,
        policy: OverflowPolicy,
    ) -> Result<(u64, RingStreamDescriptor)> {
        if !self.devices.contains_key(device_id) {
            return Err(Error::UnknownDevice(device_id.to_string()));
        }
        let format = FrameRingFormat {
            sample_rate_hz,
            channel_count,
            channel_capacity: channel_count,
            capacity_frames,
        };
        let stream_id = self.next_id;
        self.next_id += 1;
        let shm_name = format!("{}_in_{stream_id}", self.namespace);
        let region = Arc::new(SharedRegion::create(
            &shm_name,
            frame_ring_region_len(&format),
        )?);
        let producer = FrameRingProducer::new(Arc::clone(&region), format, policy)?;

        let descriptor = RingStreamDescriptor {
            stream_id,
            format,
            policy,
            shm_name,
            notify_token: Some(format!("in_evt_{stream_id}")),
        };
        self.inputs.insert(
            stream_id,
            InputStream {
                device_id: device_id.to_string(),
                producer,
                _region: region,
            },
        );
        let _ = self.events.send(SessionEvent::InputCreated {
            stream_id,
            descriptor: descriptor.clone(),
        });
        Ok((stream_id, descriptor))
    }

    pub fn destroy_input_stream(&mut self, stream_id: u64) -> Result<()> {
        self.inputs
            .remove(&stream_id)
            .map(|_| ())
            .ok_or(Error::UnknownSession(stream_id))
    }

    /// Called from the device callback: pulls one callback's worth of
    /// frames for an output session. Frames the ring could not supply are
    /// zeroed and added to the session's monotone underrun counter.
    pub fn pull_output(&mut self, session_id: u64, bus: &mut AudioBus) -> Result<usize> {
        let session = self
            .outputs
            .get_mut(&session_id)
            .ok_or(Error::UnknownSession(session_id))?;
        let wanted = bus.frame_count();
        let got = session.consumer.try_pop(bus);
        if got < wanted {
            for ch in 0..bus.channel_count() {
                bus.channel_mut(ch)[got..].fill(0.0);
            }
            session.underrun_frames += (wanted - got) as u64;
        }
        Ok(got)
    }

    /// Called from the capture callback: pushes captured interleaved
    /// frames into an input stream's ring.
    pub fn push_input(&mut self, stream_id: u64, samples: &[f32]) -> Result<usize> {
        let stream = self
            .inputs
            .get_mut(&stream_id)
            .ok_or(Error::UnknownSession(stream_id))?;
        Ok(stream.producer.try_push_interleaved(samples))
    }

    /// Cumulative underrun frames for a session; never decreases.
    pub fn underrun_frames(&self, session_id: u64) -> Result<u64> {
        self.outputs
            .get(&session_id)
            .map(|session| session.underrun_frames)
            .ok_or(Error::UnknownSession(session_id))
    }

    /// The device changed sample rate or channel count underneath live
    /// sessions. Every session bound to it is torn down and its client
    /// notified; sessions on other devices are untouched. Returns the
    /// invalidated session/stream ids.
    pub fn device_format_changed(&mut self, device_id: &str, updated: DeviceInfo) -> Vec<u64> {
        let mut invalidated: Vec<u64> = self
            .outputs
            .iter()
            .filter(|(_, session)| session.device_id == device_id)
            .map(|(&id, _)| id)
            .collect();
        invalidated.extend(
            self.inputs
                .iter()
                .filter(|(_, stream)| stream.device_id == device_id)
                .map(|(&id, _)| id),
        );
        invalidated.sort_unstable();

        for &session_id in &invalidated {
            self.outputs.remove(&session_id);
            self.inputs.remove(&session_id);
            let _ = self.events.send(SessionEvent::Invalidated {
                session_id,
                reason: InvalidationReason::DeviceFormatChanged,
            });
        }
        tracing::info!(
            device_id,
            count = invalidated.len(),
            "device format changed; sessions invalidated"
        );
        self.devices.insert(updated.id.clone(), updated);
        invalidated
    }

    fn latency_frames(&self, sample_rate_hz: u32, target_latency_ms: u32) -> u32 {
        let quantum = self.quantum_size as u64;
        let raw = (u64::from(sample_rate_hz) * u64::from(target_latency_ms)).div_ceil(1000);
        let rounded = raw.div_ceil(quantum).max(1) * quantum;
        rounded as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_ring::FrameRingProducer;

    fn device(id: &str, sample_rate_hz: u32, channels: u32) -> DeviceInfo {
        DeviceInfo {
            id: id.to_string(),
            label: format!("Test {id}"),
            sample_rate_hz,
            channel_count: channels,
            is_default: false,
        }
    }

    fn registry(tag: &str) -> (SessionRegistry, Receiver<SessionEvent>) {
        let namespace = format!("{tag}_{}", std::process::id());
        let (mut registry, events) = SessionRegistry::new(&namespace, 128);
        registry.register_device(device("speakers", 48_000, 2));
        registry.register_device(device("headset", 44_100, 2));
        (registry, events)
    }

    #[test]
    fn test_ring_sized_to_latency_in_whole_quanta() {
        let (mut registry, _events) = registry("latency");
        // 48 kHz x 20 ms = 960 frames, rounds up to 1024.
        let (_, descriptor) = registry.create_output_session("speakers", 20).unwrap();
        assert_eq!(descriptor.format.capacity_frames, 1024);

        // 44.1 kHz x 10 ms = 441 frames, rounds up to 512.
        let (_, descriptor) = registry.create_output_session("headset", 10).unwrap();
        assert_eq!(descriptor.format.capacity_frames, 512);
    }

    #[test]
    fn test_unknown_device_is_a_typed_error() {
        let (mut registry, _events) = registry("unknown");
        assert!(matches!(
            registry.create_output_session("toaster", 20),
            Err(Error::UnknownDevice(_))
        ));
    }

    #[test]
    fn test_underruns_accumulate_monotonically() {
        let (mut registry, _events) = registry("underrun");
        let (session_id, descriptor) = registry.create_output_session("speakers", 10).unwrap();

        // Attach the render-side producer and feed less than one pull.
        let region = Arc::new(
            SharedRegion::open(&descriptor.shm_name, frame_ring_region_len(&descriptor.format))
                .unwrap(),
        );
        let mut producer = FrameRingProducer::attach(region, 2, descriptor.policy).unwrap();
        let frames: Vec<f32> = (0..64).flat_map(|i| [i as f32, i as f32]).collect();
        producer.try_push_interleaved(&frames);

        let mut bus = AudioBus::new(2, 128);
        assert_eq!(registry.pull_output(session_id, &mut bus).unwrap(), 64);
        assert_eq!(registry.underrun_frames(session_id).unwrap(), 64);
        // The shortfall region was zeroed.
        assert_eq!(bus.channel(0)[63], 63.0);
        assert_eq!(bus.channel(0)[64], 0.0);

        // An empty pull adds a whole quantum.
        registry.pull_output(session_id, &mut bus).unwrap();
        assert_eq!(registry.underrun_frames(session_id).unwrap(), 64 + 128);
    }

    #[test]
    fn test_format_change_invalidates_only_bound_sessions() {
        let (mut registry, events) = registry("format_change");
        let (on_speakers, _) = registry.create_output_session("speakers", 10).unwrap();
        let (on_headset, _) = registry.create_output_session("headset", 10).unwrap();
        let (mic, _) = registry
            .create_input_stream("speakers", 48_000, 1, 1024, OverflowPolicy::DropOldest)
            .unwrap();
        while events.try_recv().is_ok() {} // drain creation events

        let invalidated =
            registry.device_format_changed("speakers", device("speakers", 96_000, 2));
        assert_eq!(invalidated, {
            let mut expected = vec![on_speakers, mic];
            expected.sort_unstable();
            expected
        });

        // The headset session survives; the speakers sessions are gone.
        assert!(registry.underrun_frames(on_headset).is_ok());
        assert!(matches!(
            registry.underrun_frames(on_speakers),
            Err(Error::UnknownSession(_))
        ));

        let mut reasons = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Invalidated { session_id, reason } = event {
                reasons.push((session_id, reason));
            }
        }
        assert_eq!(reasons.len(), 2);
        assert!(reasons
            .iter()
            .all(|(_, reason)| *reason == InvalidationReason::DeviceFormatChanged));

        // The registry now reports the new device format.
        assert_eq!(registry.device("speakers").unwrap().sample_rate_hz, 96_000);
    }

    #[test]
    fn test_destroyed_session_rejects_pulls() {
        let (mut registry, _events) = registry("destroyed");
        let (session_id, _) = registry.create_output_session("speakers", 10).unwrap();
        registry.destroy_output_session(session_id).unwrap();
        let mut bus = AudioBus::new(2, 128);
        assert!(matches!(
            registry.pull_output(session_id, &mut bus),
            Err(Error::UnknownSession(_))
        ));
    }
}
