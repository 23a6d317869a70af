//! Shared-memory audio frame ring with a fixed header layout.
//!
//! Frames are stored interleaved at `channel_capacity` stride; cursors are
//! absolute frame counts, so the ring position is `cursor % capacity`. The
//! producer owns `write_frame` and the overrun counter, the consumer owns
//! `read_frame`. Under the drop-oldest policy the producer never waits:
//! it overwrites the oldest frames, advances its cursor by the full push,
//! and the consumer reconciles its own cursor when it notices the gap.

use crate::error::{Error, Result};
use crate::shm::SharedRegion;
use cadenza_core::AudioBus;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Fixed-width header at the front of the shared region.
#[repr(C)]
pub struct FrameRingHeader {
    sample_rate_hz: AtomicU32,
    channel_count: AtomicU32,
    channel_capacity: AtomicU32,
    capacity_frames: AtomicU32,
    read_frame: AtomicU64,
    write_frame: AtomicU64,
    overrun_frames_total: AtomicU64,
    /// Seqlock word for the timeline anchor: 0 = unset, odd = write in
    /// progress, even = stable.
    timeline_generation: AtomicU64,
    timeline_sample_rate: AtomicU32,
    _reserved: u32,
    timeline_media_start_frame: AtomicU64,
    timeline_media_start_at_ring_frame: AtomicU64,
}

pub const FRAME_RING_HEADER_LEN: usize = std::mem::size_of::<FrameRingHeader>();

const _: () = assert!(FRAME_RING_HEADER_LEN % std::mem::align_of::<f32>() == 0);

/// Negotiated ring format, mirrored into the header on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRingFormat {
    pub sample_rate_hz: u32,
    pub channel_count: u32,
    pub channel_capacity: u32,
    pub capacity_frames: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Overwrite the oldest unread frames; the producer never waits.
    DropOldest,
    /// Write only what fits; surplus frames are discarded at the tail.
    Reject,
}

/// Translates ring frame positions to presentation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineAnchor {
    pub sample_rate: u32,
    pub media_start_frame: u64,
    pub ring_frame_at_media_start: u64,
}

/// Region size needed for a ring of the given format.
pub fn frame_ring_region_len(format: &FrameRingFormat) -> usize {
    FRAME_RING_HEADER_LEN
        + format.capacity_frames as usize
            * format.channel_capacity as usize
            * std::mem::size_of::<f32>()
}

// SAFETY (shared by both halves): the header sits at offset 0 of a
// page-aligned mapping, so all atomic fields are naturally aligned; the
// region outlives the handle via Arc.
fn header(region: &SharedRegion) -> &FrameRingHeader {
    unsafe { &*(region.as_ptr() as *const FrameRingHeader) }
}

fn sample_ptr(region: &SharedRegion) -> *mut f32 {
    // SAFETY: the header length is a multiple of f32 alignment.
    unsafe { region.as_ptr().add(FRAME_RING_HEADER_LEN) as *mut f32 }
}

fn validate_len(region: &SharedRegion, format: &FrameRingFormat) -> Result<()> {
    if format.capacity_frames == 0
        || format.channel_count == 0
        || format.channel_count > format.channel_capacity
    {
        return Err(Error::InvalidCapacity(format.capacity_frames as usize));
    }
    let needed = frame_ring_region_len(format);
    if region.len() < needed {
        return Err(Error::RegionTooSmall {
            needed,
            mapped: region.len(),
        });
    }
    Ok(())
}

fn read_format(region: &SharedRegion) -> FrameRingFormat {
    let hdr = header(region);
    FrameRingFormat {
        sample_rate_hz: hdr.sample_rate_hz.load(Ordering::Acquire),
        channel_count: hdr.channel_count.load(Ordering::Acquire),
        channel_capacity: hdr.channel_capacity.load(Ordering::Acquire),
        capacity_frames: hdr.capacity_frames.load(Ordering::Acquire),
    }
}

/// Producer half.
pub struct FrameRingProducer {
    region: Arc<SharedRegion>,
    format: FrameRingFormat,
    policy: OverflowPolicy,
}

impl FrameRingProducer {
    /// Initializes the header of a freshly created region.
    pub fn new(
        region: Arc<SharedRegion>,
        format: FrameRingFormat,
        policy: OverflowPolicy,
    ) -> Result<Self> {
        validate_len(&region, &format)?;
        let hdr = header(&region);
        hdr.read_frame.store(0, Ordering::Relaxed);
        hdr.write_frame.store(0, Ordering::Relaxed);
        hdr.overrun_frames_total.store(0, Ordering::Relaxed);
        hdr.timeline_generation.store(0, Ordering::Relaxed);
        hdr.sample_rate_hz
            .store(format.sample_rate_hz, Ordering::Release);
        hdr.channel_count
            .store(format.channel_count, Ordering::Release);
        hdr.channel_capacity
            .store(format.channel_capacity, Ordering::Release);
        hdr.capacity_frames
            .store(format.capacity_frames, Ordering::Release);
        Ok(Self {
            region,
            format,
            policy,
        })
    }

    /// Attaches to a ring another process initialized, checking the
    /// header's channel count against the caller's expectation.
    pub fn attach(
        region: Arc<SharedRegion>,
        expected_channels: u32,
        policy: OverflowPolicy,
    ) -> Result<Self> {
        let format = read_format(&region);
        validate_len(&region, &format)?;
        if format.channel_count != expected_channels {
            return Err(Error::FormatMismatch {
                header: format.channel_count,
                expected: expected_channels,
            });
        }
        Ok(Self {
            region,
            format,
            policy,
        })
    }

    pub fn format(&self) -> FrameRingFormat {
        self.format
    }

    /// Pushes interleaved frames (stride = `channel_count`). Returns the
    /// number of frames accepted. Under `DropOldest` this is always the
    /// full push; dropped-over frames go into the overrun counter.
    pub fn try_push_interleaved(&mut self, samples: &[f32]) -> usize {
        let channels = self.format.channel_count as usize;
        let frames = samples.len() / channels;
        if frames == 0 {
            return 0;
        }
        let capacity = self.format.capacity_frames as u64;
        let hdr = header(&self.region);
        let read = hdr.read_frame.load(Ordering::Acquire);
        let write = hdr.write_frame.load(Ordering::Relaxed);
        let free = (capacity - (write - read).min(capacity)) as usize;

        let (accepted, skip) = match self.policy {
            OverflowPolicy::Reject => (frames.min(free), 0),
            OverflowPolicy::DropOldest => {
                // Only the newest `capacity` frames of an oversized push
                // can survive at all.
                let survivors = frames.min(capacity as usize);
                (frames, frames - survivors)
            }
        };
        if accepted == 0 {
            return 0;
        }

        let stride = self.format.channel_capacity as usize;
        let data = sample_ptr(&self.region);
        let stored = accepted - skip;
        for i in 0..stored {
            let frame = write + (skip + i) as u64;
            let slot = (frame % capacity) as usize * stride;
            let src = &samples[(skip + i) * channels..(skip + i + 1) * channels];
            // SAFETY: slot + channels <= capacity_frames * stride; the
            // consumer reconciles around overwritten frames on its side.
            unsafe {
                std::ptr::copy_nonoverlapping(src.as_ptr(), data.add(slot), channels);
            }
        }

        if let OverflowPolicy::DropOldest = self.policy {
            let in_flight = (write - read).min(capacity) as usize;
            let overrun = (in_flight + accepted).saturating_sub(capacity as usize);
            if overrun > 0 {
                hdr.overrun_frames_total
                    .fetch_add(overrun as u64, Ordering::Release);
            }
        }
        hdr.write_frame
            .store(write + accepted as u64, Ordering::Release);
        accepted
    }

    /// Publishes a timeline anchor with a seqlock so the consumer never
    /// observes a torn anchor.
    pub fn set_timeline(&mut self, anchor: TimelineAnchor) {
        let hdr = header(&self.region);
        let generation = hdr.timeline_generation.load(Ordering::Relaxed);
        let odd = generation | 1;
        hdr.timeline_generation.store(odd, Ordering::Release);
        hdr.timeline_sample_rate
            .store(anchor.sample_rate, Ordering::Relaxed);
        hdr.timeline_media_start_frame
            .store(anchor.media_start_frame, Ordering::Relaxed);
        hdr.timeline_media_start_at_ring_frame
            .store(anchor.ring_frame_at_media_start, Ordering::Relaxed);
        hdr.timeline_generation.store(odd + 1, Ordering::Release);
    }
}

/// Consumer half.
pub struct FrameRingConsumer {
    region: Arc<SharedRegion>,
    format: FrameRingFormat,
}

impl FrameRingConsumer {
    pub fn attach(region: Arc<SharedRegion>) -> Result<Self> {
        let format = read_format(&region);
        validate_len(&region, &format)?;
        Ok(Self { region, format })
    }

    pub fn format(&self) -> FrameRingFormat {
        self.format
    }

    /// Frames readable right now (after reconciling any producer overrun).
    pub fn available_frames(&mut self) -> usize {
        let (read, write) = self.reconcile();
        (write - read) as usize
    }

    pub fn overrun_frames_total(&self) -> u64 {
        header(&self.region)
            .overrun_frames_total
            .load(Ordering::Acquire)
    }

    /// Pops up to `bus.frame_count()` frames planar into the bus and
    /// returns the count. Channels beyond the ring's count are zeroed.
    pub fn try_pop(&mut self, bus: &mut AudioBus) -> usize {
        let (read, write) = self.reconcile();
        let count = bus.frame_count().min((write - read) as usize);
        if count == 0 {
            return 0;
        }

        let capacity = self.format.capacity_frames as u64;
        let stride = self.format.channel_capacity as usize;
        let channels = (self.format.channel_count as usize).min(bus.channel_count());
        let data = sample_ptr(&self.region);
        for ch in 0..bus.channel_count() {
            if ch >= channels {
                bus.channel_mut(ch)[..count].fill(0.0);
            }
        }
        for i in 0..count {
            let slot = ((read + i as u64) % capacity) as usize * stride;
            for ch in 0..channels {
                // SAFETY: slot + ch < capacity_frames * stride; the frame
                // is published (behind the write cursor).
                bus.channel_mut(ch)[i] = unsafe { *data.add(slot + ch) };
            }
        }
        header(&self.region)
            .read_frame
            .store(read + count as u64, Ordering::Release);
        count
    }

    /// Discards up to `frames` frames for latency control; returns the
    /// count actually skipped.
    pub fn skip_frames(&mut self, frames: u64) -> u64 {
        let (read, write) = self.reconcile();
        let skipped = frames.min(write - read);
        if skipped > 0 {
            header(&self.region)
                .read_frame
                .store(read + skipped, Ordering::Release);
        }
        skipped
    }

    /// The current timeline anchor, or `None` when unset or mid-update.
    pub fn timeline(&self) -> Option<TimelineAnchor> {
        let hdr = header(&self.region);
        for _ in 0..8 {
            let before = hdr.timeline_generation.load(Ordering::Acquire);
            if before == 0 || before & 1 == 1 {
                return None;
            }
            let anchor = TimelineAnchor {
                sample_rate: hdr.timeline_sample_rate.load(Ordering::Relaxed),
                media_start_frame: hdr.timeline_media_start_frame.load(Ordering::Relaxed),
                ring_frame_at_media_start: hdr
                    .timeline_media_start_at_ring_frame
                    .load(Ordering::Relaxed),
            };
            if hdr.timeline_generation.load(Ordering::Acquire) == before {
                return Some(anchor);
            }
        }
        None
    }

    /// Moves the read cursor past frames the producer has overwritten and
    /// returns fresh (read, write) cursors.
    fn reconcile(&mut self) -> (u64, u64) {
        let capacity = self.format.capacity_frames as u64;
        let hdr = header(&self.region);
        let write = hdr.write_frame.load(Ordering::Acquire);
        let mut read = hdr.read_frame.load(Ordering::Relaxed);
        if write - read > capacity {
            read = write - capacity;
            hdr.read_frame.store(read, Ordering::Release);
        }
        (read, write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(capacity_frames: u32) -> FrameRingFormat {
        FrameRingFormat {
            sample_rate_hz: 48_000,
            channel_count: 2,
            channel_capacity: 2,
            capacity_frames,
        }
    }

    fn ring(
        tag: &str,
        capacity_frames: u32,
        policy: OverflowPolicy,
    ) -> (FrameRingProducer, FrameRingConsumer) {
        let fmt = format(capacity_frames);
        let name = format!("frame_ring_{tag}_{}", std::process::id());
        let region =
            Arc::new(SharedRegion::create(&name, frame_ring_region_len(&fmt)).unwrap());
        let producer = FrameRingProducer::new(Arc::clone(&region), fmt, policy).unwrap();
        let consumer = FrameRingConsumer::attach(region).unwrap();
        (producer, consumer)
    }

    fn interleaved(range: std::ops::Range<u32>) -> Vec<f32> {
        // Left = frame index, right = negated, so ordering slips show up.
        range
            .flat_map(|i| [i as f32, -(i as f32)])
            .collect()
    }

    #[test]
    fn test_push_pop_preserves_frames_planar() {
        let (mut producer, mut consumer) = ring("roundtrip", 64, OverflowPolicy::DropOldest);
        assert_eq!(producer.try_push_interleaved(&interleaved(0..48)), 48);

        let mut bus = AudioBus::new(2, 48);
        assert_eq!(consumer.try_pop(&mut bus), 48);
        for i in 0..48 {
            assert_eq!(bus.channel(0)[i], i as f32);
            assert_eq!(bus.channel(1)[i], -(i as f32));
        }
    }

    #[test]
    fn test_drop_oldest_keeps_newest_frames() {
        let (mut producer, mut consumer) = ring("dropold", 32, OverflowPolicy::DropOldest);
        // 48 frames into a 32-frame ring: the first 16 are dropped.
        assert_eq!(producer.try_push_interleaved(&interleaved(0..48)), 48);
        assert_eq!(consumer.overrun_frames_total(), 16);

        let mut bus = AudioBus::new(2, 32);
        assert_eq!(consumer.try_pop(&mut bus), 32);
        for i in 0..32 {
            assert_eq!(bus.channel(0)[i], (i + 16) as f32);
        }
    }

    #[test]
    fn test_overrun_counter_is_monotone() {
        let (mut producer, mut consumer) = ring("monotone", 16, OverflowPolicy::DropOldest);
        let mut last = 0;
        for round in 0..5u32 {
            producer.try_push_interleaved(&interleaved(round * 24..(round + 1) * 24));
            let total = consumer.overrun_frames_total();
            assert!(total >= last);
            last = total;
        }
        assert_eq!(last, 5 * 24 - 16);
    }

    #[test]
    fn test_reject_policy_truncates_at_capacity() {
        let (mut producer, mut consumer) = ring("reject", 32, OverflowPolicy::Reject);
        assert_eq!(producer.try_push_interleaved(&interleaved(0..48)), 32);
        assert_eq!(producer.try_push_interleaved(&interleaved(0..4)), 0);
        assert_eq!(consumer.overrun_frames_total(), 0);

        let mut bus = AudioBus::new(2, 32);
        assert_eq!(consumer.try_pop(&mut bus), 32);
        assert_eq!(bus.channel(0)[31], 31.0);
    }

    #[test]
    fn test_skip_frames_advances_past_backlog() {
        let (mut producer, mut consumer) = ring("skip", 64, OverflowPolicy::DropOldest);
        producer.try_push_interleaved(&interleaved(0..40));
        assert_eq!(consumer.skip_frames(25), 25);
        assert_eq!(consumer.available_frames(), 15);

        let mut bus = AudioBus::new(2, 15);
        consumer.try_pop(&mut bus);
        assert_eq!(bus.channel(0)[0], 25.0);
    }

    #[test]
    fn test_timeline_anchor_roundtrip() {
        let (mut producer, consumer) = ring("timeline", 16, OverflowPolicy::DropOldest);
        assert_eq!(consumer.timeline(), None);

        let anchor = TimelineAnchor {
            sample_rate: 44_100,
            media_start_frame: 1_000_000,
            ring_frame_at_media_start: 512,
        };
        producer.set_timeline(anchor);
        assert_eq!(consumer.timeline(), Some(anchor));

        // A second publish supersedes the first.
        let moved = TimelineAnchor {
            media_start_frame: 2_000_000,
            ..anchor
        };
        producer.set_timeline(moved);
        assert_eq!(consumer.timeline(), Some(moved));
    }

    #[test]
    fn test_attach_rejects_channel_mismatch() {
        let fmt = format(16);
        let name = format!("frame_ring_mismatch_{}", std::process::id());
        let region =
            Arc::new(SharedRegion::create(&name, frame_ring_region_len(&fmt)).unwrap());
        let _producer =
            FrameRingProducer::new(Arc::clone(&region), fmt, OverflowPolicy::DropOldest).unwrap();
        let result = FrameRingProducer::attach(region, 6, OverflowPolicy::DropOldest);
        assert!(matches!(
            result.err(),
            Some(Error::FormatMismatch { header: 2, expected: 6 })
        ));
    }

    #[test]
    fn test_header_layout_is_sample_aligned() {
        assert_eq!(FRAME_RING_HEADER_LEN % std::mem::align_of::<f32>(), 0);
    }
}
