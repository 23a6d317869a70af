//! Planar multi-channel sample buffer.

use crate::{Error, Result};

/// A planar audio buffer with a channel capacity distinct from its active
/// channel count.
///
/// Storage is one flat allocation of `channel_capacity * frame_count`
/// samples at a fixed per-channel stride, so the active channel count can
/// change between quanta without reallocating.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBus {
    samples: Vec<f32>,
    channel_count: usize,
    channel_capacity: usize,
    frame_count: usize,
}

impl Default for AudioBus {
    /// Zero-frame placeholder; allocates nothing.
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            channel_count: 0,
            channel_capacity: 0,
            frame_count: 0,
        }
    }
}

impl AudioBus {
    pub fn new(channel_count: usize, frame_count: usize) -> Self {
        Self::with_capacity(channel_count, channel_count, frame_count)
    }

    pub fn with_capacity(
        channel_count: usize,
        channel_capacity: usize,
        frame_count: usize,
    ) -> Self {
        let channel_capacity = channel_capacity.max(channel_count).max(1);
        Self {
            samples: vec![0.0; channel_capacity * frame_count],
            channel_count,
            channel_capacity,
            frame_count,
        }
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    #[inline]
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        let start = index * self.frame_count;
        &self.samples[start..start + self.frame_count]
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        let start = index * self.frame_count;
        &mut self.samples[start..start + self.frame_count]
    }

    /// Two disjoint mutable channels. Panics if `a == b`.
    pub fn channel_pair_mut(&mut self, a: usize, b: usize) -> (&mut [f32], &mut [f32]) {
        assert_ne!(a, b);
        let frames = self.frame_count;
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.samples.split_at_mut(hi * frames);
        let first = &mut head[lo * frames..lo * frames + frames];
        let second = &mut tail[..frames];
        if a < b {
            (first, second)
        } else {
            (second, first)
        }
    }

    /// Changes the active channel count within the existing allocation.
    /// Newly activated channels are zeroed.
    pub fn set_channel_count(&mut self, channel_count: usize) -> Result<()> {
        if channel_count > self.channel_capacity {
            return Err(Error::ChannelCapacityExceeded {
                requested: channel_count,
                capacity: self.channel_capacity,
            });
        }
        for ch in self.channel_count..channel_count {
            self.channel_mut(ch).fill(0.0);
        }
        self.channel_count = channel_count;
        Ok(())
    }

    /// Clones into a bus with a new channel capacity. Overlapping channels
    /// are copied, channels beyond the source are zero-filled.
    pub fn clone_with_capacity(&self, channel_capacity: usize) -> Self {
        let channel_capacity = channel_capacity.max(1);
        let mut out = Self::with_capacity(
            self.channel_count.min(channel_capacity),
            channel_capacity,
            self.frame_count,
        );
        let copy = self.channel_count.min(channel_capacity);
        for ch in 0..copy {
            out.channel_mut(ch).copy_from_slice(self.channel(ch));
        }
        out
    }

    pub fn zero(&mut self) {
        self.samples.fill(0.0);
    }

    /// Copies active channels from `other`; the active channel count follows
    /// the source. Frame counts and capacity must already match.
    pub fn copy_from(&mut self, other: &AudioBus) -> Result<()> {
        debug_assert_eq!(self.frame_count, other.frame_count);
        self.set_channel_count(other.channel_count)?;
        for ch in 0..self.channel_count {
            let start = ch * self.frame_count;
            self.samples[start..start + self.frame_count].copy_from_slice(other.channel(ch));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_are_fixed_stride() {
        let mut bus = AudioBus::with_capacity(2, 4, 8);
        bus.channel_mut(0).fill(1.0);
        bus.channel_mut(1).fill(2.0);
        assert!(bus.channel(0).iter().all(|&s| s == 1.0));
        assert!(bus.channel(1).iter().all(|&s| s == 2.0));
    }

    #[test]
    fn test_clone_with_larger_capacity_preserves_and_zero_fills() {
        let mut bus = AudioBus::new(2, 16);
        for (i, s) in bus.channel_mut(0).iter_mut().enumerate() {
            *s = i as f32;
        }
        for (i, s) in bus.channel_mut(1).iter_mut().enumerate() {
            *s = -(i as f32);
        }

        let mut grown = bus.clone_with_capacity(6);
        assert_eq!(grown.channel_capacity(), 6);
        assert_eq!(grown.channel(0), bus.channel(0));
        assert_eq!(grown.channel(1), bus.channel(1));

        grown.set_channel_count(6).unwrap();
        for ch in 2..6 {
            assert!(grown.channel(ch).iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn test_clone_with_smaller_capacity_truncates() {
        let mut bus = AudioBus::new(4, 8);
        bus.channel_mut(3).fill(7.0);
        let shrunk = bus.clone_with_capacity(2);
        assert_eq!(shrunk.channel_capacity(), 2);
        assert_eq!(shrunk.channel_count(), 2);
    }

    #[test]
    fn test_set_channel_count_zeroes_new_channels() {
        let mut bus = AudioBus::with_capacity(1, 4, 8);
        bus.channel_mut(0).fill(1.0);
        // Scribble into inactive storage, then activate it.
        bus.channel_mut(2).fill(9.0);
        bus.set_channel_count(3).unwrap();
        assert!(bus.channel(2).iter().all(|&s| s == 0.0));
        assert!(bus.channel(0).iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_set_channel_count_over_capacity_fails() {
        let mut bus = AudioBus::with_capacity(2, 2, 8);
        assert!(bus.set_channel_count(3).is_err());
    }
}
