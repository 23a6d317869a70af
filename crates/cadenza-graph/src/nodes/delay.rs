//! Fixed-capacity delay line.

use super::{RenderContext, RenderNode};
use crate::description::{DelayDescription, NodeDescription, ParamKey};
use cadenza_core::{AtomicFloat, AudioBus};

/// Per-channel circular delay line with linear interpolation for
/// fractional delays. Capacity is fixed at construction; the delay time is
/// a hot-swappable parameter clamped to `[0, max_delay_frames]`.
///
/// Feedback loops in the graph are expressed through this node; its output
/// for a quantum depends only on previously written input, so a cycle
/// through a delay never reads data from the current quantum.
pub struct DelayNode {
    delay_frames: AtomicFloat,
    max_delay_frames: f32,
    lines: Vec<Vec<f32>>,
    write_index: usize,
}

impl DelayNode {
    pub fn new(description: &DelayDescription, channels: usize, quantum_size: usize) -> Self {
        // One extra quantum of headroom so a full-delay read never lands on
        // the slot being written.
        let capacity = description.max_delay_frames as usize + quantum_size + 1;
        Self {
            delay_frames: AtomicFloat::new(description.delay_frames),
            max_delay_frames: description.max_delay_frames as f32,
            lines: (0..channels.max(1)).map(|_| vec![0.0; capacity]).collect(),
            write_index: 0,
        }
    }
}

impl RenderNode for DelayNode {
    fn process(&mut self, _ctx: &RenderContext, input: &AudioBus, output: &mut AudioBus) {
        let delay = self.delay_frames.get().clamp(0.0, self.max_delay_frames);
        let capacity = self.lines[0].len();
        let whole = delay.floor() as usize;
        let fraction = delay - whole as f32;

        let channels = self.lines.len().min(input.channel_count());
        let _ = output.set_channel_count(self.lines.len());

        for ch in 0..self.lines.len() {
            let line = &mut self.lines[ch];
            let silent;
            let in_samples = if ch < channels {
                silent = false;
                input.channel(ch)
            } else {
                silent = true;
                &[] as &[f32]
            };
            let out_samples = output.channel_mut(ch);
            let mut write = self.write_index;
            for frame in 0..out_samples.len() {
                line[write] = if silent { 0.0 } else { in_samples[frame] };
                let read_a = (write + capacity - whole) % capacity;
                let read_b = (read_a + capacity - 1) % capacity;
                let a = line[read_a];
                let b = line[read_b];
                out_samples[frame] = a + (b - a) * fraction;
                write = (write + 1) % capacity;
            }
        }
        self.write_index = (self.write_index + output.frame_count()) % capacity;
    }

    fn apply_description(&mut self, description: &NodeDescription) {
        if let NodeDescription::Delay(d) = description {
            self.delay_frames.set(d.delay_frames);
        }
    }

    fn param(&self, key: ParamKey) -> Option<&AtomicFloat> {
        (key == ParamKey::DelayTime).then_some(&self.delay_frames)
    }
}
