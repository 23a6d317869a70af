//! Destination, gain, stereo panner, and the silent fallback node.

use super::{RenderContext, RenderNode};
use crate::description::{NodeDescription, ParamKey};
use cadenza_core::{AtomicFloat, AudioBus};

/// Graph sink. Its mixed input is the quantum's final output.
#[derive(Debug, Default)]
pub struct DestinationNode;

impl DestinationNode {
    pub fn new() -> Self {
        Self
    }
}

impl RenderNode for DestinationNode {
    fn process(&mut self, _ctx: &RenderContext, input: &AudioBus, output: &mut AudioBus) {
        let _ = output.copy_from(input);
    }

    fn apply_description(&mut self, _description: &NodeDescription) {}
}

pub struct GainNode {
    gain: AtomicFloat,
}

impl GainNode {
    pub fn new(gain: f32) -> Self {
        Self {
            gain: AtomicFloat::new(gain),
        }
    }
}

impl RenderNode for GainNode {
    fn process(&mut self, _ctx: &RenderContext, input: &AudioBus, output: &mut AudioBus) {
        let gain = self.gain.get();
        let _ = output.set_channel_count(input.channel_count());
        for ch in 0..input.channel_count() {
            for (o, i) in output.channel_mut(ch).iter_mut().zip(input.channel(ch)) {
                *o = i * gain;
            }
        }
    }

    fn apply_description(&mut self, description: &NodeDescription) {
        if let NodeDescription::Gain(d) = description {
            self.gain.set(d.gain);
        }
    }

    fn param(&self, key: ParamKey) -> Option<&AtomicFloat> {
        (key == ParamKey::Gain).then_some(&self.gain)
    }
}

/// Equal-power stereo panner. Input is up-mixed to stereo by the executor.
pub struct StereoPannerNode {
    pan: AtomicFloat,
}

impl StereoPannerNode {
    pub fn new(pan: f32) -> Self {
        Self {
            pan: AtomicFloat::new(pan),
        }
    }
}

impl RenderNode for StereoPannerNode {
    fn process(&mut self, _ctx: &RenderContext, input: &AudioBus, output: &mut AudioBus) {
        let pan = self.pan.get().clamp(-1.0, 1.0);
        let _ = output.set_channel_count(2);

        // Pan position folded into [0, 1], then split with equal power.
        let x = if pan <= 0.0 { pan + 1.0 } else { pan };
        let gain_l = (x * std::f32::consts::FRAC_PI_2).cos();
        let gain_r = (x * std::f32::consts::FRAC_PI_2).sin();

        let mono = input.channel_count() < 2;
        let frames = input.frame_count();
        for frame in 0..frames {
            let (l, r) = if mono {
                let s = input.channel(0)[frame];
                (s, s)
            } else {
                (input.channel(0)[frame], input.channel(1)[frame])
            };
            let (out_l, out_r) = if mono {
                (l * gain_l, r * gain_r)
            } else if pan <= 0.0 {
                (l + r * gain_l, r * gain_r)
            } else {
                (l * gain_l, r + l * gain_r)
            };
            output.channel_mut(0)[frame] = out_l;
            output.channel_mut(1)[frame] = out_r;
        }
    }

    fn apply_description(&mut self, description: &NodeDescription) {
        if let NodeDescription::StereoPanner(d) = description {
            self.pan.set(d.pan);
        }
    }

    fn param(&self, key: ParamKey) -> Option<&AtomicFloat> {
        (key == ParamKey::Pan).then_some(&self.pan)
    }
}

/// Fallback for unrecognized node kinds: always silent, never aborts the
/// graph.
pub struct SilenceNode;

impl RenderNode for SilenceNode {
    fn process(&mut self, _ctx: &RenderContext, _input: &AudioBus, output: &mut AudioBus) {
        output.zero();
    }

    fn apply_description(&mut self, _description: &NodeDescription) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ctx() -> RenderContext {
        RenderContext {
            sample_rate: 48000.0,
            quantum_start_frame: 0,
            frames: 8,
        }
    }

    #[test]
    fn test_gain_scales_all_channels() {
        let mut node = GainNode::new(0.5);
        let mut input = AudioBus::new(2, 8);
        input.channel_mut(0).fill(1.0);
        input.channel_mut(1).fill(-1.0);
        let mut output = AudioBus::new(2, 8);
        node.process(&ctx(), &input, &mut output);
        assert!(output.channel(0).iter().all(|&s| s == 0.5));
        assert!(output.channel(1).iter().all(|&s| s == -0.5));
    }

    #[test]
    fn test_gain_apply_description_updates_atomically() {
        let mut node = GainNode::new(0.5);
        node.apply_description(&NodeDescription::Gain(crate::description::GainDescription {
            gain: 2.0,
            channels: crate::description::ChannelConfig::stereo(),
        }));
        assert_eq!(node.param(ParamKey::Gain).unwrap().get(), 2.0);
    }

    #[test]
    fn test_panner_center_is_equal_power() {
        let mut node = StereoPannerNode::new(0.0);
        let mut input = AudioBus::new(2, 4);
        input.channel_mut(0).fill(1.0);
        input.channel_mut(1).fill(1.0);
        let mut output = AudioBus::new(2, 4);
        node.process(&ctx(), &input, &mut output);
        // pan = 0 with stereo input passes both sides through.
        assert_relative_eq!(output.channel(0)[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(output.channel(1)[0], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_panner_hard_left_silences_right() {
        let mut node = StereoPannerNode::new(-1.0);
        let mut input = AudioBus::new(2, 4);
        input.channel_mut(0).fill(0.5);
        input.channel_mut(1).fill(0.5);
        let mut output = AudioBus::new(2, 4);
        node.process(&ctx(), &input, &mut output);
        assert_relative_eq!(output.channel(0)[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(output.channel(1)[0], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_silence_node_zeroes_output() {
        let mut node = SilenceNode;
        let input = AudioBus::new(1, 8);
        let mut output = AudioBus::new(1, 8);
        output.channel_mut(0).fill(3.0);
        node.process(&ctx(), &input, &mut output);
        assert!(output.channel(0).iter().all(|&s| s == 0.0));
    }
}
