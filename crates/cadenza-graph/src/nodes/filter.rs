//! Biquad and general IIR filters.
//!
//! Both run the direct-form recurrence
//! `y[n] = b0*x[n] + b1*x[n-1] + ... - a1*y[n-1] - a2*y[n-2] - ...`
//! with feedforward index 0 applied to the current sample and feedback
//! subtracted. History is kept per channel in f64.

use super::{RenderContext, RenderNode};
use crate::description::{
    BiquadFilterDescription, BiquadFilterType, IirFilterDescription, NodeDescription, ParamKey,
};
use cadenza_core::{AtomicFloat, AudioBus};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Coefficients {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Coefficients {
    /// A frequency-independent response with the given gain.
    fn wire(gain: f64) -> Self {
        Self {
            b0: gain,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    fn zero() -> Self {
        Self::wire(0.0)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

pub struct BiquadFilterNode {
    filter_type: BiquadFilterType,
    frequency: AtomicFloat,
    detune: AtomicFloat,
    q: AtomicFloat,
    gain: AtomicFloat,
    coefficients: Coefficients,
    /// (frequency, detune, q, gain) the coefficients were computed for.
    computed_for: Option<(f32, f32, f32, f32)>,
    state: Vec<BiquadState>,
}

impl BiquadFilterNode {
    pub fn new(description: &BiquadFilterDescription, channels: usize) -> Self {
        Self {
            filter_type: description.filter_type,
            frequency: AtomicFloat::new(description.frequency),
            detune: AtomicFloat::new(description.detune),
            q: AtomicFloat::new(description.q),
            gain: AtomicFloat::new(description.gain),
            coefficients: Coefficients::wire(1.0),
            computed_for: None,
            state: vec![BiquadState::default(); channels.max(1)],
        }
    }

    fn refresh_coefficients(&mut self, sample_rate: f32) {
        let params = (
            self.frequency.get(),
            self.detune.get(),
            self.q.get(),
            self.gain.get(),
        );
        if self.computed_for == Some(params) {
            return;
        }
        let (frequency, detune, q, gain) = params;
        let nyquist = sample_rate as f64 / 2.0;
        // Detune scales frequency in cents before clamping to [0, nyquist].
        let computed = frequency as f64 * (detune as f64 / 1200.0).exp2();
        let normalized = (computed / nyquist).clamp(0.0, 1.0);
        self.coefficients =
            compute_coefficients(self.filter_type, normalized, q as f64, gain as f64);
        self.computed_for = Some(params);
    }
}

impl RenderNode for BiquadFilterNode {
    fn process(&mut self, ctx: &RenderContext, input: &AudioBus, output: &mut AudioBus) {
        self.refresh_coefficients(ctx.sample_rate);
        let c = self.coefficients;
        let channels = self.state.len();
        let _ = output.set_channel_count(channels);
        for ch in 0..channels {
            let state = &mut self.state[ch];
            let silent = ch >= input.channel_count();
            for frame in 0..output.frame_count() {
                let x = if silent {
                    0.0
                } else {
                    input.channel(ch)[frame] as f64
                };
                let y = c.b0 * x + c.b1 * state.x1 + c.b2 * state.x2
                    - c.a1 * state.y1
                    - c.a2 * state.y2;
                state.x2 = state.x1;
                state.x1 = x;
                state.y2 = state.y1;
                state.y1 = y;
                output.channel_mut(ch)[frame] = y as f32;
            }
        }
    }

    fn apply_description(&mut self, description: &NodeDescription) {
        if let NodeDescription::BiquadFilter(d) = description {
            self.filter_type = d.filter_type;
            self.frequency.set(d.frequency);
            self.detune.set(d.detune);
            self.q.set(d.q);
            self.gain.set(d.gain);
            // Force recomputation even if the atomic values happen to match.
            self.computed_for = None;
        }
    }

    fn param(&self, key: ParamKey) -> Option<&AtomicFloat> {
        match key {
            ParamKey::Frequency => Some(&self.frequency),
            ParamKey::Detune => Some(&self.detune),
            ParamKey::Q => Some(&self.q),
            ParamKey::FilterGain => Some(&self.gain),
            _ => None,
        }
    }
}

/// Standard audio-EQ cookbook biquads with the degenerate-frequency and
/// degenerate-Q shortcuts each type requires. `normalized` is
/// frequency/nyquist in [0, 1]; `gain` is in dB.
fn compute_coefficients(
    filter_type: BiquadFilterType,
    normalized: f64,
    q: f64,
    gain: f64,
) -> Coefficients {
    use BiquadFilterType::*;

    let a = 10f64.powf(gain / 40.0);
    match filter_type {
        Lowpass if normalized >= 1.0 => return Coefficients::wire(1.0),
        Lowpass if normalized <= 0.0 => return Coefficients::zero(),
        Highpass if normalized >= 1.0 => return Coefficients::zero(),
        Highpass if normalized <= 0.0 => return Coefficients::wire(1.0),
        Bandpass if normalized <= 0.0 || normalized >= 1.0 => return Coefficients::zero(),
        Bandpass if q <= 0.0 => return Coefficients::wire(1.0),
        Notch if normalized <= 0.0 || normalized >= 1.0 => return Coefficients::wire(1.0),
        Notch if q <= 0.0 => return Coefficients::zero(),
        Allpass if normalized <= 0.0 || normalized >= 1.0 => return Coefficients::wire(1.0),
        Allpass if q <= 0.0 => return Coefficients::wire(-1.0),
        Peaking if normalized <= 0.0 || normalized >= 1.0 => return Coefficients::wire(1.0),
        Peaking if q <= 0.0 => return Coefficients::wire(a * a),
        Lowshelf if normalized >= 1.0 => return Coefficients::wire(a * a),
        Lowshelf if normalized <= 0.0 => return Coefficients::wire(1.0),
        Highshelf if normalized >= 1.0 => return Coefficients::wire(1.0),
        Highshelf if normalized <= 0.0 => return Coefficients::wire(a * a),
        _ => {}
    }

    let omega = std::f64::consts::PI * normalized;
    let (sin, cos) = omega.sin_cos();

    let normalize = |b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64| Coefficients {
        b0: b0 / a0,
        b1: b1 / a0,
        b2: b2 / a0,
        a1: a1 / a0,
        a2: a2 / a0,
    };

    match filter_type {
        Lowpass | Highpass => {
            // Q is in dB for these two types.
            let resonance = 10f64.powf(q / 20.0);
            let alpha = sin / (2.0 * resonance.max(f64::MIN_POSITIVE));
            if matches!(filter_type, Lowpass) {
                normalize(
                    (1.0 - cos) / 2.0,
                    1.0 - cos,
                    (1.0 - cos) / 2.0,
                    1.0 + alpha,
                    -2.0 * cos,
                    1.0 - alpha,
                )
            } else {
                normalize(
                    (1.0 + cos) / 2.0,
                    -(1.0 + cos),
                    (1.0 + cos) / 2.0,
                    1.0 + alpha,
                    -2.0 * cos,
                    1.0 - alpha,
                )
            }
        }
        Bandpass => {
            let alpha = sin / (2.0 * q);
            normalize(alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos, 1.0 - alpha)
        }
        Notch => {
            let alpha = sin / (2.0 * q);
            normalize(1.0, -2.0 * cos, 1.0, 1.0 + alpha, -2.0 * cos, 1.0 - alpha)
        }
        Allpass => {
            let alpha = sin / (2.0 * q);
            normalize(
                1.0 - alpha,
                -2.0 * cos,
                1.0 + alpha,
                1.0 + alpha,
                -2.0 * cos,
                1.0 - alpha,
            )
        }
        Peaking => {
            let alpha = sin / (2.0 * q);
            normalize(
                1.0 + alpha * a,
                -2.0 * cos,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cos,
                1.0 - alpha / a,
            )
        }
        Lowshelf | Highshelf => {
            // Shelf slope fixed at 1.
            let alpha = sin / 2.0 * std::f64::consts::SQRT_2;
            let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
            if matches!(filter_type, Lowshelf) {
                normalize(
                    a * ((a + 1.0) - (a - 1.0) * cos + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos),
                    a * ((a + 1.0) - (a - 1.0) * cos - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos),
                    (a + 1.0) + (a - 1.0) * cos - two_sqrt_a_alpha,
                )
            } else {
                normalize(
                    a * ((a + 1.0) + (a - 1.0) * cos + two_sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos),
                    a * ((a + 1.0) + (a - 1.0) * cos - two_sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos + two_sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos),
                    (a + 1.0) - (a - 1.0) * cos - two_sqrt_a_alpha,
                )
            }
        }
    }
}

/// General IIR filter with arbitrary coefficient counts. Feedback
/// coefficient 0 normalizes the rest at construction; any coefficient
/// change rebuilds the node, so no hot parameters exist here.
pub struct IirFilterNode {
    feedforward: Vec<f64>,
    feedback: Vec<f64>,
    /// Per channel: input history then output history, most recent first.
    x_history: Vec<Vec<f64>>,
    y_history: Vec<Vec<f64>>,
}

impl IirFilterNode {
    pub fn new(description: &IirFilterDescription, channels: usize) -> Self {
        let channels = channels.max(1);
        let a0 = description.feedback.first().copied().unwrap_or(1.0);
        let scale = if a0 == 0.0 { 1.0 } else { 1.0 / a0 };
        let feedforward: Vec<f64> = description.feedforward.iter().map(|c| c * scale).collect();
        let feedback: Vec<f64> = description.feedback.iter().map(|c| c * scale).collect();
        let ff_len = feedforward.len();
        let fb_len = feedback.len();
        Self {
            feedforward,
            feedback,
            x_history: vec![vec![0.0; ff_len.max(1)]; channels],
            y_history: vec![vec![0.0; fb_len.max(1)]; channels],
        }
    }
}

impl RenderNode for IirFilterNode {
    fn process(&mut self, _ctx: &RenderContext, input: &AudioBus, output: &mut AudioBus) {
        let channels = self.x_history.len();
        let _ = output.set_channel_count(channels);
        for ch in 0..channels {
            let xs = &mut self.x_history[ch];
            let ys = &mut self.y_history[ch];
            let silent = ch >= input.channel_count();
            for frame in 0..output.frame_count() {
                let x = if silent {
                    0.0
                } else {
                    input.channel(ch)[frame] as f64
                };
                // Shift history one position; index 0 is the current sample.
                let order = xs.len();
                xs.copy_within(0..order - 1, 1);
                xs[0] = x;
                let mut y = 0.0;
                for (k, &b) in self.feedforward.iter().enumerate() {
                    y += b * xs[k];
                }
                for (k, &a) in self.feedback.iter().enumerate().skip(1) {
                    y -= a * ys[k - 1];
                }
                let taps = ys.len();
                ys.copy_within(0..taps - 1, 1);
                ys[0] = y;
                output.channel_mut(ch)[frame] = y as f32;
            }
        }
    }

    fn apply_description(&mut self, _description: &NodeDescription) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::ChannelConfig;
    use approx::assert_relative_eq;

    fn ctx() -> RenderContext {
        RenderContext {
            sample_rate: 48000.0,
            quantum_start_frame: 0,
            frames: 128,
        }
    }

    fn biquad(filter_type: BiquadFilterType, frequency: f32, q: f32, gain: f32) -> BiquadFilterNode {
        BiquadFilterNode::new(
            &BiquadFilterDescription {
                filter_type,
                frequency,
                detune: 0.0,
                q,
                gain,
                channels: ChannelConfig {
                    count: 1,
                    interpretation: cadenza_core::mixing::ChannelInterpretation::Discrete,
                },
            },
            1,
        )
    }

    #[test]
    fn test_lowpass_at_nyquist_is_wire() {
        let mut node = biquad(BiquadFilterType::Lowpass, 24_000.0, 1.0, 0.0);
        let mut input = AudioBus::new(1, 128);
        for (i, s) in input.channel_mut(0).iter_mut().enumerate() {
            *s = (i as f32 * 0.37).sin();
        }
        let mut output = AudioBus::new(1, 128);
        node.process(&ctx(), &input, &mut output);
        for frame in 0..128 {
            assert_relative_eq!(
                output.channel(0)[frame],
                input.channel(0)[frame],
                epsilon = 1e-6
            );
        }
    }

    #[test]
    fn test_lowpass_at_zero_is_silent() {
        let mut node = biquad(BiquadFilterType::Lowpass, 0.0, 1.0, 0.0);
        let mut input = AudioBus::new(1, 128);
        input.channel_mut(0).fill(1.0);
        let mut output = AudioBus::new(1, 128);
        node.process(&ctx(), &input, &mut output);
        assert!(output.channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_lowpass_passes_dc() {
        let mut node = biquad(BiquadFilterType::Lowpass, 1000.0, 0.0, 0.0);
        let mut input = AudioBus::new(1, 128);
        input.channel_mut(0).fill(1.0);
        let mut output = AudioBus::new(1, 128);
        // Run enough quanta for the filter to settle.
        for _ in 0..50 {
            node.process(&ctx(), &input, &mut output);
        }
        assert_relative_eq!(output.channel(0)[127], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_highpass_blocks_dc() {
        let mut node = biquad(BiquadFilterType::Highpass, 1000.0, 0.0, 0.0);
        let mut input = AudioBus::new(1, 128);
        input.channel_mut(0).fill(1.0);
        let mut output = AudioBus::new(1, 128);
        for _ in 0..50 {
            node.process(&ctx(), &input, &mut output);
        }
        assert!(output.channel(0)[127].abs() < 1e-3);
    }

    #[test]
    fn test_feedforward_zero_applies_to_current_sample() {
        // Pure one-sample feedforward echo: y[n] = x[n] + 0.5 x[n-1].
        let mut node = IirFilterNode::new(
            &IirFilterDescription {
                feedforward: vec![1.0, 0.5],
                feedback: vec![1.0],
                channels: ChannelConfig {
                    count: 1,
                    interpretation: cadenza_core::mixing::ChannelInterpretation::Discrete,
                },
            },
            1,
        );
        let mut input = AudioBus::new(1, 128);
        input.channel_mut(0)[0] = 1.0;
        let mut output = AudioBus::new(1, 128);
        node.process(&ctx(), &input, &mut output);
        assert_relative_eq!(output.channel(0)[0], 1.0);
        assert_relative_eq!(output.channel(0)[1], 0.5);
        assert_relative_eq!(output.channel(0)[2], 0.0);
    }

    #[test]
    fn test_feedback_is_subtracted() {
        // y[n] = x[n] - 0.5 y[n-1]: impulse response alternates sign.
        let mut node = IirFilterNode::new(
            &IirFilterDescription {
                feedforward: vec![1.0],
                feedback: vec![1.0, 0.5],
                channels: ChannelConfig {
                    count: 1,
                    interpretation: cadenza_core::mixing::ChannelInterpretation::Discrete,
                },
            },
            1,
        );
        let mut input = AudioBus::new(1, 128);
        input.channel_mut(0)[0] = 1.0;
        let mut output = AudioBus::new(1, 128);
        node.process(&ctx(), &input, &mut output);
        assert_relative_eq!(output.channel(0)[0], 1.0);
        assert_relative_eq!(output.channel(0)[1], -0.5);
        assert_relative_eq!(output.channel(0)[2], 0.25);
    }

    #[test]
    fn test_iir_normalizes_by_leading_feedback() {
        // feedback[0] = 2 halves everything.
        let mut node = IirFilterNode::new(
            &IirFilterDescription {
                feedforward: vec![1.0],
                feedback: vec![2.0],
                channels: ChannelConfig {
                    count: 1,
                    interpretation: cadenza_core::mixing::ChannelInterpretation::Discrete,
                },
            },
            1,
        );
        let mut input = AudioBus::new(1, 128);
        input.channel_mut(0)[0] = 1.0;
        let mut output = AudioBus::new(1, 128);
        node.process(&ctx(), &input, &mut output);
        assert_relative_eq!(output.channel(0)[0], 0.5);
    }

    #[test]
    fn test_biquad_matches_manual_recurrence() {
        let mut node = biquad(BiquadFilterType::Peaking, 2000.0, 2.0, 6.0);
        let mut input = AudioBus::new(1, 128);
        for (i, s) in input.channel_mut(0).iter_mut().enumerate() {
            *s = ((i * 7919) % 97) as f32 / 97.0 - 0.5;
        }
        let mut output = AudioBus::new(1, 128);
        node.process(&ctx(), &input, &mut output);

        let c = node.coefficients;
        let (mut x1, mut x2, mut y1, mut y2) = (0.0f64, 0.0, 0.0, 0.0);
        for frame in 0..128 {
            let x = input.channel(0)[frame] as f64;
            let y = c.b0 * x + c.b1 * x1 + c.b2 * x2 - c.a1 * y1 - c.a2 * y2;
            x2 = x1;
            x1 = x;
            y2 = y1;
            y1 = y;
            assert_relative_eq!(output.channel(0)[frame], y as f32);
        }
    }
}
