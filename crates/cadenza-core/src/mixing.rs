//! Channel up-mixing and down-mixing.
//!
//! Speaker-layout rules follow the standard mono/stereo/quad/5.1 mixing
//! tables; any source/destination pair outside those layouts falls back to
//! discrete mixing. 5.1 channel order is L, R, C, LFE, SL, SR.

use crate::AudioBus;

const SQRT_HALF: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// How a node interprets its channels when mixing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelInterpretation {
    /// Up/down-mix by speaker layout.
    Speakers,
    /// Sum corresponding channel indices only; missing channels are
    /// silence, extra channels are dropped.
    Discrete,
}

/// Sums `src` into `dst` under the given interpretation. `dst` keeps its
/// active channel count; callers zero it at the start of a quantum.
pub fn mix_into(dst: &mut AudioBus, src: &AudioBus, interpretation: ChannelInterpretation) {
    debug_assert_eq!(dst.frame_count(), src.frame_count());
    let (into, from) = (dst.channel_count(), src.channel_count());
    match interpretation {
        ChannelInterpretation::Discrete => mix_discrete(dst, src),
        ChannelInterpretation::Speakers => match (from, into) {
            _ if from == into => mix_discrete(dst, src),
            (1, 2) | (1, 4) => {
                // Mono feeds both front channels.
                add_channel(dst, 0, src.channel(0), 1.0);
                add_channel(dst, 1, src.channel(0), 1.0);
            }
            (1, 6) => add_channel(dst, 2, src.channel(0), 1.0),
            (2, 4) | (2, 6) | (4, 6) => {
                // Matching speaker positions carry over, the rest stay silent.
                for ch in 0..from.min(if into == 6 { 2 } else { into }) {
                    add_channel(dst, ch, src.channel(ch), 1.0);
                }
                if from == 4 && into == 6 {
                    add_channel(dst, 4, src.channel(2), 1.0);
                    add_channel(dst, 5, src.channel(3), 1.0);
                }
            }
            (2, 1) => {
                add_channel(dst, 0, src.channel(0), 0.5);
                add_channel(dst, 0, src.channel(1), 0.5);
            }
            (4, 1) => {
                for ch in 0..4 {
                    add_channel(dst, 0, src.channel(ch), 0.25);
                }
            }
            (6, 1) => {
                add_channel(dst, 0, src.channel(0), SQRT_HALF);
                add_channel(dst, 0, src.channel(1), SQRT_HALF);
                add_channel(dst, 0, src.channel(2), 1.0);
                add_channel(dst, 0, src.channel(4), 0.5);
                add_channel(dst, 0, src.channel(5), 0.5);
            }
            (4, 2) => {
                add_channel(dst, 0, src.channel(0), 0.5);
                add_channel(dst, 0, src.channel(2), 0.5);
                add_channel(dst, 1, src.channel(1), 0.5);
                add_channel(dst, 1, src.channel(3), 0.5);
            }
            (6, 2) => {
                add_channel(dst, 0, src.channel(0), 1.0);
                add_channel(dst, 0, src.channel(2), SQRT_HALF);
                add_channel(dst, 0, src.channel(4), SQRT_HALF);
                add_channel(dst, 1, src.channel(1), 1.0);
                add_channel(dst, 1, src.channel(2), SQRT_HALF);
                add_channel(dst, 1, src.channel(5), SQRT_HALF);
            }
            (6, 4) => {
                add_channel(dst, 0, src.channel(0), 1.0);
                add_channel(dst, 0, src.channel(2), SQRT_HALF);
                add_channel(dst, 1, src.channel(1), 1.0);
                add_channel(dst, 1, src.channel(2), SQRT_HALF);
                add_channel(dst, 2, src.channel(4), 1.0);
                add_channel(dst, 3, src.channel(5), 1.0);
            }
            _ => mix_discrete(dst, src),
        },
    }
}

fn mix_discrete(dst: &mut AudioBus, src: &AudioBus) {
    let channels = dst.channel_count().min(src.channel_count());
    for ch in 0..channels {
        add_channel(dst, ch, src.channel(ch), 1.0);
    }
}

#[inline]
fn add_channel(dst: &mut AudioBus, channel: usize, src: &[f32], gain: f32) {
    for (d, s) in dst.channel_mut(channel).iter_mut().zip(src) {
        *d += s * gain;
    }
}
