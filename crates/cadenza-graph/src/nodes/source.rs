//! Scheduled sources: constant and oscillator.

use super::{RenderContext, RenderNode};
use crate::description::{
    ConstantSourceDescription, NodeDescription, OscillatorDescription, ParamKey, Waveform,
};
use cadenza_core::{AtomicFloat, AudioBus};

/// True if the absolute frame lies inside the scheduled window.
#[inline]
fn scheduled(frame: u64, start: Option<u64>, stop: Option<u64>) -> bool {
    start.is_some_and(|s| frame >= s) && stop.map_or(true, |s| frame < s)
}

pub struct ConstantSourceNode {
    offset: AtomicFloat,
    start_frame: Option<u64>,
    stop_frame: Option<u64>,
}

impl ConstantSourceNode {
    pub fn new(description: &ConstantSourceDescription) -> Self {
        Self {
            offset: AtomicFloat::new(description.offset),
            start_frame: description.start_frame,
            stop_frame: description.stop_frame,
        }
    }
}

impl RenderNode for ConstantSourceNode {
    fn process(&mut self, ctx: &RenderContext, _input: &AudioBus, output: &mut AudioBus) {
        let offset = self.offset.get();
        let _ = output.set_channel_count(1);
        let samples = output.channel_mut(0);
        for (i, sample) in samples.iter_mut().enumerate() {
            let frame = ctx.quantum_start_frame + i as u64;
            *sample = if scheduled(frame, self.start_frame, self.stop_frame) {
                offset
            } else {
                0.0
            };
        }
    }

    fn apply_description(&mut self, description: &NodeDescription) {
        if let NodeDescription::ConstantSource(d) = description {
            self.offset.set(d.offset);
        }
    }

    fn param(&self, key: ParamKey) -> Option<&AtomicFloat> {
        (key == ParamKey::Offset).then_some(&self.offset)
    }
}

pub struct OscillatorNode {
    waveform: Waveform,
    frequency: AtomicFloat,
    detune: AtomicFloat,
    start_frame: Option<u64>,
    stop_frame: Option<u64>,
    /// Phase in [0, 1).
    phase: f64,
}

impl OscillatorNode {
    pub fn new(description: &OscillatorDescription) -> Self {
        Self {
            waveform: description.waveform,
            frequency: AtomicFloat::new(description.frequency),
            detune: AtomicFloat::new(description.detune),
            start_frame: description.start_frame,
            stop_frame: description.stop_frame,
            phase: 0.0,
        }
    }

    #[inline]
    fn sample(&self, phase: f64) -> f32 {
        match self.waveform {
            Waveform::Sine => (phase * std::f64::consts::TAU).sin() as f32,
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => (2.0 * phase - 1.0) as f32,
            Waveform::Triangle => {
                let folded = if phase < 0.5 { phase } else { 1.0 - phase };
                (4.0 * folded - 1.0) as f32
            }
        }
    }
}

impl RenderNode for OscillatorNode {
    fn process(&mut self, ctx: &RenderContext, _input: &AudioBus, output: &mut AudioBus) {
        // Frequency and detune are read once per quantum (k-rate).
        let frequency =
            self.frequency.get() as f64 * (self.detune.get() as f64 / 1200.0).exp2();
        let increment = frequency / ctx.sample_rate as f64;
        let _ = output.set_channel_count(1);
        let samples = output.channel_mut(0);
        for (i, sample) in samples.iter_mut().enumerate() {
            let frame = ctx.quantum_start_frame + i as u64;
            if scheduled(frame, self.start_frame, self.stop_frame) {
                *sample = self.sample(self.phase);
                self.phase = (self.phase + increment).rem_euclid(1.0);
            } else {
                *sample = 0.0;
            }
        }
    }

    fn apply_description(&mut self, description: &NodeDescription) {
        if let NodeDescription::Oscillator(d) = description {
            self.waveform = d.waveform;
            self.frequency.set(d.frequency);
            self.detune.set(d.detune);
        }
    }

    fn param(&self, key: ParamKey) -> Option<&AtomicFloat> {
        match key {
            ParamKey::Frequency => Some(&self.frequency),
            ParamKey::Detune => Some(&self.detune),
            _ => None,
        }
    }
}
