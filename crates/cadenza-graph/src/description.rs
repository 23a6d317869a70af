//! Control-thread graph node descriptions and their wire payloads.
//!
//! A description is the immutable, transportable form of one node's
//! configuration: everything needed to construct or update its render-side
//! counterpart, and nothing else. Updates replace a description wholesale;
//! [`NodeDescription::classify_update`] decides how the render side reacts.

use cadenza_core::mixing::ChannelInterpretation;
use cadenza_core::wire::{WireError, WireReader, WireResult, WireWriter};

/// Stable identity of a node within one graph generation. Assigned by the
/// live-graph registry at node creation, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

/// One edge of the render graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Connection {
    pub source: NodeId,
    pub destination: NodeId,
    pub output_index: u32,
    pub input_index: u32,
}

/// Parameter addressed by automation and in-place updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ParamKey {
    Gain = 0,
    Offset = 1,
    Frequency = 2,
    Detune = 3,
    Q = 4,
    FilterGain = 5,
    DelayTime = 6,
    Pan = 7,
}

impl ParamKey {
    pub(crate) fn from_wire(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Gain,
            1 => Self::Offset,
            2 => Self::Frequency,
            3 => Self::Detune,
            4 => Self::Q,
            5 => Self::FilterGain,
            6 => Self::DelayTime,
            7 => Self::Pan,
            _ => return None,
        })
    }
}

/// Scheduled parameter change, frame-timed, evaluated once per quantum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationEvent {
    pub node: NodeId,
    pub param: ParamKey,
    pub at_frame: u64,
    pub kind: AutomationKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutomationKind {
    SetValue(f32),
    /// Ramp linearly from the previous value to the target, arriving at
    /// `at_frame`.
    LinearRampToValue(f32),
}

/// How an update to a node should be applied on the render side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// Descriptions are equal; nothing to do.
    None,
    /// Apply in place between quanta; no reconstruction.
    Parameter,
    /// Destroy the render node and rebuild it from the new description.
    RebuildRequired,
}

impl UpdateKind {
    fn merge(self, other: UpdateKind) -> UpdateKind {
        use UpdateKind::*;
        match (self, other) {
            (RebuildRequired, _) | (_, RebuildRequired) => RebuildRequired,
            (Parameter, _) | (_, Parameter) => Parameter,
            _ => None,
        }
    }
}

/// How a node counts and interprets its channels. Any change here is a
/// topology change and forces a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub count: u32,
    pub interpretation: ChannelInterpretation,
}

impl ChannelConfig {
    pub fn stereo() -> Self {
        Self {
            count: 2,
            interpretation: ChannelInterpretation::Speakers,
        }
    }

    fn encode(&self, writer: &mut WireWriter) {
        writer.write_u32(self.count);
        writer.write_u8(match self.interpretation {
            ChannelInterpretation::Speakers => 0,
            ChannelInterpretation::Discrete => 1,
        });
    }

    fn decode(reader: &mut WireReader) -> WireResult<Self> {
        let count = reader.read_u32()?;
        let interpretation = match reader.read_u8()? {
            0 => ChannelInterpretation::Speakers,
            1 => ChannelInterpretation::Discrete,
            _ => return Err(WireError::MalformedSection("channel interpretation tag")),
        };
        Ok(Self {
            count,
            interpretation,
        })
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::stereo()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Waveform {
    Sine = 0,
    Square = 1,
    Sawtooth = 2,
    Triangle = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BiquadFilterType {
    Lowpass = 0,
    Highpass = 1,
    Bandpass = 2,
    Lowshelf = 3,
    Highshelf = 4,
    Peaking = 5,
    Notch = 6,
    Allpass = 7,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DestinationDescription {
    pub channel_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GainDescription {
    pub gain: f32,
    pub channels: ChannelConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantSourceDescription {
    pub offset: f32,
    pub start_frame: Option<u64>,
    pub stop_frame: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscillatorDescription {
    pub waveform: Waveform,
    pub frequency: f32,
    pub detune: f32,
    pub start_frame: Option<u64>,
    pub stop_frame: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DelayDescription {
    pub delay_frames: f32,
    pub max_delay_frames: u64,
    pub channels: ChannelConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BiquadFilterDescription {
    pub filter_type: BiquadFilterType,
    pub frequency: f32,
    pub detune: f32,
    pub q: f32,
    pub gain: f32,
    pub channels: ChannelConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IirFilterDescription {
    pub feedforward: Vec<f64>,
    pub feedback: Vec<f64>,
    pub channels: ChannelConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StereoPannerDescription {
    pub pan: f32,
    pub channels: ChannelConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptProcessorDescription {
    pub buffer_frames: u32,
    pub input_channels: u32,
    pub output_channels: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioWorkletDescription {
    pub processor_name: String,
    /// Sorted at snapshot time so descriptions compare deterministically.
    pub param_names: Vec<String>,
    pub channels: ChannelConfig,
}

/// A node kind this build does not recognize. The raw payload is carried
/// so re-encoding reproduces the input and the snapshot never aborts.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownDescription {
    pub kind_tag: u8,
    pub payload: Vec<u8>,
}

pub(crate) mod kind_tag {
    pub const DESTINATION: u8 = 0;
    pub const GAIN: u8 = 1;
    pub const CONSTANT_SOURCE: u8 = 2;
    pub const OSCILLATOR: u8 = 3;
    pub const DELAY: u8 = 4;
    pub const BIQUAD_FILTER: u8 = 5;
    pub const IIR_FILTER: u8 = 6;
    pub const STEREO_PANNER: u8 = 7;
    pub const SCRIPT_PROCESSOR: u8 = 8;
    pub const AUDIO_WORKLET: u8 = 9;
}

/// Closed set of node kinds the render side can materialize.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeDescription {
    Destination(DestinationDescription),
    Gain(GainDescription),
    ConstantSource(ConstantSourceDescription),
    Oscillator(OscillatorDescription),
    Delay(DelayDescription),
    BiquadFilter(BiquadFilterDescription),
    IirFilter(IirFilterDescription),
    StereoPanner(StereoPannerDescription),
    ScriptProcessor(ScriptProcessorDescription),
    AudioWorklet(AudioWorkletDescription),
    Unknown(UnknownDescription),
}

impl NodeDescription {
    pub fn kind_tag(&self) -> u8 {
        use kind_tag::*;
        match self {
            Self::Destination(_) => DESTINATION,
            Self::Gain(_) => GAIN,
            Self::ConstantSource(_) => CONSTANT_SOURCE,
            Self::Oscillator(_) => OSCILLATOR,
            Self::Delay(_) => DELAY,
            Self::BiquadFilter(_) => BIQUAD_FILTER,
            Self::IirFilter(_) => IIR_FILTER,
            Self::StereoPanner(_) => STEREO_PANNER,
            Self::ScriptProcessor(_) => SCRIPT_PROCESSOR,
            Self::AudioWorklet(_) => AUDIO_WORKLET,
            Self::Unknown(u) => u.kind_tag,
        }
    }

    /// Writes this description's payload (excluding the kind tag, which the
    /// node-table framing owns).
    pub fn encode_wire_payload(&self, writer: &mut WireWriter) {
        match self {
            Self::Destination(d) => {
                writer.write_u32(d.channel_count);
            }
            Self::Gain(d) => {
                writer.write_f32(d.gain);
                d.channels.encode(writer);
            }
            Self::ConstantSource(d) => {
                writer.write_f32(d.offset);
                writer.write_option_u64(d.start_frame);
                writer.write_option_u64(d.stop_frame);
            }
            Self::Oscillator(d) => {
                writer.write_u8(d.waveform as u8);
                writer.write_f32(d.frequency);
                writer.write_f32(d.detune);
                writer.write_option_u64(d.start_frame);
                writer.write_option_u64(d.stop_frame);
            }
            Self::Delay(d) => {
                writer.write_f32(d.delay_frames);
                writer.write_u64(d.max_delay_frames);
                d.channels.encode(writer);
            }
            Self::BiquadFilter(d) => {
                writer.write_u8(d.filter_type as u8);
                writer.write_f32(d.frequency);
                writer.write_f32(d.detune);
                writer.write_f32(d.q);
                writer.write_f32(d.gain);
                d.channels.encode(writer);
            }
            Self::IirFilter(d) => {
                writer.write_u32(d.feedforward.len() as u32);
                for &c in &d.feedforward {
                    writer.write_f64(c);
                }
                writer.write_u32(d.feedback.len() as u32);
                for &c in &d.feedback {
                    writer.write_f64(c);
                }
                d.channels.encode(writer);
            }
            Self::StereoPanner(d) => {
                writer.write_f32(d.pan);
                d.channels.encode(writer);
            }
            Self::ScriptProcessor(d) => {
                writer.write_u32(d.buffer_frames);
                writer.write_u32(d.input_channels);
                writer.write_u32(d.output_channels);
            }
            Self::AudioWorklet(d) => {
                writer.write_str(&d.processor_name);
                writer.write_u32(d.param_names.len() as u32);
                for name in &d.param_names {
                    writer.write_str(name);
                }
                d.channels.encode(writer);
            }
            Self::Unknown(d) => {
                for &b in &d.payload {
                    writer.write_u8(b);
                }
            }
        }
    }

    /// Decodes the payload for `kind_tag`. Unrecognized tags become
    /// [`NodeDescription::Unknown`] carrying the raw payload, so a newer
    /// peer's graph still decodes.
    pub fn decode_wire_payload(kind_tag: u8, reader: &mut WireReader) -> WireResult<Self> {
        Ok(match kind_tag {
            kind_tag::DESTINATION => Self::Destination(DestinationDescription {
                channel_count: reader.read_u32()?,
            }),
            kind_tag::GAIN => Self::Gain(GainDescription {
                gain: reader.read_f32()?,
                channels: ChannelConfig::decode(reader)?,
            }),
            kind_tag::CONSTANT_SOURCE => Self::ConstantSource(ConstantSourceDescription {
                offset: reader.read_f32()?,
                start_frame: reader.read_option_u64()?,
                stop_frame: reader.read_option_u64()?,
            }),
            kind_tag::OSCILLATOR => Self::Oscillator(OscillatorDescription {
                waveform: match reader.read_u8()? {
                    0 => Waveform::Sine,
                    1 => Waveform::Square,
                    2 => Waveform::Sawtooth,
                    3 => Waveform::Triangle,
                    _ => return Err(WireError::MalformedSection("waveform tag")),
                },
                frequency: reader.read_f32()?,
                detune: reader.read_f32()?,
                start_frame: reader.read_option_u64()?,
                stop_frame: reader.read_option_u64()?,
            }),
            kind_tag::DELAY => Self::Delay(DelayDescription {
                delay_frames: reader.read_f32()?,
                max_delay_frames: reader.read_u64()?,
                channels: ChannelConfig::decode(reader)?,
            }),
            kind_tag::BIQUAD_FILTER => Self::BiquadFilter(BiquadFilterDescription {
                filter_type: match reader.read_u8()? {
                    0 => BiquadFilterType::Lowpass,
                    1 => BiquadFilterType::Highpass,
                    2 => BiquadFilterType::Bandpass,
                    3 => BiquadFilterType::Lowshelf,
                    4 => BiquadFilterType::Highshelf,
                    5 => BiquadFilterType::Peaking,
                    6 => BiquadFilterType::Notch,
                    7 => BiquadFilterType::Allpass,
                    _ => return Err(WireError::MalformedSection("filter type tag")),
                },
                frequency: reader.read_f32()?,
                detune: reader.read_f32()?,
                q: reader.read_f32()?,
                gain: reader.read_f32()?,
                channels: ChannelConfig::decode(reader)?,
            }),
            kind_tag::IIR_FILTER => {
                let ff_len = reader.read_u32()? as usize;
                let mut feedforward = Vec::with_capacity(ff_len.min(64));
                for _ in 0..ff_len {
                    feedforward.push(reader.read_f64()?);
                }
                let fb_len = reader.read_u32()? as usize;
                let mut feedback = Vec::with_capacity(fb_len.min(64));
                for _ in 0..fb_len {
                    feedback.push(reader.read_f64()?);
                }
                Self::IirFilter(IirFilterDescription {
                    feedforward,
                    feedback,
                    channels: ChannelConfig::decode(reader)?,
                })
            }
            kind_tag::STEREO_PANNER => Self::StereoPanner(StereoPannerDescription {
                pan: reader.read_f32()?,
                channels: ChannelConfig::decode(reader)?,
            }),
            kind_tag::SCRIPT_PROCESSOR => Self::ScriptProcessor(ScriptProcessorDescription {
                buffer_frames: reader.read_u32()?,
                input_channels: reader.read_u32()?,
                output_channels: reader.read_u32()?,
            }),
            kind_tag::AUDIO_WORKLET => {
                let processor_name = reader.read_str()?;
                let count = reader.read_u32()? as usize;
                let mut param_names = Vec::with_capacity(count.min(128));
                for _ in 0..count {
                    param_names.push(reader.read_str()?);
                }
                Self::AudioWorklet(AudioWorkletDescription {
                    processor_name,
                    param_names,
                    channels: ChannelConfig::decode(reader)?,
                })
            }
            other => {
                let mut payload = Vec::with_capacity(reader.remaining());
                while !reader.is_empty() {
                    payload.push(reader.read_u8()?);
                }
                Self::Unknown(UnknownDescription {
                    kind_tag: other,
                    payload,
                })
            }
        })
    }

    /// Pure comparison of this description against its replacement.
    ///
    /// Returns `UpdateKind::None` iff the descriptions are field-wise equal
    /// under the kind's policy: channel topology and structural fields force
    /// `RebuildRequired`, scalar parameter fields yield `Parameter`.
    pub fn classify_update(&self, new: &NodeDescription) -> UpdateKind {
        use NodeDescription::*;
        use UpdateKind::RebuildRequired;

        match (self, new) {
            (Destination(a), Destination(b)) => flag(a.channel_count != b.channel_count),
            (Gain(a), Gain(b)) => {
                flag(a.channels != b.channels).merge(param(a.gain != b.gain))
            }
            (ConstantSource(a), ConstantSource(b)) => {
                flag(a.start_frame != b.start_frame || a.stop_frame != b.stop_frame)
                    .merge(param(a.offset != b.offset))
            }
            (Oscillator(a), Oscillator(b)) => flag(
                a.start_frame != b.start_frame || a.stop_frame != b.stop_frame,
            )
            .merge(param(
                a.waveform != b.waveform || a.frequency != b.frequency || a.detune != b.detune,
            )),
            (Delay(a), Delay(b)) => {
                flag(a.max_delay_frames != b.max_delay_frames || a.channels != b.channels)
                    .merge(param(a.delay_frames != b.delay_frames))
            }
            (BiquadFilter(a), BiquadFilter(b)) => flag(a.channels != b.channels).merge(param(
                a.filter_type != b.filter_type
                    || a.frequency != b.frequency
                    || a.detune != b.detune
                    || a.q != b.q
                    || a.gain != b.gain,
            )),
            // Coefficient vectors size the history rings; any change rebuilds.
            (IirFilter(a), IirFilter(b)) => flag(a != b),
            (StereoPanner(a), StereoPanner(b)) => {
                flag(a.channels != b.channels).merge(param(a.pan != b.pan))
            }
            (ScriptProcessor(a), ScriptProcessor(b)) => flag(a != b),
            (AudioWorklet(a), AudioWorklet(b)) => flag(a != b),
            (Unknown(a), Unknown(b)) => flag(a != b),
            // Kind change is always a rebuild.
            _ => RebuildRequired,
        }
    }
}

#[inline]
fn flag(rebuild: bool) -> UpdateKind {
    if rebuild {
        UpdateKind::RebuildRequired
    } else {
        UpdateKind::None
    }
}

#[inline]
fn param(changed: bool) -> UpdateKind {
    if changed {
        UpdateKind::Parameter
    } else {
        UpdateKind::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_kinds() -> Vec<NodeDescription> {
        vec![
            NodeDescription::Destination(DestinationDescription { channel_count: 2 }),
            NodeDescription::Gain(GainDescription {
                gain: 0.5,
                channels: ChannelConfig::stereo(),
            }),
            NodeDescription::ConstantSource(ConstantSourceDescription {
                offset: 1.0,
                start_frame: Some(0),
                stop_frame: None,
            }),
            NodeDescription::Oscillator(OscillatorDescription {
                waveform: Waveform::Sawtooth,
                frequency: 440.0,
                detune: 0.0,
                start_frame: Some(128),
                stop_frame: Some(48_000),
            }),
            NodeDescription::Delay(DelayDescription {
                delay_frames: 100.0,
                max_delay_frames: 48_000,
                channels: ChannelConfig::stereo(),
            }),
            NodeDescription::BiquadFilter(BiquadFilterDescription {
                filter_type: BiquadFilterType::Lowpass,
                frequency: 350.0,
                detune: 0.0,
                q: 1.0,
                gain: 0.0,
                channels: ChannelConfig::stereo(),
            }),
            NodeDescription::IirFilter(IirFilterDescription {
                feedforward: vec![0.1, 0.2],
                feedback: vec![1.0, -0.5],
                channels: ChannelConfig::stereo(),
            }),
            NodeDescription::StereoPanner(StereoPannerDescription {
                pan: -0.3,
                channels: ChannelConfig::stereo(),
            }),
            NodeDescription::ScriptProcessor(ScriptProcessorDescription {
                buffer_frames: 256,
                input_channels: 2,
                output_channels: 2,
            }),
            NodeDescription::AudioWorklet(AudioWorkletDescription {
                processor_name: "noise-gate".to_string(),
                param_names: vec!["attack".to_string(), "threshold".to_string()],
                channels: ChannelConfig::stereo(),
            }),
            NodeDescription::Unknown(UnknownDescription {
                kind_tag: 200,
                payload: vec![1, 2, 3],
            }),
        ]
    }

    #[test]
    fn test_classify_is_reflexively_none() {
        for desc in all_kinds() {
            assert_eq!(
                desc.classify_update(&desc),
                UpdateKind::None,
                "{desc:?}"
            );
        }
    }

    #[test]
    fn test_classify_kind_change_rebuilds() {
        let kinds = all_kinds();
        assert_eq!(
            kinds[0].classify_update(&kinds[1]),
            UpdateKind::RebuildRequired
        );
    }

    #[test]
    fn test_classify_scalar_change_is_parameter() {
        let old = NodeDescription::Gain(GainDescription {
            gain: 0.5,
            channels: ChannelConfig::stereo(),
        });
        let new = NodeDescription::Gain(GainDescription {
            gain: 0.75,
            channels: ChannelConfig::stereo(),
        });
        assert_eq!(old.classify_update(&new), UpdateKind::Parameter);
    }

    #[test]
    fn test_classify_channel_change_rebuilds() {
        let old = NodeDescription::Gain(GainDescription {
            gain: 0.5,
            channels: ChannelConfig::stereo(),
        });
        let new = NodeDescription::Gain(GainDescription {
            gain: 0.5,
            channels: ChannelConfig {
                count: 1,
                interpretation: ChannelInterpretation::Speakers,
            },
        });
        assert_eq!(old.classify_update(&new), UpdateKind::RebuildRequired);
        // A channel change alongside a parameter change still rebuilds.
        let both = NodeDescription::Gain(GainDescription {
            gain: 0.9,
            channels: ChannelConfig {
                count: 1,
                interpretation: ChannelInterpretation::Speakers,
            },
        });
        assert_eq!(old.classify_update(&both), UpdateKind::RebuildRequired);
    }

    #[test]
    fn test_payload_roundtrip_every_kind() {
        for desc in all_kinds() {
            let mut writer = WireWriter::new();
            desc.encode_wire_payload(&mut writer);
            let bytes = writer.into_bytes();
            let mut reader = WireReader::new(&bytes);
            let decoded =
                NodeDescription::decode_wire_payload(desc.kind_tag(), &mut reader).unwrap();
            assert_eq!(decoded, desc);
            assert!(reader.is_empty(), "trailing bytes for {desc:?}");
        }
    }

    #[test]
    fn test_truncated_payload_fails() {
        let desc = NodeDescription::Oscillator(OscillatorDescription {
            waveform: Waveform::Sine,
            frequency: 220.0,
            detune: 10.0,
            start_frame: Some(64),
            stop_frame: None,
        });
        let mut writer = WireWriter::new();
        desc.encode_wire_payload(&mut writer);
        let bytes = writer.into_bytes();
        for cut in 0..bytes.len() {
            let mut reader = WireReader::new(&bytes[..cut]);
            assert!(
                NodeDescription::decode_wire_payload(desc.kind_tag(), &mut reader).is_err(),
                "cut at {cut} decoded"
            );
        }
    }
}
