//! Live node graph and its render-graph snapshot.
//!
//! The live graph is the control thread's mutable model: the application
//! adds nodes, wires inputs, and schedules parameter changes in seconds.
//! [`LiveGraph::snapshot`] walks it from the destination sink and emits a
//! deterministic [`GraphDescription`] with frame-timed scheduling, which is
//! the only thing the render side ever sees.

use crate::codec::GraphDescription;
use crate::description::{
    AudioWorkletDescription, AutomationEvent, AutomationKind, BiquadFilterDescription,
    BiquadFilterType, ChannelConfig, Connection, ConstantSourceDescription,
    DelayDescription, DestinationDescription, GainDescription, IirFilterDescription,
    NodeDescription, NodeId, OscillatorDescription, ParamKey, ScriptProcessorDescription,
    StereoPannerDescription, UnknownDescription, Waveform,
};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};

/// Control-side configuration of one node, with scheduling in seconds.
/// Negative times mean "not scheduled".
#[derive(Debug, Clone)]
pub enum LiveNodeSpec {
    Destination {
        channel_count: u32,
    },
    Gain {
        gain: f32,
        channels: ChannelConfig,
    },
    ConstantSource {
        offset: f32,
        start_time: f64,
        stop_time: f64,
    },
    Oscillator {
        waveform: Waveform,
        frequency: f32,
        detune: f32,
        start_time: f64,
        stop_time: f64,
    },
    Delay {
        delay_seconds: f64,
        max_delay_seconds: f64,
        channels: ChannelConfig,
    },
    BiquadFilter {
        filter_type: BiquadFilterType,
        frequency: f32,
        detune: f32,
        q: f32,
        gain: f32,
        channels: ChannelConfig,
    },
    IirFilter {
        feedforward: Vec<f64>,
        feedback: Vec<f64>,
        channels: ChannelConfig,
    },
    StereoPanner {
        pan: f32,
        channels: ChannelConfig,
    },
    ScriptProcessor {
        buffer_frames: u32,
        input_channels: u32,
        output_channels: u32,
    },
    AudioWorklet {
        processor_name: String,
        param_names: Vec<String>,
        channels: ChannelConfig,
    },
    /// An application node type this engine does not recognize. Snapshots
    /// carry it as `Unknown` rather than aborting.
    Opaque {
        kind_tag: u8,
    },
}

#[derive(Debug, Clone)]
struct ScheduledChange {
    param: ParamKey,
    at_seconds: f64,
    kind: AutomationKind,
}

#[derive(Debug, Clone)]
struct LiveNode {
    spec: LiveNodeSpec,
    inputs: Vec<Connection>,
    automation: Vec<ScheduledChange>,
}

/// The control thread's mutable node graph.
#[derive(Debug)]
pub struct LiveGraph {
    sample_rate: f32,
    next_id: u64,
    nodes: HashMap<NodeId, LiveNode>,
    destination: Option<NodeId>,
}

impl LiveGraph {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            next_id: 1,
            nodes: HashMap::new(),
            destination: None,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Adds a node and returns its stable id. The first destination added
    /// becomes the graph's sink.
    pub fn add_node(&mut self, spec: LiveNodeSpec) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        if self.destination.is_none() {
            if let LiveNodeSpec::Destination { .. } = spec {
                self.destination = Some(id);
            }
        }
        self.nodes.insert(
            id,
            LiveNode {
                spec,
                inputs: Vec::new(),
                automation: Vec::new(),
            },
        );
        id
    }

    pub fn remove_node(&mut self, id: NodeId) {
        self.nodes.remove(&id);
        if self.destination == Some(id) {
            self.destination = None;
        }
        for node in self.nodes.values_mut() {
            node.inputs.retain(|c| c.source != id);
        }
    }

    pub fn node_spec_mut(&mut self, id: NodeId) -> Result<&mut LiveNodeSpec> {
        self.nodes
            .get_mut(&id)
            .map(|n| &mut n.spec)
            .ok_or(Error::StaleHandle(id))
    }

    pub fn connect(
        &mut self,
        source: NodeId,
        destination: NodeId,
        output_index: u32,
        input_index: u32,
    ) -> Result<()> {
        if !self.nodes.contains_key(&source) {
            return Err(Error::UnknownNode(source));
        }
        let node = self
            .nodes
            .get_mut(&destination)
            .ok_or(Error::UnknownNode(destination))?;
        let connection = Connection {
            source,
            destination,
            output_index,
            input_index,
        };
        if !node.inputs.contains(&connection) {
            node.inputs.push(connection);
        }
        Ok(())
    }

    pub fn disconnect(&mut self, source: NodeId, destination: NodeId) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&destination)
            .ok_or(Error::UnknownNode(destination))?;
        node.inputs.retain(|c| c.source != source);
        Ok(())
    }

    pub fn schedule_value(
        &mut self,
        node: NodeId,
        param: ParamKey,
        at_seconds: f64,
        value: f32,
    ) -> Result<()> {
        self.schedule(node, param, at_seconds, AutomationKind::SetValue(value))
    }

    pub fn schedule_linear_ramp(
        &mut self,
        node: NodeId,
        param: ParamKey,
        end_seconds: f64,
        value: f32,
    ) -> Result<()> {
        self.schedule(
            node,
            param,
            end_seconds,
            AutomationKind::LinearRampToValue(value),
        )
    }

    fn schedule(
        &mut self,
        node: NodeId,
        param: ParamKey,
        at_seconds: f64,
        kind: AutomationKind,
    ) -> Result<()> {
        let live = self.nodes.get_mut(&node).ok_or(Error::StaleHandle(node))?;
        live.automation.push(ScheduledChange {
            param,
            at_seconds,
            kind,
        });
        Ok(())
    }

    /// Captures the renderable graph reachable from the destination.
    ///
    /// Depth-first from the sink along input connections, each node visited
    /// once. Ordering of the result does not depend on traversal order.
    pub fn snapshot(&self) -> Result<GraphDescription> {
        let destination = self.destination.ok_or(Error::MissingDestination)?;
        let mut graph = GraphDescription {
            sample_rate: self.sample_rate,
            destination: Some(destination),
            ..Default::default()
        };

        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![destination];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            graph.nodes.insert(id, self.describe(&node.spec));
            for change in &node.automation {
                if let Some(event) = self.automation_event(id, change) {
                    graph.automations.push(event);
                }
            }
            for connection in &node.inputs {
                if self.nodes.contains_key(&connection.source) {
                    graph.connections.push(*connection);
                    stack.push(connection.source);
                }
            }
        }

        graph.normalize();
        Ok(graph)
    }

    fn describe(&self, spec: &LiveNodeSpec) -> NodeDescription {
        let rate = self.sample_rate;
        match spec {
            LiveNodeSpec::Destination { channel_count } => {
                NodeDescription::Destination(DestinationDescription {
                    channel_count: *channel_count,
                })
            }
            LiveNodeSpec::Gain { gain, channels } => NodeDescription::Gain(GainDescription {
                gain: *gain,
                channels: *channels,
            }),
            LiveNodeSpec::ConstantSource {
                offset,
                start_time,
                stop_time,
            } => NodeDescription::ConstantSource(ConstantSourceDescription {
                offset: *offset,
                start_frame: seconds_to_frames(*start_time, rate),
                stop_frame: seconds_to_frames(*stop_time, rate),
            }),
            LiveNodeSpec::Oscillator {
                waveform,
                frequency,
                detune,
                start_time,
                stop_time,
            } => NodeDescription::Oscillator(OscillatorDescription {
                waveform: *waveform,
                frequency: *frequency,
                detune: *detune,
                start_frame: seconds_to_frames(*start_time, rate),
                stop_frame: seconds_to_frames(*stop_time, rate),
            }),
            LiveNodeSpec::Delay {
                delay_seconds,
                max_delay_seconds,
                channels,
            } => NodeDescription::Delay(DelayDescription {
                delay_frames: (delay_seconds.max(0.0) * rate as f64) as f32,
                max_delay_frames: (max_delay_seconds.max(0.0) * rate as f64).ceil() as u64,
                channels: *channels,
            }),
            LiveNodeSpec::BiquadFilter {
                filter_type,
                frequency,
                detune,
                q,
                gain,
                channels,
            } => NodeDescription::BiquadFilter(BiquadFilterDescription {
                filter_type: *filter_type,
                frequency: *frequency,
                detune: *detune,
                q: *q,
                gain: *gain,
                channels: *channels,
            }),
            LiveNodeSpec::IirFilter {
                feedforward,
                feedback,
                channels,
            } => NodeDescription::IirFilter(IirFilterDescription {
                feedforward: feedforward.clone(),
                feedback: feedback.clone(),
                channels: *channels,
            }),
            LiveNodeSpec::StereoPanner { pan, channels } => {
                NodeDescription::StereoPanner(StereoPannerDescription {
                    pan: *pan,
                    channels: *channels,
                })
            }
            LiveNodeSpec::ScriptProcessor {
                buffer_frames,
                input_channels,
                output_channels,
            } => NodeDescription::ScriptProcessor(ScriptProcessorDescription {
                buffer_frames: *buffer_frames,
                input_channels: *input_channels,
                output_channels: *output_channels,
            }),
            LiveNodeSpec::AudioWorklet {
                processor_name,
                param_names,
                channels,
            } => {
                let mut sorted = param_names.clone();
                sorted.sort_unstable();
                NodeDescription::AudioWorklet(AudioWorkletDescription {
                    processor_name: processor_name.clone(),
                    param_names: sorted,
                    channels: *channels,
                })
            }
            LiveNodeSpec::Opaque { kind_tag } => NodeDescription::Unknown(UnknownDescription {
                kind_tag: *kind_tag,
                payload: Vec::new(),
            }),
        }
    }

    fn automation_event(&self, node: NodeId, change: &ScheduledChange) -> Option<AutomationEvent> {
        if change.at_seconds < 0.0 {
            return None;
        }
        let exact = change.at_seconds * self.sample_rate as f64;
        // Set-values land on the frame they were scheduled at; ramps finish
        // no earlier than their scheduled end.
        let at_frame = match change.kind {
            AutomationKind::SetValue(_) => exact.floor() as u64,
            AutomationKind::LinearRampToValue(_) => exact.ceil() as u64,
        };
        Some(AutomationEvent {
            node,
            param: change.param,
            at_frame,
            kind: change.kind,
        })
    }
}

fn seconds_to_frames(seconds: f64, sample_rate: f32) -> Option<u64> {
    if seconds < 0.0 {
        None
    } else {
        Some((seconds * sample_rate as f64).floor() as u64)
    }
}
