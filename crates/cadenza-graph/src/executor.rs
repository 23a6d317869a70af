//! Render-thread graph execution and the control-side update path.
//!
//! The control thread builds every allocation-bearing structure (render
//! nodes, buses, automation lanes) into an update object and hands it to
//! the render thread through a lock-free ring. The render thread commits
//! at quantum start by swapping its topology, carrying unchanged nodes
//! (and their state) over by move, and pushes the retired structure back
//! on a second ring so deallocation also happens off the render thread.
//! An observer therefore sees each graph generation all-or-nothing.

use crate::codec::GraphDescription;
use crate::description::{
    AutomationKind, NodeDescription, NodeId, ParamKey, UpdateKind,
};
use crate::nodes::{make_render_node, BuildContext, RenderContext, RenderNode, ResourceResolver};
use crate::{Error, Result};
use cadenza_core::mixing::{self, ChannelInterpretation};
use cadenza_core::{
    record_ring, AudioBus, EngineConfig, RingConsumer, RingProducer, ThrottleGate,
};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

struct NodeSlot {
    node: Box<dyn RenderNode>,
    input: AudioBus,
    output: AudioBus,
    interpretation: ChannelInterpretation,
}

struct AutomationLane {
    slot: usize,
    param: ParamKey,
    /// Sorted by frame.
    events: Vec<(u64, AutomationKind)>,
    cursor: usize,
    last_value: f32,
    last_frame: u64,
}

impl AutomationLane {
    /// k-rate evaluation at the start of a quantum. `frame` never moves
    /// backwards.
    fn value_at(&mut self, frame: u64) -> f32 {
        while self.cursor < self.events.len() && self.events[self.cursor].0 <= frame {
            let (at, kind) = self.events[self.cursor];
            self.last_value = match kind {
                AutomationKind::SetValue(v) | AutomationKind::LinearRampToValue(v) => v,
            };
            self.last_frame = at;
            self.cursor += 1;
        }
        if let Some(&(at, AutomationKind::LinearRampToValue(target))) =
            self.events.get(self.cursor)
        {
            if at > self.last_frame {
                let t = (frame - self.last_frame) as f32 / (at - self.last_frame) as f32;
                return self.last_value + (target - self.last_value) * t;
            }
        }
        self.last_value
    }
}

/// One executable generation of the graph. Slots are dense, ordered by
/// ascending `NodeId`; `None` marks a slot whose node is carried over from
/// the previous generation at commit time.
pub struct Topology {
    generation: u64,
    slots: Vec<Option<NodeSlot>>,
    /// Processing order, sources before consumers. Nodes caught in an
    /// (illegal) cycle are left out and stay silent.
    order: Vec<usize>,
    inputs: Vec<SmallVec<[usize; 4]>>,
    lanes: Vec<AutomationLane>,
    destination: usize,
}

/// Structural replacement: a new topology plus move instructions for
/// surviving nodes.
pub struct GraphUpdate {
    topology: Box<Topology>,
    /// (new slot, old slot) pairs whose render nodes move across.
    carry: Vec<(usize, usize)>,
    /// Parameter changes for carried nodes, applied after the move.
    reapply: Vec<(usize, NodeDescription)>,
}

/// In-place parameter batch for the current generation.
pub struct ParameterUpdate {
    generation: u64,
    changes: Vec<(usize, NodeDescription)>,
}

pub enum EngineUpdate {
    Graph(GraphUpdate),
    Parameters(Box<ParameterUpdate>),
}

/// Garbage shipped back to the control thread for deallocation.
pub enum Retired {
    Topology(Box<Topology>),
    Parameters(Box<ParameterUpdate>),
}

/// What [`GraphController::install`] did with the new description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSummary {
    Unchanged,
    ParametersOnly { changed: usize },
    Rebuilt { built: usize, carried: usize },
}

/// Render-thread half. `render_quantum` is the only entry point and obeys
/// the real-time contract: no allocation, no blocking, no mutexes.
pub struct GraphExecutor {
    topology: Option<Box<Topology>>,
    updates: RingConsumer<EngineUpdate>,
    retired: RingProducer<Retired>,
    position: u64,
    quantum: usize,
    sample_rate: f32,
    drop_gate: ThrottleGate,
}

impl GraphExecutor {
    /// Absolute frame index of the next quantum.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn render_quantum(&mut self, out: &mut AudioBus) {
        while let Some(update) = self.updates.try_pop() {
            self.commit(update);
        }

        let ctx = RenderContext {
            sample_rate: self.sample_rate,
            quantum_start_frame: self.position,
            frames: self.quantum,
        };
        self.position += self.quantum as u64;

        out.zero();
        let Some(topology) = self.topology.as_mut() else {
            return;
        };
        let Topology {
            slots,
            order,
            inputs,
            lanes,
            destination,
            ..
        } = &mut **topology;

        for lane in lanes.iter_mut() {
            let value = lane.value_at(ctx.quantum_start_frame);
            if let Some(slot) = slots[lane.slot].as_ref() {
                if let Some(cell) = slot.node.param(lane.param) {
                    cell.set(value);
                }
            }
        }

        for &idx in order.iter() {
            let (interpretation, mut input) = match slots[idx].as_mut() {
                Some(slot) => (slot.interpretation, std::mem::take(&mut slot.input)),
                None => continue,
            };
            input.zero();
            for &src in &inputs[idx] {
                if let Some(source) = slots[src].as_ref() {
                    mixing::mix_into(&mut input, &source.output, interpretation);
                }
            }
            if let Some(slot) = slots[idx].as_mut() {
                let mut output = std::mem::take(&mut slot.output);
                slot.node.process(&ctx, &input, &mut output);
                slot.output = output;
                slot.input = input;
            }
        }

        if let Some(slot) = slots[*destination].as_ref() {
            let _ = out.copy_from(&slot.output);
        }
    }

    fn commit(&mut self, update: EngineUpdate) {
        match update {
            EngineUpdate::Graph(GraphUpdate {
                mut topology,
                carry,
                reapply,
            }) => {
                if let Some(mut old) = self.topology.take() {
                    for &(new_idx, old_idx) in &carry {
                        topology.slots[new_idx] = old.slots[old_idx].take();
                    }
                    self.retire(Retired::Topology(old));
                }
                for (idx, description) in &reapply {
                    if let Some(slot) = topology.slots[*idx].as_mut() {
                        slot.node.apply_description(description);
                    }
                }
                self.topology = Some(topology);
            }
            EngineUpdate::Parameters(batch) => {
                if let Some(topology) = self.topology.as_mut() {
                    if topology.generation == batch.generation {
                        for (idx, description) in &batch.changes {
                            if let Some(slot) = topology.slots[*idx].as_mut() {
                                slot.node.apply_description(description);
                            }
                        }
                    }
                    // A stale generation is simply dropped; the controller
                    // has already superseded it structurally.
                }
                self.retire(Retired::Parameters(batch));
            }
        }
    }

    fn retire(&mut self, garbage: Retired) {
        if self.retired.try_push(garbage).is_err() && self.drop_gate.admit() {
            tracing::warn!("retire ring full; deallocating on the render thread");
        }
    }
}

/// Control-thread half: diffs descriptions, builds updates, reclaims
/// retired structures.
pub struct GraphController {
    build: BuildContext,
    resolver: Arc<dyn ResourceResolver>,
    updates: RingProducer<EngineUpdate>,
    retired: RingConsumer<Retired>,
    current: Option<GraphDescription>,
    layout: HashMap<NodeId, usize>,
    generation: u64,
}

/// Creates a connected controller/executor pair.
pub fn executor_pair(
    config: &EngineConfig,
    resolver: Arc<dyn ResourceResolver>,
    offline: bool,
) -> Result<(GraphController, GraphExecutor)> {
    config.validate()?;
    let queue_len = config.update_queue_len.next_power_of_two();
    let (update_tx, update_rx) = record_ring(queue_len)?;
    let (retired_tx, retired_rx) = record_ring(queue_len * 2)?;
    let controller = GraphController {
        build: BuildContext {
            quantum_size: config.quantum_size,
            sample_rate: config.sample_rate,
            bridge_timeout: config.bridge_timeout,
            offline,
        },
        resolver,
        updates: update_tx,
        retired: retired_rx,
        current: None,
        layout: HashMap::new(),
        generation: 0,
    };
    let executor = GraphExecutor {
        topology: None,
        updates: update_rx,
        retired: retired_tx,
        position: 0,
        quantum: config.quantum_size,
        sample_rate: config.sample_rate,
        drop_gate: ThrottleGate::default(),
    };
    Ok((controller, executor))
}

impl GraphController {
    /// Installs a new graph generation, classifying it against the current
    /// one and publishing the cheapest sufficient update.
    pub fn install(&mut self, graph: GraphDescription) -> Result<UpdateSummary> {
        let plan = self.plan(&graph);
        match plan {
            Plan::Unchanged => Ok(UpdateSummary::Unchanged),
            Plan::Parameters(changes) => {
                let changed = changes.len();
                let mapped: Vec<(usize, NodeDescription)> = changes
                    .into_iter()
                    .filter_map(|(id, desc)| self.layout.get(&id).map(|&idx| (idx, desc)))
                    .collect();
                let update = EngineUpdate::Parameters(Box::new(ParameterUpdate {
                    generation: self.generation,
                    changes: mapped,
                }));
                if self.updates.try_push(update).is_err() {
                    return Err(Error::UpdateQueueFull);
                }
                self.current = Some(graph);
                Ok(UpdateSummary::ParametersOnly { changed })
            }
            Plan::Structural { rebuilt } => {
                let (update, layout, summary) = self.build_update(&graph, &rebuilt)?;
                if self.updates.try_push(EngineUpdate::Graph(update)).is_err() {
                    return Err(Error::UpdateQueueFull);
                }
                self.generation += 1;
                self.layout = layout;
                self.current = Some(graph);
                Ok(summary)
            }
        }
    }

    /// Drops structures the render thread has retired. Call periodically
    /// from the control thread.
    pub fn drain_retired(&mut self) {
        while self.retired.try_pop().is_some() {}
    }

    fn plan(&self, graph: &GraphDescription) -> Plan {
        let Some(current) = &self.current else {
            return Plan::Structural {
                rebuilt: graph.nodes.keys().copied().collect(),
            };
        };

        let mut structural = current.destination != graph.destination
            || current.connections != graph.connections
            || current.sample_rate != graph.sample_rate
            || current.automations != graph.automations
            || current.nodes.keys().any(|id| !graph.nodes.contains_key(id));

        let mut rebuilt = Vec::new();
        let mut parameters = Vec::new();
        for (id, new_desc) in &graph.nodes {
            match current.nodes.get(id) {
                None => {
                    structural = true;
                    rebuilt.push(*id);
                }
                Some(old) => match old.classify_update(new_desc) {
                    UpdateKind::None => {}
                    UpdateKind::Parameter => parameters.push((*id, new_desc.clone())),
                    UpdateKind::RebuildRequired => {
                        structural = true;
                        rebuilt.push(*id);
                    }
                },
            }
        }

        if structural {
            Plan::Structural { rebuilt }
        } else if parameters.is_empty() {
            Plan::Unchanged
        } else {
            Plan::Parameters(parameters)
        }
    }

    fn build_update(
        &self,
        graph: &GraphDescription,
        rebuilt: &[NodeId],
    ) -> Result<(GraphUpdate, HashMap<NodeId, usize>, UpdateSummary)> {
        let destination_id = graph.destination.ok_or(Error::MissingDestination)?;
        if !graph.nodes.contains_key(&destination_id) {
            return Err(Error::UnknownNode(destination_id));
        }

        // Dense slot layout in ascending id order.
        let layout: HashMap<NodeId, usize> = graph
            .nodes
            .keys()
            .enumerate()
            .map(|(idx, id)| (*id, idx))
            .collect();
        let count = graph.nodes.len();

        let mut inputs: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); count];
        let mut out_edges: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); count];
        for connection in &graph.connections {
            let src = *layout
                .get(&connection.source)
                .ok_or(Error::UnknownNode(connection.source))?;
            let dst = *layout
                .get(&connection.destination)
                .ok_or(Error::UnknownNode(connection.destination))?;
            inputs[dst].push(src);
            out_edges[src].push(dst);
        }

        let order = processing_order(&inputs, &out_edges);
        if order.len() < count {
            tracing::warn!(
                muted = count - order.len(),
                "graph contains a cycle; nodes in it will stay silent"
            );
        }

        let mut slots: Vec<Option<NodeSlot>> = Vec::with_capacity(count);
        let mut carry = Vec::new();
        let mut reapply = Vec::new();
        let mut built = 0usize;

        for (id, description) in &graph.nodes {
            let idx = layout[id];
            let survives = if rebuilt.contains(id) {
                None
            } else {
                self.current
                    .as_ref()
                    .and_then(|c| c.nodes.get(id))
                    .map(|old| old.classify_update(description))
                    .filter(|kind| *kind != UpdateKind::RebuildRequired)
                    .and_then(|kind| self.layout.get(id).map(|&old_idx| (kind, old_idx)))
            };
            if let Some((kind, old_idx)) = survives {
                slots.push(None);
                carry.push((idx, old_idx));
                if kind == UpdateKind::Parameter {
                    reapply.push((idx, description.clone()));
                }
            } else {
                let built_node =
                    make_render_node(description, *id, &self.build, self.resolver.as_ref())?;
                slots.push(Some(NodeSlot {
                    node: built_node.node,
                    input: AudioBus::new(built_node.input_channels, self.build.quantum_size),
                    output: AudioBus::new(built_node.output_channels, self.build.quantum_size),
                    interpretation: built_node.interpretation,
                }));
                built += 1;
            }
        }

        let lanes = build_lanes(graph, &layout);

        let carried = carry.len();
        let update = GraphUpdate {
            topology: Box::new(Topology {
                generation: self.generation + 1,
                slots,
                order,
                inputs,
                lanes,
                destination: layout[&destination_id],
            }),
            carry,
            reapply,
        };
        Ok((update, layout, UpdateSummary::Rebuilt { built, carried }))
    }
}

enum Plan {
    Unchanged,
    Parameters(Vec<(NodeId, NodeDescription)>),
    Structural { rebuilt: Vec<NodeId> },
}

/// Kahn's algorithm over the connection lists. Nodes trapped in cycles are
/// omitted.
fn processing_order(
    inputs: &[SmallVec<[usize; 4]>],
    out_edges: &[SmallVec<[usize; 4]>],
) -> Vec<usize> {
    let count = inputs.len();
    let mut indegree: Vec<usize> = inputs.iter().map(|list| list.len()).collect();
    let mut queue: Vec<usize> = (0..count).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(count);
    while let Some(idx) = queue.pop() {
        order.push(idx);
        for &next in &out_edges[idx] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                queue.push(next);
            }
        }
    }
    order
}

fn build_lanes(graph: &GraphDescription, layout: &HashMap<NodeId, usize>) -> Vec<AutomationLane> {
    let mut lanes: Vec<AutomationLane> = Vec::new();
    for event in &graph.automations {
        let Some(&slot) = layout.get(&event.node) else {
            continue;
        };
        let initial = graph
            .nodes
            .get(&event.node)
            .and_then(|desc| initial_param_value(desc, event.param));
        let Some(initial) = initial else {
            continue; // Node kind has no such parameter.
        };
        match lanes
            .iter_mut()
            .find(|lane| lane.slot == slot && lane.param == event.param)
        {
            Some(lane) => lane.events.push((event.at_frame, event.kind)),
            None => lanes.push(AutomationLane {
                slot,
                param: event.param,
                events: vec![(event.at_frame, event.kind)],
                cursor: 0,
                last_value: initial,
                last_frame: 0,
            }),
        }
    }
    lanes
}

/// Static value a parameter starts from before automation touches it.
fn initial_param_value(description: &NodeDescription, param: ParamKey) -> Option<f32> {
    use NodeDescription::*;
    match (description, param) {
        (Gain(d), ParamKey::Gain) => Some(d.gain),
        (ConstantSource(d), ParamKey::Offset) => Some(d.offset),
        (Oscillator(d), ParamKey::Frequency) => Some(d.frequency),
        (Oscillator(d), ParamKey::Detune) => Some(d.detune),
        (Delay(d), ParamKey::DelayTime) => Some(d.delay_frames),
        (BiquadFilter(d), ParamKey::Frequency) => Some(d.frequency),
        (BiquadFilter(d), ParamKey::Detune) => Some(d.detune),
        (BiquadFilter(d), ParamKey::Q) => Some(d.q),
        (BiquadFilter(d), ParamKey::FilterGain) => Some(d.gain),
        (StereoPanner(d), ParamKey::Pan) => Some(d.pan),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::{
        AutomationEvent, ChannelConfig, Connection, DestinationDescription, GainDescription,
    };
    use crate::nodes::NoResources;
    use crate::snapshot::{LiveGraph, LiveNodeSpec};
    use crate::description::Waveform;
    use approx::assert_relative_eq;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    fn pair() -> (GraphController, GraphExecutor) {
        executor_pair(&config(), Arc::new(NoResources), false).unwrap()
    }

    fn constant_graph(offset: f32) -> GraphDescription {
        let mut live = LiveGraph::new(48000.0);
        let dest = live.add_node(LiveNodeSpec::Destination { channel_count: 1 });
        let src = live.add_node(LiveNodeSpec::ConstantSource {
            offset,
            start_time: 0.0,
            stop_time: -1.0,
        });
        live.connect(src, dest, 0, 0).unwrap();
        live.snapshot().unwrap()
    }

    #[test]
    fn test_renders_silence_without_topology() {
        let (_controller, mut executor) = pair();
        let mut out = AudioBus::new(2, 128);
        out.channel_mut(0).fill(5.0);
        executor.render_quantum(&mut out);
        assert!(out.channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_constant_source_reaches_destination() {
        let (mut controller, mut executor) = pair();
        let summary = controller.install(constant_graph(0.5)).unwrap();
        assert_eq!(summary, UpdateSummary::Rebuilt { built: 2, carried: 0 });
        let mut out = AudioBus::new(1, 128);
        executor.render_quantum(&mut out);
        assert!(out.channel(0).iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_update_observed_at_quantum_start_only() {
        let (mut controller, mut executor) = pair();
        controller.install(constant_graph(0.5)).unwrap();
        let mut out = AudioBus::new(1, 128);
        executor.render_quantum(&mut out);

        // Published mid-stream; next quantum picks it up atomically.
        controller.install(constant_graph(1.0)).unwrap();
        executor.render_quantum(&mut out);
        assert!(out.channel(0).iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_parameter_update_carries_node_state() {
        let (mut controller, mut executor) = pair();
        controller.install(constant_graph(0.25)).unwrap();
        let mut out = AudioBus::new(1, 128);
        executor.render_quantum(&mut out);

        let summary = controller.install(constant_graph(0.75)).unwrap();
        assert_eq!(summary, UpdateSummary::ParametersOnly { changed: 1 });
        executor.render_quantum(&mut out);
        assert!(out.channel(0).iter().all(|&s| s == 0.75));
    }

    #[test]
    fn test_unchanged_install_is_a_no_op() {
        let (mut controller, mut executor) = pair();
        controller.install(constant_graph(0.5)).unwrap();
        let mut out = AudioBus::new(1, 128);
        executor.render_quantum(&mut out);
        assert_eq!(
            controller.install(constant_graph(0.5)).unwrap(),
            UpdateSummary::Unchanged
        );
    }

    #[test]
    fn test_structural_change_rebuilds_only_affected_nodes() {
        let mut live = LiveGraph::new(48000.0);
        let dest = live.add_node(LiveNodeSpec::Destination { channel_count: 2 });
        let osc = live.add_node(LiveNodeSpec::Oscillator {
            waveform: Waveform::Sine,
            frequency: 440.0,
            detune: 0.0,
            start_time: 0.0,
            stop_time: -1.0,
        });
        let gain = live.add_node(LiveNodeSpec::Gain {
            gain: 0.5,
            channels: ChannelConfig::stereo(),
        });
        live.connect(osc, gain, 0, 0).unwrap();
        live.connect(gain, dest, 0, 0).unwrap();

        let (mut controller, mut executor) = pair();
        controller.install(live.snapshot().unwrap()).unwrap();
        let mut out = AudioBus::new(2, 128);
        executor.render_quantum(&mut out);

        // Adding a node changes topology but carries the other three.
        let extra = live.add_node(LiveNodeSpec::ConstantSource {
            offset: 0.1,
            start_time: 0.0,
            stop_time: -1.0,
        });
        live.connect(extra, dest, 0, 0).unwrap();
        let summary = controller.install(live.snapshot().unwrap()).unwrap();
        assert_eq!(summary, UpdateSummary::Rebuilt { built: 1, carried: 3 });
    }

    #[test]
    fn test_retired_structures_return_to_control_thread() {
        let (mut controller, mut executor) = pair();
        controller.install(constant_graph(0.5)).unwrap();
        let mut out = AudioBus::new(1, 128);
        executor.render_quantum(&mut out);
        controller.install(constant_graph(0.9)).unwrap();
        executor.render_quantum(&mut out);
        controller.drain_retired();
    }

    #[test]
    fn test_automation_set_value_applies_at_frame() {
        let mut graph = constant_graph(0.2);
        let source = *graph
            .nodes
            .iter()
            .find(|(_, d)| matches!(d, NodeDescription::ConstantSource(_)))
            .map(|(id, _)| id)
            .unwrap();
        graph.automations.push(AutomationEvent {
            node: source,
            param: ParamKey::Offset,
            at_frame: 128,
            kind: AutomationKind::SetValue(0.8),
        });
        graph.normalize();

        let (mut controller, mut executor) = pair();
        controller.install(graph).unwrap();
        let mut out = AudioBus::new(1, 128);
        executor.render_quantum(&mut out);
        assert_relative_eq!(out.channel(0)[0], 0.2);
        executor.render_quantum(&mut out);
        assert_relative_eq!(out.channel(0)[0], 0.8);
    }

    #[test]
    fn test_automation_linear_ramp_interpolates_per_quantum() {
        let mut graph = constant_graph(0.0);
        let source = *graph
            .nodes
            .iter()
            .find(|(_, d)| matches!(d, NodeDescription::ConstantSource(_)))
            .map(|(id, _)| id)
            .unwrap();
        graph.automations.push(AutomationEvent {
            node: source,
            param: ParamKey::Offset,
            at_frame: 512,
            kind: AutomationKind::LinearRampToValue(1.0),
        });
        graph.normalize();

        let (mut controller, mut executor) = pair();
        controller.install(graph).unwrap();
        let mut out = AudioBus::new(1, 128);
        executor.render_quantum(&mut out); // frame 0: 0.0
        assert_relative_eq!(out.channel(0)[0], 0.0);
        executor.render_quantum(&mut out); // frame 128: 0.25
        assert_relative_eq!(out.channel(0)[0], 0.25);
        executor.render_quantum(&mut out); // frame 256: 0.5
        assert_relative_eq!(out.channel(0)[0], 0.5);
        for _ in 0..3 {
            executor.render_quantum(&mut out);
        }
        // Past the ramp end the target holds.
        assert_relative_eq!(out.channel(0)[0], 1.0);
    }

    #[test]
    fn test_cycle_is_muted_not_fatal() {
        let mut graph = GraphDescription {
            sample_rate: 48000.0,
            destination: Some(NodeId(1)),
            ..Default::default()
        };
        graph.nodes.insert(
            NodeId(1),
            NodeDescription::Destination(DestinationDescription { channel_count: 1 }),
        );
        graph.nodes.insert(
            NodeId(2),
            NodeDescription::Gain(GainDescription {
                gain: 1.0,
                channels: ChannelConfig::stereo(),
            }),
        );
        graph.nodes.insert(
            NodeId(3),
            NodeDescription::Gain(GainDescription {
                gain: 1.0,
                channels: ChannelConfig::stereo(),
            }),
        );
        // 2 <-> 3 is a raw cycle; both must be muted.
        for (s, d) in [(2u64, 3u64), (3, 2), (3, 1)] {
            graph.connections.push(Connection {
                source: NodeId(s),
                destination: NodeId(d),
                output_index: 0,
                input_index: 0,
            });
        }
        graph.normalize();

        let (mut controller, mut executor) = pair();
        controller.install(graph).unwrap();
        let mut out = AudioBus::new(1, 128);
        executor.render_quantum(&mut out);
        assert!(out.channel(0).iter().all(|&s| s == 0.0));
    }
}
