//! Render-thread node implementations.
//!
//! A render node is the executable counterpart of one [`NodeDescription`].
//! `process` runs once per quantum on the render thread and must complete
//! in bounded time: no allocation, no blocking, no mutexes. All per-node
//! buffers are sized at construction on the control thread.

mod basic;
mod delay;
mod filter;
mod script;
mod source;

pub use basic::{DestinationNode, GainNode, SilenceNode, StereoPannerNode};
pub use delay::DelayNode;
pub use filter::{BiquadFilterNode, IirFilterNode};
pub use script::ScriptBridgeNode;
pub use source::{ConstantSourceNode, OscillatorNode};

use crate::bridge::BridgeEndpoint;
use crate::description::{NodeDescription, NodeId, ParamKey};
use crate::Result;
use cadenza_core::mixing::ChannelInterpretation;
use cadenza_core::{AtomicFloat, AudioBus};
use std::sync::Arc;
use std::time::Duration;

/// Per-quantum invariants handed to every `process` call.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext {
    pub sample_rate: f32,
    /// Absolute frame index of the first frame of this quantum.
    pub quantum_start_frame: u64,
    pub frames: usize,
}

/// Executable node. Exactly one input bus and one output bus; the executor
/// mixes fan-in into the input bus before calling `process`.
pub trait RenderNode: Send {
    /// Renders one quantum. Must fully write the active channels of
    /// `output`.
    fn process(&mut self, ctx: &RenderContext, input: &AudioBus, output: &mut AudioBus);

    /// Applies a `Parameter`-classified replacement description. Invoked
    /// between quanta by the thread that calls `process`, or writes only
    /// through atomics.
    fn apply_description(&mut self, description: &NodeDescription);

    /// Atomic cell backing a parameter, for automation.
    fn param(&self, key: ParamKey) -> Option<&AtomicFloat> {
        let _ = key;
        None
    }
}

/// Everything the factory needs besides the description itself.
#[derive(Clone)]
pub struct BuildContext {
    pub quantum_size: usize,
    pub sample_rate: f32,
    pub bridge_timeout: Duration,
    /// Offline rendering calls script processors synchronously instead of
    /// waiting on the bridge.
    pub offline: bool,
}

/// A freshly built node plus the bus shape the executor must provide.
pub struct BuiltNode {
    pub node: Box<dyn RenderNode>,
    pub input_channels: usize,
    pub output_channels: usize,
    pub interpretation: ChannelInterpretation,
}

/// Resolves cross-referenced resources (bridge endpoints for script
/// processors and worklets) while building nodes on the control thread.
pub trait ResourceResolver: Send + Sync {
    fn bridge_endpoint(&self, node: NodeId) -> Option<Arc<BridgeEndpoint>>;
}

/// Resolver with no resources; script nodes render silence.
pub struct NoResources;

impl ResourceResolver for NoResources {
    fn bridge_endpoint(&self, _node: NodeId) -> Option<Arc<BridgeEndpoint>> {
        None
    }
}

/// Control-thread factory. Never blocks and never touches render-thread
/// state; the returned node is handed to the executor through an update.
pub fn make_render_node(
    description: &NodeDescription,
    node_id: NodeId,
    ctx: &BuildContext,
    resolver: &dyn ResourceResolver,
) -> Result<BuiltNode> {
    use NodeDescription::*;
    Ok(match description {
        Destination(d) => {
            let channels = d.channel_count as usize;
            BuiltNode {
                node: Box::new(DestinationNode::new()),
                input_channels: channels,
                output_channels: channels,
                interpretation: ChannelInterpretation::Speakers,
            }
        }
        Gain(d) => {
            let channels = d.channels.count as usize;
            BuiltNode {
                node: Box::new(GainNode::new(d.gain)),
                input_channels: channels,
                output_channels: channels,
                interpretation: d.channels.interpretation,
            }
        }
        ConstantSource(d) => BuiltNode {
            node: Box::new(ConstantSourceNode::new(d)),
            input_channels: 1,
            output_channels: 1,
            interpretation: ChannelInterpretation::Speakers,
        },
        Oscillator(d) => BuiltNode {
            node: Box::new(OscillatorNode::new(d)),
            input_channels: 1,
            output_channels: 1,
            interpretation: ChannelInterpretation::Speakers,
        },
        Delay(d) => {
            let channels = d.channels.count as usize;
            BuiltNode {
                node: Box::new(DelayNode::new(d, channels, ctx.quantum_size)),
                input_channels: channels,
                output_channels: channels,
                interpretation: d.channels.interpretation,
            }
        }
        BiquadFilter(d) => {
            let channels = d.channels.count as usize;
            BuiltNode {
                node: Box::new(BiquadFilterNode::new(d, channels)),
                input_channels: channels,
                output_channels: channels,
                interpretation: d.channels.interpretation,
            }
        }
        IirFilter(d) => {
            let channels = d.channels.count as usize;
            BuiltNode {
                node: Box::new(IirFilterNode::new(d, channels)),
                input_channels: channels,
                output_channels: channels,
                interpretation: d.channels.interpretation,
            }
        }
        StereoPanner(d) => BuiltNode {
            node: Box::new(StereoPannerNode::new(d.pan)),
            input_channels: 2,
            output_channels: 2,
            interpretation: d.channels.interpretation,
        },
        ScriptProcessor(d) => {
            let endpoint = resolver.bridge_endpoint(node_id);
            BuiltNode {
                node: Box::new(ScriptBridgeNode::new(
                    endpoint,
                    d.output_channels as usize,
                    ctx.quantum_size,
                    ctx.bridge_timeout,
                    ctx.offline,
                )),
                input_channels: d.input_channels as usize,
                output_channels: d.output_channels as usize,
                interpretation: ChannelInterpretation::Speakers,
            }
        }
        AudioWorklet(d) => {
            let channels = d.channels.count as usize;
            let endpoint = resolver.bridge_endpoint(node_id);
            BuiltNode {
                node: Box::new(ScriptBridgeNode::new(
                    endpoint,
                    channels,
                    ctx.quantum_size,
                    ctx.bridge_timeout,
                    ctx.offline,
                )),
                input_channels: channels,
                output_channels: channels,
                interpretation: d.channels.interpretation,
            }
        }
        Unknown(_) => BuiltNode {
            node: Box::new(SilenceNode),
            input_channels: 1,
            output_channels: 1,
            interpretation: ChannelInterpretation::Discrete,
        },
    })
}
