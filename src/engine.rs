//! CadenzaEngine that coordinates the graph, bridge, and render halves.

use crate::{Error, Result};
use cadenza_core::{AudioBus, EngineConfig};
use cadenza_graph::bridge::{BridgeEndpoint, BridgeService, ProcessorFn};
use cadenza_graph::executor::{GraphController, GraphExecutor, UpdateSummary};
use cadenza_graph::nodes::ResourceResolver;
use cadenza_graph::snapshot::LiveGraph;
use cadenza_graph::{GraphDescription, NodeId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolver the node factory uses to find the bridge endpoint a script
/// processor or worklet node talks to.
#[derive(Default)]
pub(crate) struct BridgeRegistry {
    endpoints: Mutex<HashMap<NodeId, Arc<BridgeEndpoint>>>,
}

impl ResourceResolver for BridgeRegistry {
    fn bridge_endpoint(&self, node: NodeId) -> Option<Arc<BridgeEndpoint>> {
        self.endpoints.lock().get(&node).cloned()
    }
}

/// Control-thread handle to one rendering context.
///
/// The engine owns the live node graph and the update path to the render
/// thread. The render half ([`Renderer`]) is taken out once and driven by
/// the device callback; in offline mode it stays inside and
/// [`render_offline`](CadenzaEngine::render_offline) drives it inline.
pub struct CadenzaEngine {
    config: EngineConfig,
    offline: bool,
    graph: Mutex<LiveGraph>,
    controller: Mutex<GraphController>,
    renderer: Mutex<Option<GraphExecutor>>,
    bridges: Arc<BridgeRegistry>,
    services: Mutex<Vec<BridgeService>>,
}

/// Render half: owned by whoever runs the real-time callback.
pub struct Renderer {
    executor: GraphExecutor,
}

impl Renderer {
    /// Renders one quantum into `out`. Real-time safe.
    pub fn render_quantum(&mut self, out: &mut AudioBus) {
        self.executor.render_quantum(out);
    }

    /// Absolute frame index of the next quantum.
    pub fn position(&self) -> u64 {
        self.executor.position()
    }
}

impl CadenzaEngine {
    pub fn builder() -> crate::CadenzaEngineBuilder {
        crate::CadenzaEngineBuilder::default()
    }

    pub(crate) fn from_parts(
        config: EngineConfig,
        offline: bool,
        controller: GraphController,
        executor: GraphExecutor,
        bridges: Arc<BridgeRegistry>,
    ) -> Self {
        Self {
            graph: Mutex::new(LiveGraph::new(config.sample_rate)),
            config,
            offline,
            controller: Mutex::new(controller),
            renderer: Mutex::new(Some(executor)),
            bridges,
            services: Mutex::new(Vec::new()),
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.config.sample_rate
    }

    pub fn quantum_size(&self) -> usize {
        self.config.quantum_size
    }

    /// Mutates the live node graph. Changes become audible on the next
    /// [`commit`](Self::commit).
    ///
    /// # Example
    /// ```ignore
    /// engine.edit_graph(|graph| {
    ///     let dest = graph.add_node(LiveNodeSpec::Destination { channel_count: 2 });
    ///     let osc = graph.add_node(LiveNodeSpec::Oscillator { .. });
    ///     graph.connect(osc, dest, 0, 0)
    /// })?;
    /// ```
    pub fn edit_graph<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut LiveGraph) -> R,
    {
        f(&mut self.graph.lock())
    }

    /// Snapshots the live graph and publishes it to the render thread,
    /// reusing nodes whose changes are parameter-only.
    pub fn commit(&self) -> Result<UpdateSummary> {
        let description = self.graph.lock().snapshot()?;
        self.install(description)
    }

    /// Installs an already-built description, e.g. one decoded from the
    /// wire in the rendering process.
    pub fn install(&self, description: GraphDescription) -> Result<UpdateSummary> {
        let mut controller = self.controller.lock();
        let summary = controller.install(description)?;
        controller.drain_retired();
        tracing::debug!(?summary, "graph update installed");
        Ok(summary)
    }

    /// Snapshot + wire-encode the current graph for transport to a
    /// rendering process.
    pub fn encode_graph(&self) -> Result<Vec<u8>> {
        Ok(self.graph.lock().snapshot()?.encode())
    }

    /// Decode + install an encoded graph received from a peer.
    pub fn install_encoded(&self, bytes: &[u8]) -> Result<UpdateSummary> {
        let description = GraphDescription::decode(bytes).map_err(cadenza_graph::Error::from)?;
        self.install(description)
    }

    /// Registers the user callback behind a script-processor or worklet
    /// node. Must happen before the node's first [`commit`](Self::commit)
    /// so the factory can resolve the endpoint. In realtime mode a
    /// control-side service thread is spawned to serve the node.
    pub fn set_script_processor(
        &self,
        node: NodeId,
        input_channels: usize,
        output_channels: usize,
        processor: ProcessorFn,
    ) {
        let endpoint = BridgeEndpoint::new(
            input_channels,
            output_channels,
            self.config.quantum_size,
        );
        endpoint.set_processor(processor);
        self.bridges
            .endpoints
            .lock()
            .insert(node, Arc::clone(&endpoint));
        if !self.offline {
            self.services
                .lock()
                .push(BridgeService::spawn(vec![endpoint]));
        }
    }

    /// Takes the render half for the device callback. Fails the second
    /// time, and always fails after `render_offline` has begun.
    pub fn take_renderer(&self) -> Result<Renderer> {
        self.renderer
            .lock()
            .take()
            .map(|executor| Renderer { executor })
            .ok_or(Error::RendererTaken)
    }

    /// Renders `frames` frames synchronously into a fresh bus of
    /// `channels` channels. Only meaningful for an engine built with
    /// [`offline`](crate::CadenzaEngineBuilder::offline); script
    /// processors run inline instead of waiting on the bridge.
    pub fn render_offline(&self, channels: usize, frames: usize) -> Result<AudioBus> {
        let mut slot = self.renderer.lock();
        let executor = slot.as_mut().ok_or(Error::RendererTaken)?;

        let quantum = self.config.quantum_size;
        let mut result = AudioBus::new(channels, frames);
        let mut scratch = AudioBus::new(channels, quantum);
        let mut written = 0;
        while written < frames {
            executor.render_quantum(&mut scratch);
            let take = quantum.min(frames - written);
            for ch in 0..channels {
                result.channel_mut(ch)[written..written + take]
                    .copy_from_slice(&scratch.channel(ch)[..take]);
            }
            written += take;
        }
        self.controller.lock().drain_retired();
        Ok(result)
    }
}
