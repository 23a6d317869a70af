//! Builder for configuring and constructing a `CadenzaEngine`.

use crate::engine::BridgeRegistry;
use crate::{CadenzaEngine, Result};
use cadenza_core::EngineConfig;
use cadenza_graph::executor::executor_pair;
use std::sync::Arc;
use std::time::Duration;

/// Configuration mirrors [`EngineConfig`]; the builder only adds the
/// offline switch that changes how script processors are driven.
///
/// # Example
///
/// ```ignore
/// use cadenza::prelude::*;
///
/// let engine = CadenzaEngine::builder()
///     .sample_rate(44_100.0)
///     .build()?;
/// ```
pub struct CadenzaEngineBuilder {
    config: EngineConfig,
    offline: bool,
}

impl Default for CadenzaEngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            offline: false,
        }
    }
}

impl CadenzaEngineBuilder {
    /// Default: 48000.
    pub fn sample_rate(mut self, sample_rate: f32) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    /// Frames per render quantum; must be a power of two. Default: 128.
    pub fn quantum_size(mut self, frames: usize) -> Self {
        self.config.quantum_size = frames;
        self
    }

    /// Longest the render thread waits on a script processor. Default: 10 ms.
    pub fn bridge_timeout(mut self, timeout: Duration) -> Self {
        self.config.bridge_timeout = timeout;
        self
    }

    /// Capacity of the control-to-render update queue. Default: 16.
    pub fn update_queue_len(mut self, len: usize) -> Self {
        self.config.update_queue_len = len;
        self
    }

    /// Single-threaded rendering: script processors run inline and
    /// `render_offline` drives the graph.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    pub fn build(self) -> Result<CadenzaEngine> {
        self.config.validate()?;
        let bridges = Arc::new(BridgeRegistry::default());
        let resolver: Arc<dyn cadenza_graph::nodes::ResourceResolver> = bridges.clone();
        let (controller, executor) = executor_pair(&self.config, resolver, self.offline)?;
        Ok(CadenzaEngine::from_parts(
            self.config,
            self.offline,
            controller,
            executor,
            bridges,
        ))
    }
}
