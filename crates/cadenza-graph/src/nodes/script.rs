//! Render node backed by the script-processor bridge.

use super::{RenderContext, RenderNode};
use crate::bridge::BridgeEndpoint;
use crate::description::NodeDescription;
use cadenza_core::AudioBus;
use std::sync::Arc;
use std::time::Duration;

/// Script processors and worklet processors both render through a bridge
/// endpoint. Without an endpoint the node is silent; on a deadline miss it
/// replays its last successful output (silence until the first success).
pub struct ScriptBridgeNode {
    endpoint: Option<Arc<BridgeEndpoint>>,
    last_output: AudioBus,
    timeout: Duration,
    offline: bool,
}

impl ScriptBridgeNode {
    pub fn new(
        endpoint: Option<Arc<BridgeEndpoint>>,
        output_channels: usize,
        quantum_size: usize,
        timeout: Duration,
        offline: bool,
    ) -> Self {
        Self {
            endpoint,
            last_output: AudioBus::new(output_channels.max(1), quantum_size),
            timeout,
            offline,
        }
    }
}

impl RenderNode for ScriptBridgeNode {
    fn process(&mut self, _ctx: &RenderContext, input: &AudioBus, output: &mut AudioBus) {
        let _ = output.set_channel_count(self.last_output.channel_count());
        let Some(endpoint) = &self.endpoint else {
            output.zero();
            return;
        };
        let fresh = if self.offline {
            endpoint.process_sync(input, &mut self.last_output)
        } else {
            endpoint.exchange(input, &mut self.last_output, self.timeout)
        };
        if !fresh && self.offline {
            // Offline has no deadline to miss; no processor means silence.
            self.last_output.zero();
        }
        let _ = output.copy_from(&self.last_output);
    }

    fn apply_description(&mut self, _description: &NodeDescription) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RenderContext {
        RenderContext {
            sample_rate: 48000.0,
            quantum_start_frame: 0,
            frames: 8,
        }
    }

    #[test]
    fn test_without_endpoint_renders_silence() {
        let mut node = ScriptBridgeNode::new(None, 2, 8, Duration::from_millis(5), false);
        let input = AudioBus::new(2, 8);
        let mut output = AudioBus::new(2, 8);
        output.channel_mut(0).fill(9.0);
        node.process(&ctx(), &input, &mut output);
        assert!(output.channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_timeout_replays_last_output() {
        let endpoint = BridgeEndpoint::new(1, 1, 8);
        endpoint.set_processor(Box::new(|_, output| output[0].fill(0.7)));
        let mut node = ScriptBridgeNode::new(
            Some(Arc::clone(&endpoint)),
            1,
            8,
            Duration::from_millis(500),
            false,
        );
        let input = AudioBus::new(1, 8);
        let mut output = AudioBus::new(1, 8);

        // Service the first request from a helper thread.
        let server = Arc::clone(&endpoint);
        let thread = std::thread::spawn(move || {
            assert!(server.serve_one(Duration::from_secs(2)));
        });
        node.process(&ctx(), &input, &mut output);
        thread.join().unwrap();
        assert!(output.channel(0).iter().all(|&s| s == 0.7));

        // No server this time: the node must fall back to that output.
        node.process(&ctx(), &input, &mut output);
        assert!(output.channel(0).iter().all(|&s| s == 0.7));
    }

    #[test]
    fn test_offline_mode_processes_inline() {
        let endpoint = BridgeEndpoint::new(1, 1, 8);
        endpoint.set_processor(Box::new(|input, output| {
            for (o, i) in output[0].iter_mut().zip(&input[0]) {
                *o = i * 3.0;
            }
        }));
        let mut node = ScriptBridgeNode::new(Some(endpoint), 1, 8, Duration::ZERO, true);
        let mut input = AudioBus::new(1, 8);
        input.channel_mut(0).fill(1.0);
        let mut output = AudioBus::new(1, 8);
        node.process(&ctx(), &input, &mut output);
        assert!(output.channel(0).iter().all(|&s| s == 3.0));
    }
}
