//! Engine configuration.

use crate::{Error, Result, RENDER_QUANTUM_FRAMES};
use std::time::Duration;

/// Configuration shared by the render and control sides of an engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sample_rate: f32,
    /// Frames rendered per quantum. Must be a power of two.
    pub quantum_size: usize,
    /// Longest the render thread will wait on the script-processor bridge.
    pub bridge_timeout: Duration,
    /// Capacity of the control-to-render update queue.
    pub update_queue_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            quantum_size: RENDER_QUANTUM_FRAMES,
            bridge_timeout: Duration::from_millis(10),
            update_queue_len: 16,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < 8000.0 || self.sample_rate > 384000.0 {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.quantum_size == 0 || !self.quantum_size.is_power_of_two() {
            return Err(Error::InvalidConfig(format!(
                "quantum_size {} must be a non-zero power of two",
                self.quantum_size
            )));
        }
        if self.update_queue_len == 0 {
            return Err(Error::InvalidConfig(
                "update_queue_len must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.sample_rate, 48000.0);
        assert_eq!(config.quantum_size, 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_power_of_two_quantum() {
        let config = EngineConfig {
            quantum_size: 96,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
