//! # Orchestrator Configuration
//!
//! Every field has a default, so an empty TOML document is a valid config.
//!
//! ```toml
//! frames_per_second = 30
//! tick_interval_ms = 1000
//! bus_capacity = 100
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Default wall-clock interval between engine ticks, in milliseconds.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// Default event bus depth, in envelopes.
pub const DEFAULT_BUS_CAPACITY: usize = 100;

/// Default create channel depth, in commands.
pub const DEFAULT_CREATE_CAPACITY: usize = 100;

/// Default output channel depth, in envelopes. Unrelated to the byte size
/// of any wire buffer.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 1024;

/// Orchestrator tuning.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Logical frame rate of the default clock.
    pub frames_per_second: u32,
    /// Wall-clock interval between engine ticks.
    pub tick_interval_ms: u64,
    /// Event bus capacity.
    pub bus_capacity: usize,
    /// Create-command channel capacity.
    pub create_capacity: usize,
    /// Output channel depth in envelopes.
    pub output_capacity: usize,
    /// Per-session input buffer size in bytes.
    pub input_buffer_capacity: usize,
    /// Auto-assigned ids start above this value.
    pub first_session_id: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            frames_per_second: arena_core::DEFAULT_FPS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            bus_capacity: DEFAULT_BUS_CAPACITY,
            create_capacity: DEFAULT_CREATE_CAPACITY,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            input_buffer_capacity: arena_protocol::INPUT_BUFFER_SIZE,
            first_session_id: arena_core::DEFAULT_FIRST_SESSION_ID,
        }
    }
}

impl OrchestratorConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::InvalidConfig`] on a parse error or a value
    /// rejected by [`validate`](Self::validate).
    pub fn from_toml_str(source: &str) -> OrchestratorResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| OrchestratorError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the orchestrator cannot run with.
    ///
    /// A zero frame rate is accepted; the clock normalizes it.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::InvalidConfig`] naming the bad field.
    pub fn validate(&self) -> OrchestratorResult<()> {
        let checks = [
            ("tick_interval_ms", self.tick_interval_ms == 0),
            ("bus_capacity", self.bus_capacity == 0),
            ("create_capacity", self.create_capacity == 0),
            ("output_capacity", self.output_capacity == 0),
            ("input_buffer_capacity", self.input_buffer_capacity == 0),
        ];
        match checks.iter().find(|(_, is_zero)| *is_zero) {
            Some((field, _)) => Err(OrchestratorError::InvalidConfig(format!(
                "{field} must be greater than zero"
            ))),
            None => Ok(()),
        }
    }

    /// Tick interval as a [`Duration`].
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(
            OrchestratorConfig::from_toml_str("").unwrap(),
            OrchestratorConfig::default()
        );
    }

    #[test]
    fn test_channel_depths_use_envelope_counts() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.output_capacity, DEFAULT_OUTPUT_CAPACITY);
        assert_eq!(config.bus_capacity, DEFAULT_BUS_CAPACITY);
        assert_eq!(config.create_capacity, DEFAULT_CREATE_CAPACITY);
        assert_eq!(config.input_buffer_capacity, arena_protocol::INPUT_BUFFER_SIZE);
    }

    #[test]
    fn test_partial_override() {
        let config = OrchestratorConfig::from_toml_str(
            "frames_per_second = 60\ntick_interval_ms = 50\nfirst_session_id = 5000\n",
        )
        .unwrap();
        assert_eq!(config.frames_per_second, 60);
        assert_eq!(config.tick_interval(), Duration::from_millis(50));
        assert_eq!(config.first_session_id, 5000);
        assert_eq!(config.bus_capacity, 100);
    }

    #[test]
    fn test_rejects_zero_capacity_and_unknown_keys() {
        assert!(matches!(
            OrchestratorConfig::from_toml_str("bus_capacity = 0"),
            Err(OrchestratorError::InvalidConfig(msg)) if msg.contains("bus_capacity")
        ));
        assert!(OrchestratorConfig::from_toml_str("bogus = 1").is_err());
        assert!(OrchestratorConfig::from_toml_str("fps = \"fast\"").is_err());
    }
}
