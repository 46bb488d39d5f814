//! Engine configuration.

use crate::errors::MediationError;
use serde::{Deserialize, Serialize};

/// Configuration for the mediation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediationConfig {
    /// Whether messages record continuation state so they can resume after a suspension.
    #[serde(default = "default_continuation_enabled")]
    pub continuation_enabled: bool,
    /// Whether spans are recorded and parent-resolved for each component.
    #[serde(default)]
    pub tracing_enabled: bool,
    /// Name of the sequence messages are routed to after a fatal error.
    #[serde(default = "default_fault_sequence")]
    pub fault_sequence: String,
    /// Whether span stores keep a component id → copies index for duplicate resolution.
    #[serde(default = "default_index_component_copies")]
    pub index_component_copies: bool,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_continuation_enabled() -> bool {
    true
}

fn default_fault_sequence() -> String {
    "fault".to_string()
}

fn default_index_component_copies() -> bool {
    true
}

impl Default for MediationConfig {
    fn default() -> Self {
        Self {
            continuation_enabled: default_continuation_enabled(),
            tracing_enabled: false,
            fault_sequence: default_fault_sequence(),
            index_component_copies: default_index_component_copies(),
            logging: LoggingConfig::default(),
        }
    }
}

impl MediationConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, MediationError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Enables or disables continuation tracking.
    #[must_use]
    pub fn with_continuation(mut self, enabled: bool) -> Self {
        self.continuation_enabled = enabled;
        self
    }

    /// Enables or disables span tracing.
    #[must_use]
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.tracing_enabled = enabled;
        self
    }

    /// Sets the fault sequence name.
    #[must_use]
    pub fn with_fault_sequence(mut self, name: impl Into<String>) -> Self {
        self.fault_sequence = name.into();
        self
    }

    /// Enables or disables the component copy index.
    #[must_use]
    pub fn with_component_copy_index(mut self, enabled: bool) -> Self {
        self.index_component_copies = enabled;
        self
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MediationConfig::default();
        assert!(config.continuation_enabled);
        assert!(!config.tracing_enabled);
        assert_eq!(config.fault_sequence, "fault");
        assert!(config.index_component_copies);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_builder() {
        let config = MediationConfig::new()
            .with_tracing(true)
            .with_continuation(false)
            .with_fault_sequence("onError")
            .with_component_copy_index(false);

        assert!(config.tracing_enabled);
        assert!(!config.continuation_enabled);
        assert_eq!(config.fault_sequence, "onError");
        assert!(!config.index_component_copies);
    }

    #[test]
    fn test_from_json_partial() {
        let config = MediationConfig::from_json(r#"{"tracing_enabled": true, "logging": {"json": true}}"#)
            .unwrap();
        assert!(config.tracing_enabled);
        assert!(config.continuation_enabled);
        assert!(config.logging.json);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_from_json_invalid() {
        let err = MediationConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, MediationError::Serialization(_)));
    }
}
