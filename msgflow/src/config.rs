//! Configuration types for drivers and named pipelines.
//!
//! Binding these from files or the environment is left to the embedding
//! process; this module only defines the shapes and their defaults.

use crate::errors::MsgflowError;
use crate::latency::{LatencyTokens, MeasureToken};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for a consumer driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// How long `stop` waits for the loop before aborting it.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    /// Whether the loop yields once before its first fetch.
    #[serde(default = "default_yield_before_start")]
    pub yield_before_start: bool,
}

fn default_stop_timeout_ms() -> u64 {
    30_000
}

fn default_yield_before_start() -> bool {
    true
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: default_stop_timeout_ms(),
            yield_before_start: default_yield_before_start(),
        }
    }
}

impl DriverConfig {
    /// Creates a new driver configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stop timeout.
    #[must_use]
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Returns the stop timeout.
    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// One measure token as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// The measurement name.
    pub name: String,
    /// The slot within the name.
    #[serde(default)]
    pub slot: u32,
}

impl From<&TokenConfig> for MeasureToken {
    fn from(config: &TokenConfig) -> Self {
        Self::new(config.name.clone(), config.slot)
    }
}

/// Success and failure tokens for a pipeline's latency stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyTokensConfig {
    /// Recorded when the pipeline completes normally.
    pub success: TokenConfig,
    /// Recorded when the pipeline fails.
    pub failure: TokenConfig,
}

impl From<&LatencyTokensConfig> for LatencyTokens {
    fn from(config: &LatencyTokensConfig) -> Self {
        Self::new((&config.success).into(), (&config.failure).into())
    }
}

/// Per-pipeline options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Latency tokens; enables latency stages when set.
    #[serde(default)]
    pub latency: Option<LatencyTokensConfig>,
}

/// Top-level msgflow configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgflowConfig {
    /// Driver settings shared by every pipeline.
    #[serde(default)]
    pub driver: DriverConfig,
    /// Options keyed by pipeline name.
    #[serde(default)]
    pub pipelines: HashMap<String, PipelineOptions>,
}

impl MsgflowConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, MsgflowError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns the options for a pipeline, if any.
    #[must_use]
    pub fn pipeline(&self, name: &str) -> Option<&PipelineOptions> {
        self.pipelines.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_driver_config_defaults() {
        let config = DriverConfig::new();
        assert_eq!(config.stop_timeout(), Duration::from_secs(30));
        assert!(config.yield_before_start);

        let shorter = config.with_stop_timeout(Duration::from_millis(250));
        assert_eq!(shorter.stop_timeout_ms, 250);
    }

    #[test]
    fn test_parse_full_document() {
        let config = MsgflowConfig::from_json_str(
            r#"{
                "driver": { "stop_timeout_ms": 5000 },
                "pipelines": {
                    "orders": {
                        "latency": {
                            "success": { "name": "orders.ok", "slot": 1 },
                            "failure": { "name": "orders.err" }
                        }
                    },
                    "audit": {}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.driver.stop_timeout_ms, 5000);
        assert!(config.driver.yield_before_start);
        assert!(config.pipeline("audit").unwrap().latency.is_none());

        let tokens: LatencyTokens = config
            .pipeline("orders")
            .and_then(|p| p.latency.as_ref())
            .unwrap()
            .into();
        assert_eq!(tokens.success, MeasureToken::new("orders.ok", 1));
        assert_eq!(tokens.failure, MeasureToken::new("orders.err", 0));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = MsgflowConfig::from_json_str("{}").unwrap();
        assert_eq!(config, MsgflowConfig::default());
    }

    #[test]
    fn test_invalid_document_is_config_error() {
        let err = MsgflowConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, MsgflowError::Config(_)));
    }
}
