//! Error types for the msgflow framework.
//!
//! Only pipeline assembly reclassifies failures. Everything raised while a
//! message travels through a composed handler is a [`ProcessingError`] and
//! reaches the caller exactly as the failing stage produced it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Failure raised while one message is being processed.
///
/// Stages and terminal handlers return this unmodified; the consumer hands
/// it to the source's failure hook.
pub type ProcessingError = anyhow::Error;

/// The main error type for msgflow operations.
#[derive(Debug, Error)]
pub enum MsgflowError {
    /// A pipeline could not be assembled.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// The registry was built with an invalid set of definitions.
    #[error("{0}")]
    Registry(#[from] RegistryError),

    /// A driver lifecycle call was made in the wrong state.
    #[error("{0}")]
    Driver(#[from] DriverError),

    /// Settings could not be parsed.
    #[error("Invalid configuration document: {0}")]
    Config(#[from] serde_json::Error),
}

/// The part of a pipeline definition that could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokenAspect {
    /// The innermost handler that disposes of a message.
    TerminalStage,
    /// The ordered list of stages wrapped around the terminal stage.
    StageList,
    /// The message source feeding the pipeline.
    Source,
    /// The consumer hosting the fetch loop.
    Consumer,
}

impl BrokenAspect {
    /// Human-readable name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TerminalStage => "terminal stage",
            Self::StageList => "stage list",
            Self::Source => "message source",
            Self::Consumer => "consumer",
        }
    }
}

impl fmt::Display for BrokenAspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised when a named pipeline cannot be assembled.
///
/// Fatal to that pipeline: it must not serve messages. The original
/// failure is kept as the error source.
#[derive(Debug, Error)]
#[error("Pipeline '{pipeline}' is misconfigured: failed to resolve {aspect}: {source}")]
pub struct ConfigurationError {
    /// The pipeline name.
    pub pipeline: String,
    /// Which part of the definition is broken.
    pub aspect: BrokenAspect,
    /// The underlying resolution failure.
    #[source]
    pub source: anyhow::Error,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(pipeline: impl Into<String>, aspect: BrokenAspect, source: anyhow::Error) -> Self {
        Self {
            pipeline: pipeline.into(),
            aspect,
            source,
        }
    }

    /// Creates a terminal stage error.
    #[must_use]
    pub fn terminal_stage(pipeline: impl Into<String>, source: anyhow::Error) -> Self {
        Self::new(pipeline, BrokenAspect::TerminalStage, source)
    }

    /// Creates a stage list error.
    #[must_use]
    pub fn stage_list(pipeline: impl Into<String>, source: anyhow::Error) -> Self {
        Self::new(pipeline, BrokenAspect::StageList, source)
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!("ConfigurationError"));
        map.insert("pipeline".to_string(), serde_json::json!(self.pipeline));
        map.insert("aspect".to_string(), serde_json::json!(self.aspect.as_str()));
        map.insert("cause".to_string(), serde_json::json!(format!("{:#}", self.source)));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Lookup failure raised while resolving a definition's parts.
///
/// Wrapped as the source of a [`ConfigurationError`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    /// No definition is registered under the name.
    #[error("No pipeline registered under '{name}'")]
    UnknownPipeline {
        /// The pipeline name.
        name: String,
    },

    /// The definition has no terminal-stage factory.
    #[error("No terminal stage factory registered for pipeline '{name}'")]
    MissingTerminal {
        /// The pipeline name.
        name: String,
    },

    /// The definition has no source factory.
    #[error("No message source registered for pipeline '{name}'")]
    MissingSource {
        /// The pipeline name.
        name: String,
    },

    /// A component the factory needs was never registered.
    #[error("Component not registered: {type_name}")]
    MissingComponent {
        /// The component's type name.
        type_name: &'static str,
    },
}

/// Errors raised while building a pipeline registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two definitions were registered under one name.
    #[error("Pipeline '{name}' is registered more than once")]
    DuplicatePipeline {
        /// The pipeline name.
        name: String,
    },
}

/// Errors related to driver lifecycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    /// `start` was called on a driver that already left `Created`.
    #[error("Driver for pipeline '{pipeline}' was already started")]
    AlreadyStarted {
        /// The pipeline name.
        pipeline: String,
    },

    /// `stop` was called on a driver that never started.
    #[error("Driver for pipeline '{pipeline}' was never started")]
    NotStarted {
        /// The pipeline name.
        pipeline: String,
    },
}
