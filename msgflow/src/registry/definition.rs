//! Named pipeline definitions.

use super::Components;
use crate::config::PipelineOptions;
use crate::consumer::{Consumer, MessageSource};
use crate::latency::LatencyTokens;
use crate::stages::{Continuation, SharedStage};
use std::sync::Arc;

/// Resolves a pipeline's ordered stage list.
pub type StageListFactory = Arc<dyn Fn(&Components) -> anyhow::Result<Vec<SharedStage>> + Send + Sync>;

/// Instantiates a pipeline's terminal handler.
pub type TerminalFactory = Arc<dyn Fn(&Components) -> anyhow::Result<Continuation> + Send + Sync>;

/// Instantiates a pipeline's message source.
pub type SourceFactory = Arc<dyn Fn(&Components) -> anyhow::Result<Arc<dyn MessageSource>> + Send + Sync>;

/// Builds the consumer hosting a pipeline's loop.
pub type ConsumerFactory =
    Arc<dyn Fn(&str, Arc<dyn MessageSource>, Continuation) -> anyhow::Result<Arc<dyn Consumer>> + Send + Sync>;

/// Everything needed to assemble and run one named pipeline.
///
/// Factories run at most once per process, when the pipeline is first
/// resolved. A definition without a stage list composes the terminal
/// alone; one without a consumer factory runs a
/// [`PipelineConsumer`](crate::consumer::PipelineConsumer).
#[derive(Clone, Default)]
pub struct PipelineDefinition {
    pub(crate) stages: Option<StageListFactory>,
    pub(crate) terminal: Option<TerminalFactory>,
    pub(crate) source: Option<SourceFactory>,
    pub(crate) consumer: Option<ConsumerFactory>,
    pub(crate) latency: Option<LatencyTokens>,
}

impl PipelineDefinition {
    /// Creates an empty definition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stage-list factory.
    #[must_use]
    pub fn with_stage_list<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Components) -> anyhow::Result<Vec<SharedStage>> + Send + Sync + 'static,
    {
        self.stages = Some(Arc::new(factory));
        self
    }

    /// Sets a fixed stage list.
    #[must_use]
    pub fn with_stages(self, stages: Vec<SharedStage>) -> Self {
        self.with_stage_list(move |_| Ok(stages.clone()))
    }

    /// Sets the terminal-stage factory.
    #[must_use]
    pub fn with_terminal<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Components) -> anyhow::Result<Continuation> + Send + Sync + 'static,
    {
        self.terminal = Some(Arc::new(factory));
        self
    }

    /// Sets the message-source factory.
    #[must_use]
    pub fn with_source<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Components) -> anyhow::Result<Arc<dyn MessageSource>> + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(factory));
        self
    }

    /// Sets a custom consumer factory.
    #[must_use]
    pub fn with_consumer<F>(mut self, factory: F) -> Self
    where
        F: Fn(&str, Arc<dyn MessageSource>, Continuation) -> anyhow::Result<Arc<dyn Consumer>>
            + Send
            + Sync
            + 'static,
    {
        self.consumer = Some(Arc::new(factory));
        self
    }

    /// Enables latency instrumentation with the given tokens.
    #[must_use]
    pub fn with_latency(mut self, tokens: LatencyTokens) -> Self {
        self.latency = Some(tokens);
        self
    }

    /// Applies configured options on top of the definition.
    #[must_use]
    pub fn with_options(mut self, options: &PipelineOptions) -> Self {
        if let Some(latency) = &options.latency {
            self.latency = Some(latency.into());
        }
        self
    }

    /// Returns the latency tokens, if instrumentation is enabled.
    #[must_use]
    pub fn latency(&self) -> Option<&LatencyTokens> {
        self.latency.as_ref()
    }

    /// Returns true if a terminal-stage factory is set.
    #[must_use]
    pub fn has_terminal(&self) -> bool {
        self.terminal.is_some()
    }
}

impl std::fmt::Debug for PipelineDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDefinition")
            .field("stages", &self.stages.is_some())
            .field("terminal", &self.terminal.is_some())
            .field("source", &self.source.is_some())
            .field("consumer", &self.consumer.is_some())
            .field("latency", &self.latency)
            .finish()
    }
}
