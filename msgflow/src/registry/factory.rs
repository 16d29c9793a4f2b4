//! Assembling and caching composed handlers by pipeline name.

use super::{PipelineDefinition, PipelineRegistry};
use crate::consumer::{Consumer, MessageSource, PipelineConsumer};
use crate::errors::{BrokenAspect, ConfigurationError, ResolutionError};
use crate::latency::{LatencyExporters, LatencyMeasureStage, LatencyRegistrationStage};
use crate::stages::{compose, Continuation, SharedStage};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type HandlerCell = Arc<Mutex<Option<Continuation>>>;

/// Resolves a pipeline's composed handler by name.
///
/// The first successful `create` for a name runs the definition's
/// terminal and stage-list factories and composes the result; later calls
/// return the cached handler. Each name has its own construct-once cell, so
/// concurrent first calls build exactly once while other names stay
/// unblocked. Failed builds are not cached.
pub struct HandlerFactory {
    registry: Arc<PipelineRegistry>,
    cells: DashMap<String, HandlerCell>,
    builds: AtomicUsize,
}

impl HandlerFactory {
    /// Creates a factory over a registry.
    #[must_use]
    pub fn new(registry: Arc<PipelineRegistry>) -> Self {
        Self {
            registry,
            cells: DashMap::new(),
            builds: AtomicUsize::new(0),
        }
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<PipelineRegistry> {
        &self.registry
    }

    /// Returns the composed handler for `pipeline`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` naming the terminal stage when no
    /// terminal factory is registered or it fails, and naming the stage
    /// list when stage-list resolution fails.
    pub fn create(&self, pipeline: &str) -> Result<Continuation, ConfigurationError> {
        // Unknown names never get a cache cell.
        if !self.registry.contains(pipeline) {
            return Err(ConfigurationError::terminal_stage(pipeline, unknown(pipeline)));
        }

        let cell: HandlerCell = Arc::clone(self.cells.entry(pipeline.to_string()).or_default().value());
        let mut slot = cell.lock();

        if let Some(handler) = slot.as_ref() {
            return Ok(Arc::clone(handler));
        }

        let handler = self.assemble(pipeline)?;
        self.builds.fetch_add(1, Ordering::SeqCst);
        *slot = Some(Arc::clone(&handler));
        Ok(handler)
    }

    /// Instantiates the message source for `pipeline`.
    pub fn resolve_source(&self, pipeline: &str) -> Result<Arc<dyn MessageSource>, ConfigurationError> {
        let definition = self
            .registry
            .definition(pipeline)
            .ok_or_else(|| unknown(pipeline))
            .map_err(|e| ConfigurationError::new(pipeline, BrokenAspect::Source, e))?;

        let factory = definition.source.as_ref().ok_or_else(|| {
            ConfigurationError::new(
                pipeline,
                BrokenAspect::Source,
                ResolutionError::MissingSource {
                    name: pipeline.to_string(),
                }
                .into(),
            )
        })?;

        factory(self.registry.components())
            .map_err(|e| ConfigurationError::new(pipeline, BrokenAspect::Source, e))
    }

    /// Builds the consumer that hosts `pipeline`'s loop.
    ///
    /// Resolves the composed handler and the source first, so any
    /// configuration error surfaces here rather than inside the loop.
    pub fn create_consumer(&self, pipeline: &str) -> Result<Arc<dyn Consumer>, ConfigurationError> {
        let handler = self.create(pipeline)?;
        let source = self.resolve_source(pipeline)?;

        match self.registry.definition(pipeline).and_then(|d| d.consumer.as_ref()) {
            Some(factory) => factory(pipeline, source, handler)
                .map_err(|e| ConfigurationError::new(pipeline, BrokenAspect::Consumer, e)),
            None => Ok(Arc::new(PipelineConsumer::new(pipeline, source, handler))),
        }
    }

    /// Returns how many handlers have been built.
    #[must_use]
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    fn assemble(&self, pipeline: &str) -> Result<Continuation, ConfigurationError> {
        let definition = self.registry.definition(pipeline);

        let terminal = resolve_terminal(&self.registry, pipeline, definition)
            .map_err(|e| ConfigurationError::terminal_stage(pipeline, e))?;
        let stages = self
            .resolve_stages(definition)
            .map_err(|e| ConfigurationError::stage_list(pipeline, e))?;

        Ok(compose(&stages, terminal))
    }

    fn resolve_stages(&self, definition: Option<&PipelineDefinition>) -> anyhow::Result<Vec<SharedStage>> {
        let Some(definition) = definition else {
            return Ok(Vec::new());
        };

        let mut stages: Vec<SharedStage> = Vec::new();
        if let Some(tokens) = definition.latency() {
            let exporters = self
                .registry
                .components()
                .get::<LatencyExporters>()
                .map(|e| (*e).clone())
                .unwrap_or_default();
            stages.push(Arc::new(LatencyRegistrationStage::new(exporters)));
            stages.push(Arc::new(LatencyMeasureStage::new(tokens.clone())));
        }
        if let Some(factory) = &definition.stages {
            stages.extend(factory(self.registry.components())?);
        }
        Ok(stages)
    }
}

fn resolve_terminal(
    registry: &PipelineRegistry,
    pipeline: &str,
    definition: Option<&PipelineDefinition>,
) -> anyhow::Result<Continuation> {
    let definition = definition.ok_or_else(|| unknown(pipeline))?;
    let factory = definition
        .terminal
        .as_ref()
        .ok_or_else(|| ResolutionError::MissingTerminal {
            name: pipeline.to_string(),
        })?;
    factory(registry.components())
}

fn unknown(pipeline: &str) -> anyhow::Error {
    ResolutionError::UnknownPipeline {
        name: pipeline.to_string(),
    }
    .into()
}

impl std::fmt::Debug for HandlerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerFactory")
            .field("pipelines", &self.registry.names())
            .field("builds", &self.build_count())
            .finish()
    }
}
