//! Named pipeline registry and handler factory.
//!
//! This module provides:
//! - The shared component container
//! - Pipeline definitions keyed by name
//! - The factory that assembles and caches each pipeline's handler

mod components;
mod definition;
mod factory;

pub use components::Components;
pub use definition::{
    ConsumerFactory, PipelineDefinition, SourceFactory, StageListFactory, TerminalFactory,
};
pub use factory::HandlerFactory;

use crate::config::MsgflowConfig;
use crate::errors::RegistryError;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// All named pipelines of a process plus their shared components.
///
/// Built once at startup and read-only afterwards, so lookups take no
/// locks. Share it by `Arc` with the factory and drivers.
#[derive(Debug, Default)]
pub struct PipelineRegistry {
    components: Components,
    pipelines: HashMap<String, PipelineDefinition>,
}

impl PipelineRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> PipelineRegistryBuilder {
        PipelineRegistryBuilder::default()
    }

    /// Returns the shared components.
    #[must_use]
    pub fn components(&self) -> &Components {
        &self.components
    }

    /// Returns the definition registered under `name`.
    #[must_use]
    pub fn definition(&self, name: &str) -> Option<&PipelineDefinition> {
        self.pipelines.get(name)
    }

    /// Checks if a pipeline is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.pipelines.contains_key(name)
    }

    /// Returns all pipeline names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.pipelines.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of pipelines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Returns true if no pipeline is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

/// Builder for [`PipelineRegistry`].
#[derive(Debug, Default)]
pub struct PipelineRegistryBuilder {
    components: Components,
    pipelines: Vec<(String, PipelineDefinition)>,
    config: Option<MsgflowConfig>,
}

impl PipelineRegistryBuilder {
    /// Registers a shared component.
    #[must_use]
    pub fn component<T>(mut self, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.components.insert(value);
        self
    }

    /// Registers an already shared component.
    #[must_use]
    pub fn component_arc<T>(mut self, value: Arc<T>) -> Self
    where
        T: Any + Send + Sync,
    {
        self.components.insert_arc(value);
        self
    }

    /// Registers a named pipeline.
    #[must_use]
    pub fn pipeline(mut self, name: impl Into<String>, definition: PipelineDefinition) -> Self {
        self.pipelines.push((name.into(), definition));
        self
    }

    /// Applies per-pipeline options from configuration when building.
    #[must_use]
    pub fn config(mut self, config: MsgflowConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the registry.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicatePipeline` if a name was registered
    /// twice.
    pub fn build(self) -> Result<PipelineRegistry, RegistryError> {
        let mut pipelines = HashMap::with_capacity(self.pipelines.len());

        for (name, mut definition) in self.pipelines {
            if pipelines.contains_key(&name) {
                return Err(RegistryError::DuplicatePipeline { name });
            }
            if let Some(options) = self.config.as_ref().and_then(|c| c.pipeline(&name)) {
                definition = definition.with_options(options);
            }
            pipelines.insert(name, definition);
        }

        Ok(PipelineRegistry {
            components: self.components,
            pipelines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LatencyTokensConfig, PipelineOptions, TokenConfig};

    #[test]
    fn test_build_registry() {
        let registry = PipelineRegistry::builder()
            .component(42_u32)
            .pipeline("orders", PipelineDefinition::new())
            .pipeline("audit", PipelineDefinition::new())
            .build()
            .unwrap();

        assert_eq!(registry.names(), vec!["audit".to_string(), "orders".to_string()]);
        assert!(registry.contains("orders"));
        assert!(!registry.contains("billing"));
        assert_eq!(*registry.components().get::<u32>().unwrap(), 42);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = PipelineRegistry::builder()
            .pipeline("orders", PipelineDefinition::new())
            .pipeline("orders", PipelineDefinition::new())
            .build()
            .unwrap_err();

        assert_eq!(err, RegistryError::DuplicatePipeline { name: "orders".into() });
    }

    #[test]
    fn test_config_applies_options() {
        let mut config = MsgflowConfig::new();
        config.pipelines.insert(
            "orders".into(),
            PipelineOptions {
                latency: Some(LatencyTokensConfig {
                    success: TokenConfig { name: "ok".into(), slot: 0 },
                    failure: TokenConfig { name: "err".into(), slot: 0 },
                }),
            },
        );

        let registry = PipelineRegistry::builder()
            .pipeline("orders", PipelineDefinition::new())
            .pipeline("audit", PipelineDefinition::new())
            .config(config)
            .build()
            .unwrap();

        assert!(registry.definition("orders").unwrap().latency().is_some());
        assert!(registry.definition("audit").unwrap().latency().is_none());
    }
}
