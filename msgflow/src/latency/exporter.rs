//! Latency exporter trait and implementations.

use super::LatencySnapshot;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Receives finished timing scopes.
#[async_trait]
pub trait LatencyExporter: Send + Sync {
    /// Exports one snapshot.
    async fn export(&self, snapshot: &LatencySnapshot) -> anyhow::Result<()>;
}

/// The exporters registered for a process.
///
/// Stored in the shared component registry; latency registration stages
/// export through every entry.
#[derive(Clone, Default)]
pub struct LatencyExporters {
    exporters: Vec<Arc<dyn LatencyExporter>>,
}

impl LatencyExporters {
    /// Creates an empty exporter list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an exporter.
    #[must_use]
    pub fn with(mut self, exporter: Arc<dyn LatencyExporter>) -> Self {
        self.exporters.push(exporter);
        self
    }

    /// Returns the exporters in registration order.
    #[must_use]
    pub fn as_slice(&self) -> &[Arc<dyn LatencyExporter>] {
        &self.exporters
    }

    /// Returns the number of exporters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.exporters.len()
    }

    /// Returns true if no exporter is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exporters.is_empty()
    }
}

impl std::fmt::Debug for LatencyExporters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyExporters")
            .field("count", &self.exporters.len())
            .finish()
    }
}

/// An exporter that writes snapshots as debug-level `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLatencyExporter;

#[async_trait]
impl LatencyExporter for TracingLatencyExporter {
    async fn export(&self, snapshot: &LatencySnapshot) -> anyhow::Result<()> {
        let measurements = serde_json::to_string(&snapshot.measurements)?;
        debug!(
            pipeline = %snapshot.pipeline,
            message_id = %snapshot.message_id,
            total_ticks = snapshot.total_ticks,
            frequency = snapshot.frequency,
            measurements = %measurements,
            "Latency snapshot"
        );
        Ok(())
    }
}
