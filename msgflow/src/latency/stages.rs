//! Stages that time a pipeline and export the results.
//!
//! [`LatencyRegistrationStage`] must sit outside every
//! [`LatencyMeasureStage`]: it puts the [`LatencyContext`] feature on the
//! message that the measurement stages record into. Nothing enforces that
//! ordering. A measurement stage that finds no scope runs `next` without
//! recording.

use super::{LatencyContext, LatencyExporter, LatencyExporters, LatencyTokens};
use crate::context::MessageContext;
use crate::errors::ProcessingError;
use crate::observability::events;
use crate::stages::{Continuation, Handler, Stage};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Attaches a fresh timing scope to every message and exports it when the
/// rest of the pipeline finishes, whether it succeeded or failed.
#[derive(Debug, Clone, Default)]
pub struct LatencyRegistrationStage {
    exporters: LatencyExporters,
}

impl LatencyRegistrationStage {
    /// Creates a registration stage exporting through `exporters`.
    #[must_use]
    pub fn new(exporters: LatencyExporters) -> Self {
        Self { exporters }
    }
}

impl Stage for LatencyRegistrationStage {
    fn name(&self) -> &str {
        "latency.registration"
    }

    fn stitch(&self, next: Continuation) -> Continuation {
        Arc::new(RegistrationHandler {
            exporters: self.exporters.as_slice().to_vec(),
            next,
        })
    }
}

struct RegistrationHandler {
    exporters: Vec<Arc<dyn LatencyExporter>>,
    next: Continuation,
}

#[async_trait]
impl Handler for RegistrationHandler {
    async fn handle(
        &self,
        ctx: &mut MessageContext,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessingError> {
        let scope = LatencyContext::start(ctx.pipeline(), ctx.id());
        ctx.set(scope.clone());

        let result = self.next.handle(ctx, cancel).await;

        let snapshot = scope.snapshot();
        for exporter in &self.exporters {
            if let Err(error) = exporter.export(&snapshot).await {
                events::cleanup_failed(ctx.pipeline(), ctx.id(), "latency export", &error);
            }
        }

        result
    }
}

/// Times the rest of the pipeline and records the elapsed ticks under the
/// success or failure token.
#[derive(Debug, Clone)]
pub struct LatencyMeasureStage {
    tokens: LatencyTokens,
}

impl LatencyMeasureStage {
    /// Creates a measurement stage.
    #[must_use]
    pub fn new(tokens: LatencyTokens) -> Self {
        Self { tokens }
    }

    /// Returns the configured tokens.
    #[must_use]
    pub fn tokens(&self) -> &LatencyTokens {
        &self.tokens
    }
}

impl Stage for LatencyMeasureStage {
    fn name(&self) -> &str {
        "latency.measure"
    }

    fn stitch(&self, next: Continuation) -> Continuation {
        Arc::new(MeasureHandler {
            tokens: self.tokens.clone(),
            next,
        })
    }
}

struct MeasureHandler {
    tokens: LatencyTokens,
    next: Continuation,
}

#[async_trait]
impl Handler for MeasureHandler {
    async fn handle(
        &self,
        ctx: &mut MessageContext,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessingError> {
        let Some(scope) = ctx.get::<LatencyContext>().cloned() else {
            return self.next.handle(ctx, cancel).await;
        };

        let started = scope.now_ticks();
        let result = self.next.handle(ctx, cancel).await;
        let elapsed = scope.now_ticks().saturating_sub(started);

        let token = if result.is_ok() {
            &self.tokens.success
        } else {
            &self.tokens.failure
        };
        scope.record(token, elapsed);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latency::MeasureToken;
    use crate::observability::WarningEvent;
    use crate::stages::{compose, handler_fn, SharedStage};
    use crate::testing::{capture_events, failing_terminal, CollectingExporter, InjectedFailure};
    use std::time::Duration;

    fn tokens() -> LatencyTokens {
        LatencyTokens::new(MeasureToken::new("ok", 0), MeasureToken::new("err", 0))
    }

    fn sleeping_terminal() -> Continuation {
        handler_fn(|_ctx, _cancel| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(2)).await;
                Ok(())
            })
        })
    }

    fn instrumented(exporter: &Arc<CollectingExporter>, terminal: Continuation) -> Continuation {
        let stages: Vec<SharedStage> = vec![
            Arc::new(LatencyRegistrationStage::new(
                LatencyExporters::new().with(exporter.clone()),
            )),
            Arc::new(LatencyMeasureStage::new(tokens())),
        ];
        compose(&stages, terminal)
    }

    #[tokio::test]
    async fn test_success_records_one_success_measurement() {
        let exporter = Arc::new(CollectingExporter::new());
        let handler = instrumented(&exporter, sleeping_terminal());

        handler
            .handle(&mut MessageContext::new("p"), &CancellationToken::new())
            .await
            .unwrap();

        let snapshots = exporter.snapshots();
        assert_eq!(snapshots.len(), 1);
        let ok = snapshots[0].values_for(&tokens().success);
        assert_eq!(ok.len(), 1);
        assert!(ok[0] >= 2_000_000);
        assert!(snapshots[0].values_for(&tokens().failure).is_empty());
    }

    #[tokio::test]
    async fn test_failure_records_failure_and_rethrows_original() {
        let exporter = Arc::new(CollectingExporter::new());
        let handler = instrumented(&exporter, failing_terminal("db timeout"));

        let err = handler
            .handle(&mut MessageContext::new("p"), &CancellationToken::new())
            .await
            .unwrap_err();

        let injected = err.downcast_ref::<InjectedFailure>().unwrap();
        assert_eq!(injected.0, "db timeout");
        assert_eq!(err.to_string(), "db timeout");

        let snapshots = exporter.snapshots();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].values_for(&tokens().failure).len(), 1);
        assert!(snapshots[0].values_for(&tokens().success).is_empty());
    }

    #[tokio::test]
    async fn test_scope_is_visible_to_inner_stages() {
        let exporter = Arc::new(CollectingExporter::new());
        let terminal = handler_fn(|ctx, _cancel| {
            Box::pin(async move {
                let scope = ctx
                    .get::<LatencyContext>()
                    .ok_or_else(|| anyhow::anyhow!("scope missing"))?;
                scope.checkpoint("terminal");
                Ok(())
            })
        });

        instrumented(&exporter, terminal)
            .handle(&mut MessageContext::new("p"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(exporter.snapshots()[0].checkpoints[0].name, "terminal");
    }

    #[tokio::test]
    async fn test_measure_outside_registration_records_nothing() {
        let exporter = Arc::new(CollectingExporter::new());
        let stages: Vec<SharedStage> = vec![
            Arc::new(LatencyMeasureStage::new(tokens())),
            Arc::new(LatencyRegistrationStage::new(
                LatencyExporters::new().with(exporter.clone()),
            )),
        ];

        compose(&stages, sleeping_terminal())
            .handle(&mut MessageContext::new("p"), &CancellationToken::new())
            .await
            .unwrap();

        let snapshots = exporter.snapshots();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].measurements.is_empty());
    }

    #[tokio::test]
    async fn test_measure_without_scope_passes_result_through() {
        let handler = LatencyMeasureStage::new(tokens()).stitch(failing_terminal("boom"));

        let mut ctx = MessageContext::new("p");
        let err = handler.handle(&mut ctx, &CancellationToken::new()).await.unwrap_err();

        assert_eq!(err.to_string(), "boom");
        assert!(ctx.get::<LatencyContext>().is_none());
    }

    #[tokio::test]
    async fn test_export_failure_is_logged_and_result_kept() {
        let (events, _guard) = capture_events();
        let failing = Arc::new(CollectingExporter::failing());
        let working = Arc::new(CollectingExporter::new());
        let stage = LatencyRegistrationStage::new(
            LatencyExporters::new().with(failing.clone()).with(working.clone()),
        );

        stage
            .stitch(sleeping_terminal())
            .handle(&mut MessageContext::new("p"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(events.count(WarningEvent::CleanupFailed), 1);
        assert_eq!(working.snapshots().len(), 1);
    }
}
