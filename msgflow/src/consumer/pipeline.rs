//! The default fetch → process loop.

use super::MessageSource;
use crate::context::MessageContext;
use crate::observability::events;
use crate::stages::Continuation;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A long-running loop hosted by a driver.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Runs until `cancel` fires or an unrecoverable error occurs.
    ///
    /// An error returned here ends the pipeline's loop; the driver does not
    /// restart it.
    async fn execute(&self, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// Consumer that processes one message at a time, in fetch order.
///
/// Every per-message failure is contained within its iteration:
/// - a failing or empty fetch logs a warning, yields, and the loop fetches again
/// - a processing error goes to [`MessageSource::fail`]
/// - failing lifecycle hooks log a warning and are not re-raised
///
/// Cancellation is checked before every fetch. A message that was already
/// fetched when cancellation arrives is still processed and released.
pub struct PipelineConsumer {
    pipeline: String,
    source: Arc<dyn MessageSource>,
    handler: Continuation,
}

impl PipelineConsumer {
    /// Creates a new pipeline consumer.
    #[must_use]
    pub fn new(pipeline: impl Into<String>, source: Arc<dyn MessageSource>, handler: Continuation) -> Self {
        Self {
            pipeline: pipeline.into(),
            source,
            handler,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    async fn process(&self, mut ctx: MessageContext, cancel: &CancellationToken) {
        let message_id = ctx.id();

        match self.handler.handle(&mut ctx, cancel).await {
            Ok(()) => {
                if let Err(error) = self.source.complete(&mut ctx).await {
                    events::completion_failed(&self.pipeline, message_id, &error);
                }
            }
            Err(processing_error) => {
                if let Err(handler_error) = self.source.fail(&mut ctx, &processing_error).await {
                    events::failure_handler_failed(
                        &self.pipeline,
                        message_id,
                        &processing_error,
                        &handler_error,
                    );
                }
            }
        }

        if let Err(error) = self.source.release(ctx).await {
            events::cleanup_failed(&self.pipeline, message_id, "release", &error);
        }
    }
}

impl std::fmt::Debug for PipelineConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConsumer")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Consumer for PipelineConsumer {
    async fn execute(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        while !cancel.is_cancelled() {
            match self.source.fetch(&cancel).await {
                Ok(Some(ctx)) => self.process(ctx, &cancel).await,
                // A source interrupted by shutdown is not a failure.
                Ok(None) | Err(_) if cancel.is_cancelled() => break,
                Ok(None) => {
                    events::empty_fetch(&self.pipeline);
                    // A source that returns immediately must not starve the runtime.
                    tokio::task::yield_now().await;
                }
                Err(error) => {
                    events::fetch_failed(&self.pipeline, &error);
                    tokio::task::yield_now().await;
                }
            }
        }
        Ok(())
    }
}
