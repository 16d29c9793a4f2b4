//! Message source and destination contracts.

use crate::context::MessageContext;
use crate::errors::ProcessingError;
use crate::stages::{Continuation, Handler};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Where a pipeline's messages come from.
///
/// Implementations wrap a queue or topic client. Besides fetching, a
/// source owns the message's acknowledgement lifecycle: the consumer calls
/// exactly one of [`complete`](Self::complete) or [`fail`](Self::fail) per
/// fetched message, then [`release`](Self::release).
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetches the next message.
    ///
    /// `Ok(None)` means the source had nothing to hand out. Long-polling
    /// implementations should return promptly once `cancel` fires.
    async fn fetch(&self, cancel: &CancellationToken) -> anyhow::Result<Option<MessageContext>>;

    /// Called after the composed handler succeeded.
    async fn complete(&self, _ctx: &mut MessageContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Processing-failure handler, called with the handler's error.
    async fn fail(&self, _ctx: &mut MessageContext, _error: &ProcessingError) -> anyhow::Result<()> {
        Ok(())
    }

    /// Releases the message once it has been completed or failed.
    async fn release(&self, _ctx: MessageContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Where terminal stages write messages.
#[async_trait]
pub trait MessageDestination: Send + Sync {
    /// Writes one message.
    async fn write(&self, ctx: &mut MessageContext, cancel: &CancellationToken) -> anyhow::Result<()>;
}

/// A terminal handler that writes every message to a destination.
pub struct DestinationTerminal {
    destination: Arc<dyn MessageDestination>,
}

impl DestinationTerminal {
    /// Creates a new destination terminal.
    #[must_use]
    pub fn new(destination: Arc<dyn MessageDestination>) -> Self {
        Self { destination }
    }

    /// Creates the terminal as a continuation.
    #[must_use]
    pub fn continuation(destination: Arc<dyn MessageDestination>) -> Continuation {
        Arc::new(Self::new(destination))
    }
}

impl std::fmt::Debug for DestinationTerminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationTerminal").finish_non_exhaustive()
    }
}

#[async_trait]
impl Handler for DestinationTerminal {
    async fn handle(
        &self,
        ctx: &mut MessageContext,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessingError> {
        self.destination.write(ctx, cancel).await
    }
}
