//! Executable handlers produced by stitching stages together.

use crate::context::MessageContext;
use crate::errors::ProcessingError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One step of message processing.
///
/// Terminal handlers dispose of a message; the handlers returned by
/// [`Stage::stitch`](super::Stage::stitch) wrap another handler.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Processes one message.
    ///
    /// Implementations that suspend should check `cancel` at their own
    /// suspension points. Nothing preempts a handler that does not.
    async fn handle(
        &self,
        ctx: &mut MessageContext,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessingError>;
}

/// A shareable, composed handler.
///
/// Built once per pipeline name and reused for every message.
pub type Continuation = Arc<dyn Handler>;

/// A handler backed by an async closure.
pub struct FnHandler<F> {
    func: F,
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut MessageContext, &'a CancellationToken) -> BoxFuture<'a, Result<(), ProcessingError>>
        + Send
        + Sync,
{
    async fn handle(
        &self,
        ctx: &mut MessageContext,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessingError> {
        (self.func)(ctx, cancel).await
    }
}

/// Builds a continuation from an async closure.
///
/// ```rust,ignore
/// let terminal = handler_fn(|ctx, _cancel| Box::pin(async move {
///     ctx.set(Processed(true));
///     Ok(())
/// }));
/// ```
pub fn handler_fn<F>(func: F) -> Continuation
where
    F: for<'a> Fn(&'a mut MessageContext, &'a CancellationToken) -> BoxFuture<'a, Result<(), ProcessingError>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnHandler { func })
}
