//! Stage contract and composition.
//!
//! A stage wraps a continuation: given the handler that runs after it, it
//! returns a handler implementing its own behavior that decides whether and
//! when to call the next one. Stages are configuration-time objects; any
//! state they own is set up once when the pipeline is assembled.

mod compose;
mod continuation;

pub use compose::compose;
pub use continuation::{handler_fn, Continuation, FnHandler, Handler};

use std::fmt::Debug;
use std::sync::Arc;

/// Trait for pipeline stages.
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Wraps `next`, returning a continuation that runs this stage's
    /// behavior around it.
    fn stitch(&self, next: Continuation) -> Continuation;
}

/// A stage backed by a closure over the next continuation.
pub struct FnStage<F>
where
    F: Fn(Continuation) -> Continuation + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(Continuation) -> Continuation + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(Continuation) -> Continuation + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .finish()
    }
}

impl<F> Stage for FnStage<F>
where
    F: Fn(Continuation) -> Continuation + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn stitch(&self, next: Continuation) -> Continuation {
        (self.func)(next)
    }
}

/// A stage that returns `next` unchanged.
#[derive(Debug, Clone)]
pub struct PassThrough {
    name: String,
}

impl PassThrough {
    /// Creates a new pass-through stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Stage for PassThrough {
    fn name(&self) -> &str {
        &self.name
    }

    fn stitch(&self, next: Continuation) -> Continuation {
        next
    }
}

/// Shared, type-erased stage.
pub type SharedStage = Arc<dyn Stage>;
