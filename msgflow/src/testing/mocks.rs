//! Mock sources, sinks and stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::consumer::{MessageDestination, MessageSource};
use crate::context::MessageContext;
use crate::errors::ProcessingError;
use crate::latency::{LatencyExporter, LatencySnapshot};
use crate::stages::{handler_fn, Continuation, Handler, Stage};

/// The error raised by [`failing_terminal`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct InjectedFailure(pub String);

/// Creates a terminal handler that always fails with [`InjectedFailure`].
#[must_use]
pub fn failing_terminal(message: impl Into<String>) -> Continuation {
    let message = message.into();
    handler_fn(move |_ctx, _cancel| {
        let message = message.clone();
        Box::pin(async move { Err(InjectedFailure(message).into()) })
    })
}

/// An ordered, shareable log of stage entries.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Returns all entries in order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Clears the journal.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// A stage that journals `<name>.enter` before and `<name>.exit` after the
/// rest of the pipeline, whether it succeeded or not.
#[derive(Debug, Clone)]
pub struct RecordingStage {
    name: String,
    journal: Journal,
}

impl RecordingStage {
    /// Creates a new recording stage.
    #[must_use]
    pub fn new(name: impl Into<String>, journal: Journal) -> Self {
        Self {
            name: name.into(),
            journal,
        }
    }
}

impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn stitch(&self, next: Continuation) -> Continuation {
        Arc::new(RecordingHandler {
            name: self.name.clone(),
            journal: self.journal.clone(),
            next,
        })
    }
}

struct RecordingHandler {
    name: String,
    journal: Journal,
    next: Continuation,
}

#[async_trait]
impl Handler for RecordingHandler {
    async fn handle(
        &self,
        ctx: &mut MessageContext,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessingError> {
        self.journal.push(format!("{}.enter", self.name));
        let result = self.next.handle(ctx, cancel).await;
        self.journal.push(format!("{}.exit", self.name));
        result
    }
}

#[derive(Debug)]
enum Step {
    Message(Uuid),
    FetchError(String),
    Empty,
}

/// A message source that replays a fixed script of fetch outcomes.
///
/// Once the script is exhausted it signals [`drained`](Self::drained) and
/// parks until the fetch's cancellation token fires, then returns
/// `Ok(None)`.
#[derive(Debug)]
pub struct ScriptedSource {
    pipeline: String,
    script: Mutex<VecDeque<Step>>,
    drained: Arc<Notify>,
    fetches: AtomicUsize,
    completed: Mutex<Vec<Uuid>>,
    failed: Mutex<Vec<(Uuid, String)>>,
    released: Mutex<Vec<Uuid>>,
    fail_complete: bool,
    fail_fail: bool,
    fail_release: bool,
}

impl ScriptedSource {
    /// Creates a source with an empty script.
    #[must_use]
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            script: Mutex::new(VecDeque::new()),
            drained: Arc::new(Notify::new()),
            fetches: AtomicUsize::new(0),
            completed: Mutex::new(Vec::new()),
            failed: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
            fail_complete: false,
            fail_fail: false,
            fail_release: false,
        }
    }

    /// Makes the completion hook fail.
    #[must_use]
    pub fn failing_complete_hook(mut self) -> Self {
        self.fail_complete = true;
        self
    }

    /// Makes the processing-failure hook fail.
    #[must_use]
    pub fn failing_fail_hook(mut self) -> Self {
        self.fail_fail = true;
        self
    }

    /// Makes the release hook fail.
    #[must_use]
    pub fn failing_release_hook(mut self) -> Self {
        self.fail_release = true;
        self
    }

    /// Queues a message and returns its id.
    pub fn push_message(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.script.lock().push_back(Step::Message(id));
        id
    }

    /// Queues a failing fetch.
    pub fn push_fetch_error(&self, message: impl Into<String>) {
        self.script.lock().push_back(Step::FetchError(message.into()));
    }

    /// Queues a fetch that returns no context.
    pub fn push_empty(&self) {
        self.script.lock().push_back(Step::Empty);
    }

    /// Returns the notifier signalled when the script runs out.
    #[must_use]
    pub fn drained(&self) -> Arc<Notify> {
        Arc::clone(&self.drained)
    }

    /// Returns the number of fetch calls so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Returns the ids passed to the completion hook.
    #[must_use]
    pub fn completed(&self) -> Vec<Uuid> {
        self.completed.lock().clone()
    }

    /// Returns the ids and error messages passed to the failure hook.
    #[must_use]
    pub fn failed(&self) -> Vec<(Uuid, String)> {
        self.failed.lock().clone()
    }

    /// Returns the ids passed to the release hook.
    #[must_use]
    pub fn released(&self) -> Vec<Uuid> {
        self.released.lock().clone()
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn fetch(&self, cancel: &CancellationToken) -> anyhow::Result<Option<MessageContext>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let step = self.script.lock().pop_front();
        match step {
            Some(Step::Message(id)) => Ok(Some(MessageContext::new(&self.pipeline).with_id(id))),
            Some(Step::FetchError(message)) => Err(anyhow::anyhow!(message)),
            Some(Step::Empty) => Ok(None),
            None => {
                self.drained.notify_one();
                cancel.cancelled().await;
                Ok(None)
            }
        }
    }

    async fn complete(&self, ctx: &mut MessageContext) -> anyhow::Result<()> {
        self.completed.lock().push(ctx.id());
        if self.fail_complete {
            anyhow::bail!("completion hook failed");
        }
        Ok(())
    }

    async fn fail(&self, ctx: &mut MessageContext, error: &ProcessingError) -> anyhow::Result<()> {
        self.failed.lock().push((ctx.id(), error.to_string()));
        if self.fail_fail {
            anyhow::bail!("failure hook failed");
        }
        Ok(())
    }

    async fn release(&self, ctx: MessageContext) -> anyhow::Result<()> {
        self.released.lock().push(ctx.id());
        if self.fail_release {
            anyhow::bail!("release hook failed");
        }
        Ok(())
    }
}

/// A destination that keeps the id of every written message.
#[derive(Debug, Default)]
pub struct CollectingDestination {
    written: Mutex<Vec<Uuid>>,
}

impl CollectingDestination {
    /// Creates an empty destination.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the written message ids in order.
    #[must_use]
    pub fn written(&self) -> Vec<Uuid> {
        self.written.lock().clone()
    }
}

#[async_trait]
impl MessageDestination for CollectingDestination {
    async fn write(&self, ctx: &mut MessageContext, _cancel: &CancellationToken) -> anyhow::Result<()> {
        self.written.lock().push(ctx.id());
        Ok(())
    }
}

/// An exporter that keeps every snapshot, or fails every export.
#[derive(Debug, Default)]
pub struct CollectingExporter {
    snapshots: Mutex<Vec<LatencySnapshot>>,
    failing: bool,
}

impl CollectingExporter {
    /// Creates a collecting exporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an exporter whose exports always fail.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            snapshots: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    /// Returns the exported snapshots in order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<LatencySnapshot> {
        self.snapshots.lock().clone()
    }
}

#[async_trait]
impl LatencyExporter for CollectingExporter {
    async fn export(&self, snapshot: &LatencySnapshot) -> anyhow::Result<()> {
        if self.failing {
            anyhow::bail!("exporter unavailable");
        }
        self.snapshots.lock().push(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_source_replays_in_order() {
        let source = ScriptedSource::new("p");
        let id = source.push_message();
        source.push_fetch_error("down");
        source.push_empty();
        let cancel = CancellationToken::new();

        let ctx = source.fetch(&cancel).await.unwrap().unwrap();
        assert_eq!(ctx.id(), id);
        assert_eq!(ctx.pipeline(), "p");
        assert_eq!(source.fetch(&cancel).await.unwrap_err().to_string(), "down");
        assert!(source.fetch(&cancel).await.unwrap().is_none());
        assert_eq!(source.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_source_waits_for_cancel() {
        let source = ScriptedSource::new("p");
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(source.fetch(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recording_stage_exits_on_error() {
        let journal = Journal::new();
        let handler = RecordingStage::new("A", journal.clone()).stitch(failing_terminal("x"));

        let err = handler
            .handle(&mut MessageContext::new("p"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "x");
        assert_eq!(journal.entries(), vec!["A.enter", "A.exit"]);
    }
}
