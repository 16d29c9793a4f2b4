//! Background driver hosting one pipeline's consumer loop.

use crate::config::DriverConfig;
use crate::errors::{DriverError, MsgflowError};
use crate::registry::HandlerFactory;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Lifecycle state of a [`ConsumerDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    /// Constructed, not started.
    Created,
    /// Resolving the consumer.
    Starting,
    /// The loop task is spawned.
    Running,
    /// Cancellation requested, waiting for the loop.
    Stopping,
    /// The loop has ended. Terminal.
    Stopped,
}

impl DriverState {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }

    /// Returns true once the loop can no longer run.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs one named pipeline's consumer on a background task.
///
/// `start` resolves the consumer and spawns its loop without waiting for a
/// message; `stop` cancels the loop and waits for it to finish. An error
/// escaping the loop ends the pipeline: it is logged and kept as
/// [`last_error`](Self::last_error), and the loop is not restarted.
pub struct ConsumerDriver {
    pipeline: String,
    factory: Arc<HandlerFactory>,
    config: DriverConfig,
    state: Arc<watch::Sender<DriverState>>,
    cancel: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl ConsumerDriver {
    /// Creates a driver for `pipeline`.
    #[must_use]
    pub fn new(pipeline: impl Into<String>, factory: Arc<HandlerFactory>, config: DriverConfig) -> Self {
        let (state, _) = watch::channel(DriverState::Created);
        Self {
            pipeline: pipeline.into(),
            factory,
            config,
            state: Arc::new(state),
            cancel: Mutex::new(None),
            task: Mutex::new(None),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> DriverState {
        *self.state.borrow()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    /// Returns the error that ended the loop, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Resolves the pipeline's consumer and spawns its loop.
    ///
    /// Returns once the task is spawned; the first fetch happens on the
    /// task. The loop's token is a child of `shutdown`, so cancelling
    /// `shutdown` also stops the loop.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::AlreadyStarted` if the driver left `Created`,
    /// and the pipeline's `ConfigurationError` if it cannot be assembled.
    /// A driver that fails to assemble ends in `Stopped`.
    pub fn start(&self, shutdown: &CancellationToken) -> Result<(), MsgflowError> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == DriverState::Created {
                *state = DriverState::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(DriverError::AlreadyStarted {
                pipeline: self.pipeline.clone(),
            }
            .into());
        }

        let consumer = match self.factory.create_consumer(&self.pipeline) {
            Ok(consumer) => consumer,
            Err(err) => {
                self.state.send_replace(DriverState::Stopped);
                return Err(err.into());
            }
        };

        let token = shutdown.child_token();
        *self.cancel.lock() = Some(token.clone());

        let pipeline = self.pipeline.clone();
        let state = Arc::clone(&self.state);
        let last_error = Arc::clone(&self.last_error);
        let yield_first = self.config.yield_before_start;

        let handle = tokio::spawn(async move {
            if yield_first {
                tokio::task::yield_now().await;
            }
            if let Err(err) = consumer.execute(token).await {
                error!(
                    pipeline = %pipeline,
                    error = %format_args!("{err:#}"),
                    "Consumer loop terminated with an error"
                );
                *last_error.lock() = Some(format!("{err:#}"));
            }
            state.send_replace(DriverState::Stopped);
        });
        *self.task.lock() = Some(handle);

        // The loop may already have ended on a multi-threaded runtime.
        self.state.send_if_modified(|state| {
            if *state == DriverState::Starting {
                *state = DriverState::Running;
                true
            } else {
                false
            }
        });
        Ok(())
    }

    /// Cancels the loop and waits for it to finish.
    ///
    /// The wait ends early when `deadline` fires or the configured stop
    /// timeout elapses; the loop task is then aborted. Loop errors are
    /// never returned from here. Calling `stop` again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::NotStarted` if `start` was never called.
    pub async fn stop(&self, deadline: &CancellationToken) -> Result<(), DriverError> {
        let previous = *self.state.borrow();
        match previous {
            DriverState::Created => {
                return Err(DriverError::NotStarted {
                    pipeline: self.pipeline.clone(),
                })
            }
            DriverState::Starting | DriverState::Running => {
                self.state.send_if_modified(|state| {
                    if state.is_terminal() {
                        false
                    } else {
                        *state = DriverState::Stopping;
                        true
                    }
                });
            }
            DriverState::Stopping | DriverState::Stopped => {}
        }

        if let Some(token) = self.cancel.lock().as_ref() {
            token.cancel();
        }

        let task = self.task.lock().take();
        if let Some(mut handle) = task {
            let abort = handle.abort_handle();
            tokio::select! {
                joined = &mut handle => {
                    if let Err(err) = joined {
                        if err.is_panic() {
                            error!(pipeline = %self.pipeline, "Consumer loop panicked");
                            *self.last_error.lock() = Some("consumer loop panicked".to_string());
                        }
                    }
                }
                () = deadline.cancelled() => {
                    error!(pipeline = %self.pipeline, "Stop deadline reached, aborting consumer loop");
                    abort.abort();
                }
                () = tokio::time::sleep(self.config.stop_timeout()) => {
                    error!(pipeline = %self.pipeline, "Stop timeout elapsed, aborting consumer loop");
                    abort.abort();
                }
            }
        }

        self.state.send_replace(DriverState::Stopped);
        Ok(())
    }

    /// Waits until the driver reaches `Stopped`.
    pub async fn wait_stopped(&self) {
        let mut receiver = self.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = receiver.wait_for(|state| state.is_terminal()).await;
    }
}

impl fmt::Debug for ConsumerDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerDriver")
            .field("pipeline", &self.pipeline)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::{Consumer, MessageSource};
    use crate::context::MessageContext;
    use crate::errors::BrokenAspect;
    use crate::observability::WarningEvent;
    use crate::registry::{PipelineDefinition, PipelineRegistry};
    use crate::stages::{handler_fn, Continuation};
    use crate::testing::{capture_events, ScriptedSource};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn driver_with(
        source: Arc<dyn MessageSource>,
        terminal: Continuation,
        config: DriverConfig,
    ) -> ConsumerDriver {
        let registry = PipelineRegistry::builder()
            .pipeline(
                "p",
                PipelineDefinition::new()
                    .with_terminal(move |_| Ok(terminal.clone()))
                    .with_source(move |_| Ok(source.clone())),
            )
            .build()
            .unwrap();
        let factory = Arc::new(HandlerFactory::new(Arc::new(registry)));
        ConsumerDriver::new("p", factory, config)
    }

    fn driver_for(source: &Arc<ScriptedSource>) -> ConsumerDriver {
        driver_with(
            source.clone(),
            handler_fn(|_ctx, _cancel| Box::pin(async { Ok(()) })),
            DriverConfig::default(),
        )
    }

    fn driver_with_consumer(consumer: Arc<dyn Consumer>, config: DriverConfig) -> ConsumerDriver {
        let registry = PipelineRegistry::builder()
            .pipeline(
                "p",
                PipelineDefinition::new()
                    .with_terminal(|_| Ok(handler_fn(|_ctx, _cancel| Box::pin(async { Ok(()) }))))
                    .with_source(|_| Ok(Arc::new(ScriptedSource::new("p")) as Arc<dyn MessageSource>))
                    .with_consumer(move |_, _, _| Ok(consumer.clone())),
            )
            .build()
            .unwrap();
        ConsumerDriver::new("p", Arc::new(HandlerFactory::new(Arc::new(registry))), config)
    }

    struct BrokenConsumer;

    #[async_trait]
    impl Consumer for BrokenConsumer {
        async fn execute(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
            anyhow::bail!("connection lost for good")
        }
    }

    /// A source whose broker refuses every connection at once.
    #[derive(Default)]
    struct RefusingSource {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl MessageSource for RefusingSource {
        async fn fetch(&self, _cancel: &CancellationToken) -> anyhow::Result<Option<MessageContext>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("connection refused")
        }
    }

    struct StuckConsumer;

    #[async_trait]
    impl Consumer for StuckConsumer {
        async fn execute(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_start_returns_before_first_fetch() {
        let source = Arc::new(ScriptedSource::new("p"));
        source.push_message();
        let driver = driver_for(&source);

        driver.start(&CancellationToken::new()).unwrap();

        assert_eq!(driver.state(), DriverState::Running);
        assert_eq!(source.fetch_count(), 0);

        driver.stop(&CancellationToken::new()).await.unwrap();
        assert_eq!(driver.state(), DriverState::Stopped);
    }

    #[tokio::test]
    async fn test_no_fetch_after_stop() {
        let source = Arc::new(ScriptedSource::new("p"));
        let id = source.push_message();
        let driver = driver_for(&source);

        driver.start(&CancellationToken::new()).unwrap();
        source.drained().notified().await;
        driver.stop(&CancellationToken::new()).await.unwrap();

        let fetches = source.fetch_count();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(source.fetch_count(), fetches);
        assert_eq!(source.completed(), vec![id]);
        assert_eq!(driver.state(), DriverState::Stopped);
        assert!(driver.last_error().is_none());
    }

    #[tokio::test]
    async fn test_fetch_failures_keep_loop_running() {
        let (events, _guard) = capture_events();
        let source = Arc::new(ScriptedSource::new("p"));
        for i in 0..3 {
            source.push_fetch_error(format!("timeout #{i}"));
        }
        let id = source.push_message();
        let driver = driver_for(&source);

        driver.start(&CancellationToken::new()).unwrap();
        source.drained().notified().await;
        assert_eq!(driver.state(), DriverState::Running);
        driver.stop(&CancellationToken::new()).await.unwrap();

        assert_eq!(events.count(WarningEvent::FetchFailed), 3);
        assert_eq!(source.completed(), vec![id]);
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let source = Arc::new(ScriptedSource::new("p"));
        let driver = driver_for(&source);

        driver.start(&CancellationToken::new()).unwrap();
        let err = driver.start(&CancellationToken::new()).unwrap_err();

        assert!(matches!(err, MsgflowError::Driver(DriverError::AlreadyStarted { .. })));
        driver.stop(&CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_start_is_rejected() {
        let driver = driver_for(&Arc::new(ScriptedSource::new("p")));

        let err = driver.stop(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, DriverError::NotStarted { pipeline: "p".into() });
    }

    #[tokio::test]
    async fn test_configuration_error_surfaces_from_start() {
        let registry = PipelineRegistry::builder()
            .pipeline("p", PipelineDefinition::new())
            .build()
            .unwrap();
        let driver = ConsumerDriver::new(
            "p",
            Arc::new(HandlerFactory::new(Arc::new(registry))),
            DriverConfig::default(),
        );

        let err = driver.start(&CancellationToken::new()).unwrap_err();

        match err {
            MsgflowError::Configuration(err) => assert_eq!(err.aspect, BrokenAspect::TerminalStage),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(driver.state(), DriverState::Stopped);
    }

    #[tokio::test]
    async fn test_loop_error_is_logged_and_not_restarted() {
        let (events, _guard) = capture_events();
        let driver = driver_with_consumer(Arc::new(BrokenConsumer), DriverConfig::default());

        driver.start(&CancellationToken::new()).unwrap();
        driver.wait_stopped().await;

        assert_eq!(driver.last_error().unwrap(), "connection lost for good");
        assert_eq!(events.at_level(tracing::Level::ERROR).len(), 1);
        driver.stop(&CancellationToken::new()).await.unwrap();
        assert_eq!(driver.state(), DriverState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_deadline_aborts_stuck_loop() {
        let driver = driver_with_consumer(Arc::new(StuckConsumer), DriverConfig::default());
        driver.start(&CancellationToken::new()).unwrap();

        let deadline = CancellationToken::new();
        deadline.cancel();
        driver.stop(&deadline).await.unwrap();

        assert_eq!(driver.state(), DriverState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_timeout_aborts_stuck_loop() {
        let config = DriverConfig::default().with_stop_timeout(Duration::from_millis(10));
        let driver = driver_with_consumer(Arc::new(StuckConsumer), config);
        driver.start(&CancellationToken::new()).unwrap();

        driver.stop(&CancellationToken::new()).await.unwrap();
        assert_eq!(driver.state(), DriverState::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_token_stops_loop() {
        let source = Arc::new(ScriptedSource::new("p"));
        let driver = driver_for(&source);
        let shutdown = CancellationToken::new();

        driver.start(&shutdown).unwrap();
        shutdown.cancel();
        driver.wait_stopped().await;

        assert_eq!(driver.state(), DriverState::Stopped);
    }

    #[tokio::test]
    async fn test_state_changes_are_observable() {
        let driver = driver_for(&Arc::new(ScriptedSource::new("p")));
        let mut states = driver.subscribe();
        assert_eq!(*states.borrow_and_update(), DriverState::Created);

        driver.start(&CancellationToken::new()).unwrap();
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), DriverState::Running);

        driver.stop(&CancellationToken::new()).await.unwrap();
        assert_eq!(*states.borrow_and_update(), DriverState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_returns_when_source_fails_immediately() {
        let source = Arc::new(RefusingSource::default());
        let config = DriverConfig::default().with_stop_timeout(Duration::from_millis(100));
        let driver = driver_with(
            source.clone(),
            handler_fn(|_ctx, _cancel| Box::pin(async { Ok(()) })),
            config,
        );

        driver.start(&CancellationToken::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        tokio::time::timeout(Duration::from_secs(3), driver.stop(&CancellationToken::new()))
            .await
            .expect("stop did not return")
            .unwrap();
        assert_eq!(driver.state(), DriverState::Stopped);

        let attempts = source.attempts.load(Ordering::SeqCst);
        assert!(attempts > 0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.attempts.load(Ordering::SeqCst), attempts);
    }

    #[tokio::test]
    async fn test_in_flight_message_finishes_after_stop() {
        let source = Arc::new(ScriptedSource::new("p"));
        let id = source.push_message();
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let terminal = {
            let entered = entered.clone();
            let release = release.clone();
            handler_fn(move |_ctx, _cancel| {
                let entered = entered.clone();
                let release = release.clone();
                Box::pin(async move {
                    entered.notify_one();
                    release.notified().await;
                    Ok(())
                })
            })
        };
        let driver = driver_with(source.clone(), terminal, DriverConfig::default());

        driver.start(&CancellationToken::new()).unwrap();
        entered.notified().await;

        let releasing = async {
            while driver.state() != DriverState::Stopping {
                tokio::task::yield_now().await;
            }
            assert!(source.completed().is_empty());
            assert!(source.released().is_empty());
            release.notify_one();
        };
        let stop_token = CancellationToken::new();
        let (stopped, ()) = tokio::join!(driver.stop(&stop_token), releasing);
        stopped.unwrap();

        assert_eq!(source.completed(), vec![id]);
        assert_eq!(source.released(), vec![id]);
        assert_eq!(source.fetch_count(), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(driver.state(), DriverState::Stopped);
    }
}
