//! Running every pipeline of a process together.

use super::{ConsumerDriver, DriverState};
use crate::config::DriverConfig;
use crate::errors::{DriverError, MsgflowError};
use crate::registry::HandlerFactory;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Owns one [`ConsumerDriver`] per pipeline and starts and stops them as a
/// group.
///
/// A pipeline that fails to assemble is reported from
/// [`start_all`](Self::start_all) and stays stopped; the others run.
#[derive(Debug)]
pub struct PipelineHost {
    drivers: Vec<ConsumerDriver>,
    shutdown: CancellationToken,
}

impl PipelineHost {
    /// Creates a host for every pipeline in the factory's registry.
    #[must_use]
    pub fn new(factory: Arc<HandlerFactory>, config: DriverConfig) -> Self {
        let names = factory.registry().names();
        Self::with_pipelines(factory, names, config)
    }

    /// Creates a host for the named pipelines only.
    #[must_use]
    pub fn with_pipelines<I, S>(factory: Arc<HandlerFactory>, names: I, config: DriverConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let drivers = names
            .into_iter()
            .map(|name| ConsumerDriver::new(name, Arc::clone(&factory), config.clone()))
            .collect();
        Self {
            drivers,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns the drivers.
    #[must_use]
    pub fn drivers(&self) -> &[ConsumerDriver] {
        &self.drivers
    }

    /// Returns the driver for `pipeline`.
    #[must_use]
    pub fn driver(&self, pipeline: &str) -> Option<&ConsumerDriver> {
        self.drivers.iter().find(|d| d.pipeline() == pipeline)
    }

    /// Returns the token every loop's token is derived from.
    #[must_use]
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Starts every driver, returning the pipelines that failed to start.
    pub fn start_all(&self) -> Vec<(String, MsgflowError)> {
        self.drivers
            .iter()
            .filter_map(|driver| {
                driver
                    .start(&self.shutdown)
                    .err()
                    .map(|err| (driver.pipeline().to_string(), err))
            })
            .collect()
    }

    /// Stops every started driver concurrently.
    ///
    /// `deadline` bounds the wait for all of them.
    pub async fn stop_all(&self, deadline: &CancellationToken) -> Vec<(String, DriverError)> {
        let stops = self
            .drivers
            .iter()
            .filter(|driver| driver.state() != DriverState::Created)
            .map(|driver| async move {
                driver
                    .stop(deadline)
                    .await
                    .err()
                    .map(|err| (driver.pipeline().to_string(), err))
            });

        join_all(stops).await.into_iter().flatten().collect()
    }

    /// Starts every driver, waits for `signal`, then stops them all.
    ///
    /// Returns the pipelines that failed to start, followed by those that
    /// failed to stop.
    pub async fn run_until<F>(&self, signal: F) -> Vec<(String, MsgflowError)>
    where
        F: Future<Output = ()>,
    {
        let mut failures = self.start_all();
        signal.await;
        let stops = self.stop_all(&CancellationToken::new()).await;
        failures.extend(stops.into_iter().map(|(pipeline, err)| (pipeline, err.into())));
        failures
    }

    /// Returns the number of running drivers.
    #[must_use]
    pub fn running(&self) -> usize {
        self.drivers
            .iter()
            .filter(|d| d.state() == DriverState::Running)
            .count()
    }
}
