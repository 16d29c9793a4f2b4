//! Per-message timing scopes.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Identifies a measurement recorded into a timing scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasureToken {
    /// The measurement name.
    pub name: String,
    /// The slot within the name.
    pub slot: u32,
}

impl MeasureToken {
    /// Creates a new measure token.
    #[must_use]
    pub fn new(name: impl Into<String>, slot: u32) -> Self {
        Self {
            name: name.into(),
            slot,
        }
    }
}

impl fmt::Display for MeasureToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.slot)
    }
}

/// The success/failure token pair used by a measurement stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LatencyTokens {
    /// Recorded when `next` completes normally.
    pub success: MeasureToken,
    /// Recorded when `next` fails.
    pub failure: MeasureToken,
}

impl LatencyTokens {
    /// Creates a new token pair.
    #[must_use]
    pub fn new(success: MeasureToken, failure: MeasureToken) -> Self {
        Self { success, failure }
    }
}

/// One recorded value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    /// The token it was recorded under.
    pub token: MeasureToken,
    /// The value, in scope ticks.
    pub ticks: u64,
}

/// A named point in time, in ticks since the scope began.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The checkpoint name.
    pub name: String,
    /// Ticks since the scope began.
    pub at_ticks: u64,
}

/// The finished data of a timing scope, handed to exporters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySnapshot {
    /// The pipeline name.
    pub pipeline: String,
    /// The message ID.
    pub message_id: Uuid,
    /// Wall-clock start of the scope.
    pub started_at: DateTime<Utc>,
    /// Ticks per second.
    pub frequency: u64,
    /// Ticks from scope start to snapshot.
    pub total_ticks: u64,
    /// Recorded measurements, in recording order.
    pub measurements: Vec<Measurement>,
    /// Recorded checkpoints, in recording order.
    pub checkpoints: Vec<Checkpoint>,
}

impl LatencySnapshot {
    /// Returns the values recorded under `token`.
    #[must_use]
    pub fn values_for(&self, token: &MeasureToken) -> Vec<u64> {
        self.measurements
            .iter()
            .filter(|m| &m.token == token)
            .map(|m| m.ticks)
            .collect()
    }
}

#[derive(Debug, Default)]
struct Recorded {
    measurements: Vec<Measurement>,
    checkpoints: Vec<Checkpoint>,
}

#[derive(Debug)]
struct ScopeInner {
    pipeline: String,
    message_id: Uuid,
    started: Instant,
    started_at: DateTime<Utc>,
    recorded: Mutex<Recorded>,
}

/// A timing scope for one message.
///
/// Cloning is cheap and clones share the recorded data, so the scope can
/// live in a message's feature bag while the stage that created it keeps a
/// handle for exporting.
#[derive(Debug, Clone)]
pub struct LatencyContext {
    inner: Arc<ScopeInner>,
}

impl LatencyContext {
    /// Ticks per second; one tick is one nanosecond.
    pub const FREQUENCY: u64 = 1_000_000_000;

    /// Starts a new scope.
    #[must_use]
    pub fn start(pipeline: impl Into<String>, message_id: Uuid) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                pipeline: pipeline.into(),
                message_id,
                started: Instant::now(),
                started_at: Utc::now(),
                recorded: Mutex::new(Recorded::default()),
            }),
        }
    }

    /// Returns the ticks elapsed since the scope started.
    #[must_use]
    pub fn now_ticks(&self) -> u64 {
        u64::try_from(self.inner.started.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Records a value under `token`.
    pub fn record(&self, token: &MeasureToken, ticks: u64) {
        self.inner.recorded.lock().measurements.push(Measurement {
            token: token.clone(),
            ticks,
        });
    }

    /// Records a named checkpoint at the current tick.
    pub fn checkpoint(&self, name: impl Into<String>) {
        let at_ticks = self.now_ticks();
        self.inner.recorded.lock().checkpoints.push(Checkpoint {
            name: name.into(),
            at_ticks,
        });
    }

    /// Returns the values recorded under `token` so far.
    #[must_use]
    pub fn values_for(&self, token: &MeasureToken) -> Vec<u64> {
        self.inner
            .recorded
            .lock()
            .measurements
            .iter()
            .filter(|m| &m.token == token)
            .map(|m| m.ticks)
            .collect()
    }

    /// Captures the scope's current data.
    #[must_use]
    pub fn snapshot(&self) -> LatencySnapshot {
        let total_ticks = self.now_ticks();
        let recorded = self.inner.recorded.lock();
        LatencySnapshot {
            pipeline: self.inner.pipeline.clone(),
            message_id: self.inner.message_id,
            started_at: self.inner.started_at,
            frequency: Self::FREQUENCY,
            total_ticks,
            measurements: recorded.measurements.clone(),
            checkpoints: recorded.checkpoints.clone(),
        }
    }
}
