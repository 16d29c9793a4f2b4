//! The warning events emitted while consuming messages.
//!
//! Per-message failures never escape the consumer loop; operators see them
//! only through these five warnings. Each has a stable `event` field so log
//! pipelines can match on it.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use uuid::Uuid;

/// The closed set of warning events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningEvent {
    /// The source raised an error while fetching.
    FetchFailed,
    /// The source returned no context without raising.
    EmptyFetch,
    /// The source's completion hook raised.
    CompletionFailed,
    /// The source's processing-failure hook raised.
    FailureHandlerFailed,
    /// Releasing or cleaning up after a message raised.
    CleanupFailed,
}

impl WarningEvent {
    /// All events, in loop order.
    pub const ALL: [Self; 5] = [
        Self::FetchFailed,
        Self::EmptyFetch,
        Self::CompletionFailed,
        Self::FailureHandlerFailed,
        Self::CleanupFailed,
    ];

    /// Stable event name written to the `event` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FetchFailed => "msgflow.source.fetch_failed",
            Self::EmptyFetch => "msgflow.source.empty_fetch",
            Self::CompletionFailed => "msgflow.message.completion_failed",
            Self::FailureHandlerFailed => "msgflow.message.failure_handler_failed",
            Self::CleanupFailed => "msgflow.message.cleanup_failed",
        }
    }
}

impl fmt::Display for WarningEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn fetch_failed(pipeline: &str, error: &anyhow::Error) {
    warn!(
        event = WarningEvent::FetchFailed.as_str(),
        pipeline,
        error = %format_args!("{error:#}"),
        "Message source failed to fetch"
    );
}

pub(crate) fn empty_fetch(pipeline: &str) {
    warn!(
        event = WarningEvent::EmptyFetch.as_str(),
        pipeline,
        "Message source returned no context"
    );
}

pub(crate) fn completion_failed(pipeline: &str, message_id: Uuid, error: &anyhow::Error) {
    warn!(
        event = WarningEvent::CompletionFailed.as_str(),
        pipeline,
        %message_id,
        error = %format_args!("{error:#}"),
        "Failed to complete message"
    );
}

pub(crate) fn failure_handler_failed(
    pipeline: &str,
    message_id: Uuid,
    processing_error: &anyhow::Error,
    handler_error: &anyhow::Error,
) {
    warn!(
        event = WarningEvent::FailureHandlerFailed.as_str(),
        pipeline,
        %message_id,
        processing_error = %format_args!("{processing_error:#}"),
        error = %format_args!("{handler_error:#}"),
        "Processing-failure handler failed"
    );
}

pub(crate) fn cleanup_failed(pipeline: &str, message_id: Uuid, step: &str, error: &anyhow::Error) {
    warn!(
        event = WarningEvent::CleanupFailed.as_str(),
        pipeline,
        %message_id,
        step,
        error = %format_args!("{error:#}"),
        "Failed to clean up message"
    );
}
