//! Per-message state carrier.

use super::FeatureBag;
use chrono::{DateTime, Utc};
use std::any::Any;
use uuid::Uuid;

/// The mutable context for one message's pass through a pipeline.
///
/// Sources create a context per fetched message and store the message
/// itself as a feature; stages read and write further features. The
/// consumer owns the context exclusively until completion, failure
/// handling, or release.
#[derive(Debug)]
pub struct MessageContext {
    /// Unique ID for this message pass.
    id: Uuid,
    /// Name of the pipeline the message was fetched for.
    pipeline: String,
    /// When the source produced the context.
    received_at: DateTime<Utc>,
    /// Typed extension slots.
    features: FeatureBag,
}

impl MessageContext {
    /// Creates a new context for the given pipeline.
    #[must_use]
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            received_at: Utc::now(),
            features: FeatureBag::new(),
        }
    }

    /// Sets an explicit message ID.
    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Adds a feature while building the context.
    #[must_use]
    pub fn with_feature<F>(mut self, value: F) -> Self
    where
        F: Any + Send + Sync,
    {
        self.features.set(value);
        self
    }

    /// Returns the message ID.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Returns when the context was created.
    #[must_use]
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Returns the feature bag.
    #[must_use]
    pub fn features(&self) -> &FeatureBag {
        &self.features
    }

    /// Returns the feature bag mutably.
    pub fn features_mut(&mut self) -> &mut FeatureBag {
        &mut self.features
    }

    /// Shorthand for `features().get::<F>()`.
    #[must_use]
    pub fn get<F>(&self) -> Option<&F>
    where
        F: Any + Send + Sync,
    {
        self.features.get::<F>()
    }

    /// Shorthand for `features_mut().set(value)`.
    pub fn set<F>(&mut self, value: F) -> Option<F>
    where
        F: Any + Send + Sync,
    {
        self.features.set(value)
    }
}
