//! Typed extension slots carried by a message context.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// A bag holding at most one value per feature type.
///
/// The key is the feature's own [`TypeId`], so two structurally identical
/// feature types never collide. Writing a type that is already present
/// replaces the old value.
#[derive(Default)]
pub struct FeatureBag {
    features: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    names: HashMap<TypeId, &'static str>,
}

impl FeatureBag {
    /// Creates a new empty feature bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a feature, returning the value it replaced.
    pub fn set<F>(&mut self, value: F) -> Option<F>
    where
        F: Any + Send + Sync,
    {
        let id = TypeId::of::<F>();
        self.names.insert(id, std::any::type_name::<F>());
        self.features
            .insert(id, Box::new(value))
            .and_then(|old| old.downcast::<F>().ok())
            .map(|old| *old)
    }

    /// Gets a feature, or `None` if it was never set.
    #[must_use]
    pub fn get<F>(&self) -> Option<&F>
    where
        F: Any + Send + Sync,
    {
        self.features
            .get(&TypeId::of::<F>())
            .and_then(|value| value.downcast_ref::<F>())
    }

    /// Gets a mutable reference to a feature.
    #[must_use]
    pub fn get_mut<F>(&mut self) -> Option<&mut F>
    where
        F: Any + Send + Sync,
    {
        self.features
            .get_mut(&TypeId::of::<F>())
            .and_then(|value| value.downcast_mut::<F>())
    }

    /// Removes and returns a feature.
    pub fn remove<F>(&mut self) -> Option<F>
    where
        F: Any + Send + Sync,
    {
        let id = TypeId::of::<F>();
        self.names.remove(&id);
        self.features
            .remove(&id)
            .and_then(|value| value.downcast::<F>().ok())
            .map(|value| *value)
    }

    /// Checks if a feature of type `F` is present.
    #[must_use]
    pub fn contains<F>(&self) -> bool
    where
        F: Any + Send + Sync,
    {
        self.features.contains_key(&TypeId::of::<F>())
    }

    /// Returns the number of stored features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns true if no feature is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Returns the type names of stored features, sorted.
    #[must_use]
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.names.values().copied().collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FeatureBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureBag")
            .field("features", &self.type_names())
            .finish()
    }
}
