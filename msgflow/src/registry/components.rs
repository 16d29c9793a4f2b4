//! The process-wide component container.

use crate::errors::ResolutionError;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared services keyed by type.
///
/// Populated once while the registry is built and read-only afterwards.
/// Terminal-stage, stage-list and source factories pull their dependencies
/// from here.
#[derive(Default, Clone)]
pub struct Components {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    names: HashMap<TypeId, &'static str>,
}

impl Components {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component, replacing any previous one of the same type.
    pub fn insert<T>(&mut self, value: T)
    where
        T: Any + Send + Sync,
    {
        self.insert_arc(Arc::new(value));
    }

    /// Registers an already shared component.
    pub fn insert_arc<T>(&mut self, value: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        let id = TypeId::of::<T>();
        self.names.insert(id, std::any::type_name::<T>());
        self.entries.insert(id, value);
    }

    /// Gets a component.
    #[must_use]
    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.entries
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|entry| entry.downcast::<T>().ok())
    }

    /// Gets a component, failing if it was never registered.
    pub fn require<T>(&self) -> Result<Arc<T>, ResolutionError>
    where
        T: Any + Send + Sync,
    {
        self.get::<T>().ok_or(ResolutionError::MissingComponent {
            type_name: std::any::type_name::<T>(),
        })
    }

    /// Checks if a component of type `T` is registered.
    #[must_use]
    pub fn contains<T>(&self) -> bool
    where
        T: Any + Send + Sync,
    {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no component is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Components {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.names.values().collect();
        names.sort_unstable();
        f.debug_struct("Components").field("types", &names).finish()
    }
}
