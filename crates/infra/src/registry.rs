//! Aggregate type → constructor registry used for replay.
//!
//! The registry is a plain value owned by one `Repository`. Several registries
//! (e.g. one per database) can live in the same process.

use std::collections::HashMap;
use std::sync::Arc;

use chronicle_core::{AggregateId, AggregateType, StateAccessor};

use crate::repository::RepositoryError;

/// Builds a fresh, version-0 instance for replay.
///
/// The product must satisfy `StateAccessor`; a constructor for anything less
/// does not type-check.
pub type AggregateFactory = Arc<dyn Fn(AggregateId) -> Box<dyn StateAccessor> + Send + Sync>;

#[derive(Clone, Default)]
pub struct AggregateRegistry {
    factories: HashMap<AggregateType, AggregateFactory>,
}

impl AggregateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `aggregate_type` with its constructor.
    ///
    /// Fails fast on duplicate registration, and when a sample instance built by
    /// the factory is not a fresh instance of `aggregate_type`.
    pub fn register<F>(
        &mut self,
        aggregate_type: AggregateType,
        factory: F,
    ) -> Result<(), RepositoryError>
    where
        F: Fn(AggregateId) -> Box<dyn StateAccessor> + Send + Sync + 'static,
    {
        if self.factories.contains_key(&aggregate_type) {
            return Err(RepositoryError::configuration(format!(
                "aggregate type '{aggregate_type}' is already registered"
            )));
        }

        let sample = factory(AggregateId::new());
        if sample.aggregate_type() != &aggregate_type {
            return Err(RepositoryError::configuration(format!(
                "factory registered for '{aggregate_type}' builds '{}' instances",
                sample.aggregate_type()
            )));
        }
        if sample.version() != 0 || !sample.uncommitted_events().is_empty() {
            return Err(RepositoryError::configuration(format!(
                "factory for '{aggregate_type}' must build a fresh instance (got version {})",
                sample.version()
            )));
        }

        tracing::debug!(aggregate_type = %aggregate_type, "registered aggregate factory");
        self.factories.insert(aggregate_type, Arc::new(factory));
        Ok(())
    }

    pub fn contains(&self, aggregate_type: &AggregateType) -> bool {
        self.factories.contains_key(aggregate_type)
    }

    pub fn registered_types(&self) -> impl Iterator<Item = &AggregateType> {
        self.factories.keys()
    }

    /// Construct a fresh instance for `(id, aggregate_type)`.
    pub fn build(
        &self,
        id: AggregateId,
        aggregate_type: &AggregateType,
    ) -> Result<Box<dyn StateAccessor>, RepositoryError> {
        let factory = self.factories.get(aggregate_type).ok_or_else(|| {
            RepositoryError::configuration(format!(
                "no factory registered for aggregate type '{aggregate_type}'"
            ))
        })?;

        let instance = factory(id.clone());
        if instance.id() != &id || instance.aggregate_type() != aggregate_type {
            return Err(RepositoryError::configuration(format!(
                "factory for '{aggregate_type}' ignored the requested identity"
            )));
        }
        Ok(instance)
    }
}

impl core::fmt::Debug for AggregateRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AggregateRegistry")
            .field("types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
