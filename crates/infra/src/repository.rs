//! Aggregate persistence and reconstruction.
//!
//! The `Repository` bridges in-memory aggregates and an `EventStore`:
//!
//! ```text
//! save:  pending events ──► EventStore::save_events (one atomic batch) ──► clear pending
//! load:  registry factory ──► fresh instance
//!        EventStore::get_events ──► validate stream ──► apply(event, is_new = false) ×N
//! ```
//!
//! ## Error Semantics
//!
//! - **Not found**: `load` of a stream with no events → `RepositoryError::NotFound`
//! - **Concurrency**: another writer already stored one of our versions →
//!   `RepositoryError::Concurrency`. Nothing is retried here: the caller reloads,
//!   re-applies its change and saves again.
//! - **Configuration**: unregistered aggregate type or misbehaving factory
//! - **Timeout**: a store round-trip exceeded `RepositoryConfig::operation_timeout`
//!
//! A failed `save` leaves the aggregate's pending events untouched, so the
//! in-memory instance never silently claims durability it doesn't have.
//!
//! A `save` that times out is the one indeterminate outcome: the deadline may
//! fire after the store committed. `RepositoryError::is_indeterminate` flags
//! it. The events are kept pending, and the caller must reload before writing
//! again; retrying the same events reports `Concurrency` if they did land.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::instrument;

use chronicle_core::{Aggregate, AggregateId, AggregateType, DomainError, Event, StateAccessor};

use crate::event_store::{EventStore, EventStoreError};
use crate::registry::AggregateRegistry;

const SAVE_EVENTS: &str = "save_events";
const GET_EVENTS: &str = "get_events";

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No events are stored for the requested aggregate.
    #[error("aggregate not found: {aggregate_type}/{id}")]
    NotFound {
        id: AggregateId,
        aggregate_type: AggregateType,
    },

    /// Optimistic concurrency failure (a version we tried to write is taken).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Integration mistake: missing or misbehaving factory registration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A store round-trip exceeded the configured deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The store returned a stream that cannot be replayed.
    #[error("corrupt event stream: {0}")]
    CorruptStream(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// Replaying an event into the aggregate failed.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl RepositoryError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Concurrency(_))
    }

    /// A write whose outcome is unknown: it may or may not be stored.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Timeout { operation, .. } if *operation == SAVE_EVENTS)
    }
}

impl From<EventStoreError> for RepositoryError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => RepositoryError::Concurrency(msg),
            other => RepositoryError::Store(other),
        }
    }
}

/// Tunables for a `Repository`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Upper bound for every store round-trip; `None` waits indefinitely.
    pub operation_timeout: Option<Duration>,
}

/// Persists and reconstructs event-sourced aggregates.
///
/// Owns the type → constructor registry. Register every aggregate type once at
/// startup (`register_aggregate` takes `&mut self`), then share the repository
/// (e.g. behind an `Arc`) with request handlers.
///
/// ## Generic Parameters
///
/// - `S`: Event store implementation (`InMemoryEventStore` in tests, a SQL store
///   or a `SharedEventStore` in production)
#[derive(Debug)]
pub struct Repository<S> {
    store: S,
    registry: AggregateRegistry,
    config: RepositoryConfig,
}

impl<S> Repository<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, RepositoryConfig::default())
    }

    pub fn with_config(store: S, config: RepositoryConfig) -> Self {
        Self {
            store,
            registry: AggregateRegistry::new(),
            config,
        }
    }

    /// Use a registry that was assembled elsewhere.
    pub fn with_registry(mut self, registry: AggregateRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Associate an aggregate type with its constructor. Required before any
    /// `load` of that type.
    pub fn register_aggregate<F>(
        &mut self,
        aggregate_type: AggregateType,
        factory: F,
    ) -> Result<(), RepositoryError>
    where
        F: Fn(AggregateId) -> Box<dyn StateAccessor> + Send + Sync + 'static,
    {
        self.registry.register(aggregate_type, factory)
    }

    pub fn registry(&self) -> &AggregateRegistry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> RepositoryConfig {
        self.config
    }

    pub fn into_parts(self) -> (S, AggregateRegistry) {
        (self.store, self.registry)
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, RepositoryError>
    where
        F: Future<Output = Result<T, EventStoreError>>,
    {
        match self.config.operation_timeout {
            Some(after) => tokio::time::timeout(after, call)
                .await
                .map_err(|_| RepositoryError::Timeout { operation, after })?
                .map_err(RepositoryError::from),
            None => call.await.map_err(RepositoryError::from),
        }
    }
}

impl<S> Repository<S>
where
    S: EventStore,
{
    /// Flush the aggregate's pending events in one atomic batch.
    ///
    /// No-op without pending events. Pending events are cleared only after the
    /// store accepted the whole batch. After an indeterminate failure (see
    /// `RepositoryError::is_indeterminate`) the aggregate must be reloaded.
    #[instrument(
        skip_all,
        fields(
            aggregate_id = %aggregate.id(),
            aggregate_type = %aggregate.aggregate_type(),
            version = aggregate.version(),
            pending = aggregate.uncommitted_events().len()
        ),
        err
    )]
    pub async fn save<A>(&self, aggregate: &mut A) -> Result<(), RepositoryError>
    where
        A: Aggregate + ?Sized,
    {
        if aggregate.uncommitted_events().is_empty() {
            return Ok(());
        }

        let result = self
            .bounded(SAVE_EVENTS, self.store.save_events(aggregate.uncommitted_events()))
            .await;

        match result {
            Ok(()) => {
                aggregate.clear_uncommitted_events();
                tracing::debug!("saved pending events");
                Ok(())
            }
            Err(err) => {
                if err.is_conflict() {
                    tracing::warn!(error = %err, "save lost an optimistic concurrency race");
                } else if err.is_indeterminate() {
                    tracing::warn!(error = %err, "save outcome unknown, reload before writing");
                }
                Err(err)
            }
        }
    }

    /// Rebuild an aggregate by replaying its full history into a fresh instance.
    #[instrument(skip_all, fields(aggregate_id = %id, aggregate_type = %aggregate_type), err)]
    pub async fn load(
        &self,
        id: &AggregateId,
        aggregate_type: &AggregateType,
    ) -> Result<Box<dyn StateAccessor>, RepositoryError> {
        // Resolve the factory before any IO so configuration mistakes surface first.
        let mut aggregate = self.registry.build(id.clone(), aggregate_type)?;

        let history = self
            .bounded(GET_EVENTS, self.store.get_events(id, aggregate_type))
            .await?;
        if history.is_empty() {
            return Err(RepositoryError::NotFound {
                id: id.clone(),
                aggregate_type: aggregate_type.clone(),
            });
        }

        let history = validate_loaded_stream(id, aggregate_type, history)?;
        for event in &history {
            aggregate.apply(event, false)?;
        }

        tracing::debug!(
            version = aggregate.version(),
            events = history.len(),
            "replayed aggregate"
        );
        Ok(aggregate)
    }

    /// Raw history without replay, ascending by version.
    pub async fn get_events(
        &self,
        id: &AggregateId,
        aggregate_type: &AggregateType,
    ) -> Result<Vec<Event>, RepositoryError> {
        self.bounded(GET_EVENTS, self.store.get_events(id, aggregate_type))
            .await
    }
}

/// Order the stream by version and check it is exactly 1..=n for this aggregate.
fn validate_loaded_stream(
    id: &AggregateId,
    aggregate_type: &AggregateType,
    mut stream: Vec<Event>,
) -> Result<Vec<Event>, RepositoryError> {
    stream.sort_by_key(Event::version);

    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id() != id || e.aggregate_type() != aggregate_type {
            return Err(RepositoryError::CorruptStream(format!(
                "loaded stream contains a foreign event at index {idx}"
            )));
        }
        let expected = idx as u64 + 1;
        if e.version() != expected {
            return Err(RepositoryError::CorruptStream(format!(
                "expected version {expected} at index {idx}, found {}",
                e.version()
            )));
        }
    }
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;

    use crate::event_store::InMemoryEventStore;
    use crate::test_support::{counter_type, Counter};

    fn repository() -> Repository<Arc<InMemoryEventStore>> {
        let mut repo = Repository::new(Arc::new(InMemoryEventStore::new()));
        repo.register_aggregate(counter_type(), |id| Box::new(Counter::new(id)))
            .unwrap();
        repo
    }

    #[tokio::test]
    async fn save_then_load_replays_state_and_version() {
        let repo = repository();
        let mut counter = Counter::new(AggregateId::new());
        counter.record(json!({"label": "a"}));
        counter.record(json!({"label": "b", "extra": true}));

        repo.save(&mut counter).await.unwrap();
        assert!(counter.uncommitted_events().is_empty());

        let loaded = repo.load(counter.id(), &counter_type()).await.unwrap();
        assert_eq!(loaded.version(), 2);
        assert_eq!(loaded.properties(), counter.properties());
        assert!(loaded.uncommitted_events().is_empty());
    }

    #[tokio::test]
    async fn save_without_pending_events_is_a_noop() {
        let repo = repository();
        let mut counter = Counter::new(AggregateId::new());
        repo.save(&mut counter).await.unwrap();
        assert!(repo.store().get_all_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_of_unknown_aggregate_is_not_found() {
        let repo = repository();
        let err = repo.load(&AggregateId::new(), &counter_type()).await.err().expect("expected an error");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn load_of_unregistered_type_is_a_configuration_error() {
        let repo: Repository<InMemoryEventStore> = Repository::new(InMemoryEventStore::new());
        let err = repo.load(&AggregateId::new(), &counter_type()).await.err().expect("expected an error");
        assert!(matches!(err, RepositoryError::Configuration(_)));
    }

    #[tokio::test]
    async fn conflicting_save_keeps_events_pending() {
        let repo = repository();
        let id = AggregateId::new();

        let mut first = Counter::new(id.clone());
        first.record(json!({"by": "first"}));
        let mut second = Counter::new(id.clone());
        second.record(json!({"by": "second"}));

        repo.save(&mut first).await.unwrap();
        let err = repo.save(&mut second).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(second.uncommitted_events().len(), 1);

        // The loser reloads, redoes its change against fresh state and retries.
        let loaded = repo.load(&id, &counter_type()).await.unwrap();
        let mut fresh = Counter::from_state(loaded.as_ref());
        fresh.record(json!({"by": "second"}));
        repo.save(&mut fresh).await.unwrap();

        let history = repo.get_events(&id, &counter_type()).await.unwrap();
        assert_eq!(history.iter().map(Event::version).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn replay_is_deterministic() {
        let repo = repository();
        let mut counter = Counter::new(AggregateId::new());
        for n in 0..5 {
            counter.record(json!({ "n": n, format!("k{n}"): n * 2 }));
        }
        repo.save(&mut counter).await.unwrap();

        let a = repo.load(counter.id(), &counter_type()).await.unwrap();
        let b = repo.load(counter.id(), &counter_type()).await.unwrap();
        assert_eq!(a.properties(), b.properties());
        assert_eq!(a.version(), b.version());
    }

    #[test]
    fn stream_validation_orders_and_rejects_gaps() {
        let id = AggregateId::new();
        let ty = counter_type();
        let at = |v: u64| Event::new(id.clone(), ty.clone(), "Recorded", v, vec![], Utc::now());

        let ordered = validate_loaded_stream(&id, &ty, vec![at(2), at(1)]).unwrap();
        assert_eq!(ordered[0].version(), 1);

        let err = validate_loaded_stream(&id, &ty, vec![at(1), at(3)]).unwrap_err();
        assert!(matches!(err, RepositoryError::CorruptStream(_)));
    }

    /// Never answers, to exercise the deadline.
    struct StalledStore;

    #[async_trait]
    impl EventStore for StalledStore {
        async fn save_events(&self, _events: &[Event]) -> Result<(), EventStoreError> {
            std::future::pending().await
        }

        async fn get_events(
            &self,
            _aggregate_id: &AggregateId,
            _aggregate_type: &AggregateType,
        ) -> Result<Vec<Event>, EventStoreError> {
            std::future::pending().await
        }

        async fn get_events_by_type(
            &self,
            _aggregate_type: &AggregateType,
        ) -> Result<Vec<Event>, EventStoreError> {
            std::future::pending().await
        }

        async fn get_all_events(&self) -> Result<Vec<Event>, EventStoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn operation_timeout_surfaces_as_timeout_and_keeps_events_pending() {
        let repo = Repository::with_config(
            StalledStore,
            RepositoryConfig {
                operation_timeout: Some(Duration::from_millis(20)),
            },
        );
        let mut counter = Counter::new(AggregateId::new());
        counter.record(json!({"x": 1}));

        let err = repo.save(&mut counter).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Timeout { operation: "save_events", .. }));
        assert!(err.is_indeterminate());
        assert_eq!(counter.uncommitted_events().len(), 1);

        let err = repo.get_events(counter.id(), &counter_type()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Timeout { operation: "get_events", .. }));
        assert!(!err.is_indeterminate());
    }

    /// Stores the batch, then never acknowledges it.
    struct LostAckStore(InMemoryEventStore);

    #[async_trait]
    impl EventStore for LostAckStore {
        async fn save_events(&self, events: &[Event]) -> Result<(), EventStoreError> {
            self.0.save_events(events).await?;
            std::future::pending().await
        }

        async fn get_events(
            &self,
            aggregate_id: &AggregateId,
            aggregate_type: &AggregateType,
        ) -> Result<Vec<Event>, EventStoreError> {
            self.0.get_events(aggregate_id, aggregate_type).await
        }

        async fn get_events_by_type(
            &self,
            aggregate_type: &AggregateType,
        ) -> Result<Vec<Event>, EventStoreError> {
            self.0.get_events_by_type(aggregate_type).await
        }

        async fn get_all_events(&self) -> Result<Vec<Event>, EventStoreError> {
            self.0.get_all_events().await
        }
    }

    #[tokio::test]
    async fn save_timing_out_after_the_write_is_indeterminate_until_reload() {
        let mut repo = Repository::with_config(
            LostAckStore(InMemoryEventStore::new()),
            RepositoryConfig {
                operation_timeout: Some(Duration::from_millis(20)),
            },
        );
        repo.register_aggregate(counter_type(), |id| Box::new(Counter::new(id)))
            .unwrap();
        let mut counter = Counter::new(AggregateId::new());
        counter.record(json!({"x": 1}));

        let err = repo.save(&mut counter).await.unwrap_err();
        assert!(err.is_indeterminate(), "{err}");
        assert_eq!(counter.uncommitted_events().len(), 1);

        // The batch did land, so resending it is a conflict.
        let err = repo.save(&mut counter).await.unwrap_err();
        assert!(err.is_conflict(), "{err}");

        let loaded = repo.load(counter.id(), &counter_type()).await.unwrap();
        assert_eq!(loaded.version(), 1);
        assert_eq!(loaded.properties()["x"], json!(1));
    }
}
