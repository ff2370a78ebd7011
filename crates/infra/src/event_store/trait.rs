use async_trait::async_trait;
use thiserror::Error;

use chronicle_core::{AggregateId, AggregateType, Event};
use std::sync::Arc;

use super::query::{EventFilter, EventQueryResult, Pagination};

/// Event store operation error.
///
/// These are **infrastructure errors** (storage, concurrency, stream
/// integrity) as opposed to domain errors (validation, lifecycle).
///
/// ## Error Categories
///
/// - **Concurrency**: another writer already holds one of the (aggregate_id, version) pairs
/// - **AggregateTypeMismatch**: event type doesn't match the stream's aggregate type
/// - **InvalidAppend**: malformed batch (mixed streams, bad or non-consecutive versions)
/// - **Storage**: connectivity, transaction or row decoding failures
/// - **Schema**: startup schema initialization failed
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("schema initialization failed: {0}")]
    Schema(String),
}

impl EventStoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Concurrency(_))
    }
}

/// Durable, ordered, append-only event log.
///
/// Events are organized into **streams**, one per aggregate instance, keyed by
/// `(aggregate_id, aggregate_type)`. Within a stream, versions run 1, 2, 3, ...
/// with no gaps and no duplicates. Version is the only replay ordering key;
/// `created_at` only orders the auxiliary audit reads.
///
/// ## Append Semantics
///
/// `save_events()`:
/// - Validates the batch targets exactly one stream with consecutive versions
/// - Inside one atomic unit, checks that no stored event already has any of the
///   batch's (aggregate_id, version) pairs, then inserts the whole batch
/// - Fails with `Concurrency` when a pair is taken; nothing is written
///
/// The existence check and the inserts must never be split into a
/// read-then-write race in application code.
///
/// ## Load Semantics
///
/// `get_events()` returns the stream in ascending version order. An empty
/// vector means the aggregate does not exist.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a batch for one aggregate atomically.
    async fn save_events(&self, events: &[Event]) -> Result<(), EventStoreError>;

    /// Load the full stream for one aggregate, ascending by version.
    async fn get_events(
        &self,
        aggregate_id: &AggregateId,
        aggregate_type: &AggregateType,
    ) -> Result<Vec<Event>, EventStoreError>;

    /// All events of one aggregate type, ordered by creation time.
    async fn get_events_by_type(
        &self,
        aggregate_type: &AggregateType,
    ) -> Result<Vec<Event>, EventStoreError>;

    /// Every stored event, ordered by creation time.
    async fn get_all_events(&self) -> Result<Vec<Event>, EventStoreError>;

    /// Filtered, paginated inspection query.
    ///
    /// The default filters `get_all_events()` in memory; SQL backends push the
    /// filter down to the database.
    async fn query_events(
        &self,
        filter: EventFilter,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError> {
        let all = self.get_all_events().await?;
        Ok(EventQueryResult::from_events(all, &filter, pagination))
    }
}

#[async_trait]
impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    async fn save_events(&self, events: &[Event]) -> Result<(), EventStoreError> {
        (**self).save_events(events).await
    }

    async fn get_events(
        &self,
        aggregate_id: &AggregateId,
        aggregate_type: &AggregateType,
    ) -> Result<Vec<Event>, EventStoreError> {
        (**self).get_events(aggregate_id, aggregate_type).await
    }

    async fn get_events_by_type(
        &self,
        aggregate_type: &AggregateType,
    ) -> Result<Vec<Event>, EventStoreError> {
        (**self).get_events_by_type(aggregate_type).await
    }

    async fn get_all_events(&self) -> Result<Vec<Event>, EventStoreError> {
        (**self).get_all_events().await
    }

    async fn query_events(
        &self,
        filter: EventFilter,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError> {
        (**self).query_events(filter, pagination).await
    }
}

/// The single stream a validated batch targets.
#[derive(Debug)]
pub(crate) struct StreamBatch<'a> {
    pub aggregate_id: &'a AggregateId,
    pub aggregate_type: &'a AggregateType,
    pub first_version: u64,
    pub last_version: u64,
}

/// Validate a non-empty batch before touching storage.
///
/// All events must target the same aggregate id + type, and versions must be
/// >= 1 and strictly consecutive.
pub(crate) fn validate_batch(events: &[Event]) -> Result<StreamBatch<'_>, EventStoreError> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend("empty batch".to_string()));
    };

    if first.version() == 0 {
        return Err(EventStoreError::InvalidAppend(
            "event version must be >= 1".to_string(),
        ));
    }

    let mut expected = first.version();
    for (idx, e) in events.iter().enumerate() {
        if e.aggregate_id() != first.aggregate_id() {
            return Err(EventStoreError::InvalidAppend(format!(
                "batch contains multiple aggregate_ids (index {idx})"
            )));
        }
        if e.aggregate_type() != first.aggregate_type() {
            return Err(EventStoreError::InvalidAppend(format!(
                "batch contains multiple aggregate_types (index {idx})"
            )));
        }
        if e.version() != expected {
            return Err(EventStoreError::InvalidAppend(format!(
                "non-consecutive version in batch (index {idx}: expected {expected}, found {})",
                e.version()
            )));
        }
        expected += 1;
    }

    Ok(StreamBatch {
        aggregate_id: first.aggregate_id(),
        aggregate_type: first.aggregate_type(),
        first_version: first.version(),
        last_version: expected - 1,
    })
}

/// Stream-level checks that follow the per-version existence check.
///
/// `current_version` is the highest stored version (0 for a new stream) and
/// `stored_type` the stream's aggregate type if it exists.
pub(crate) fn check_stream_position(
    batch: &StreamBatch<'_>,
    current_version: u64,
    stored_type: Option<&str>,
) -> Result<(), EventStoreError> {
    if let Some(existing) = stored_type {
        if existing != batch.aggregate_type.as_str() {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "stream aggregate_type is '{existing}', attempted append with '{}'",
                batch.aggregate_type
            )));
        }
    }

    if batch.first_version > current_version + 1 {
        return Err(EventStoreError::InvalidAppend(format!(
            "version gap: stream is at {current_version}, batch starts at {}",
            batch.first_version
        )));
    }

    Ok(())
}
