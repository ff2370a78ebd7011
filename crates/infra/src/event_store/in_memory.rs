use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use chronicle_core::{AggregateId, AggregateType, Event};

use super::r#trait::{check_stream_position, validate_batch, EventStore, EventStoreError};

#[derive(Debug, Default)]
struct Log {
    /// Every event in insertion order.
    events: Vec<Event>,
    /// Positions in `events`, per aggregate, ascending by version.
    streams: HashMap<AggregateId, Vec<usize>>,
}

impl Log {
    fn stream(&self, aggregate_id: &AggregateId) -> impl Iterator<Item = &Event> {
        self.streams
            .get(aggregate_id)
            .into_iter()
            .flatten()
            .map(|&pos| &self.events[pos])
    }
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. The write lock is held across the existence check
/// and the append, which makes each `save_events` call atomic.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: RwLock<Log>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> EventStoreError {
        EventStoreError::Storage("lock poisoned".to_string())
    }

    fn sorted_by_creation(mut events: Vec<Event>) -> Vec<Event> {
        // Stable sort keeps insertion order for equal timestamps.
        events.sort_by_key(|e| e.created_at());
        events
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn save_events(&self, events: &[Event]) -> Result<(), EventStoreError> {
        if events.is_empty() {
            return Ok(());
        }
        let batch = validate_batch(events)?;

        let mut log = self.log.write().map_err(|_| Self::poisoned())?;

        let mut current = 0u64;
        let mut stored_type: Option<String> = None;
        for stored in log.stream(batch.aggregate_id) {
            if (batch.first_version..=batch.last_version).contains(&stored.version()) {
                return Err(EventStoreError::Concurrency(format!(
                    "version {} already exists for aggregate {}",
                    stored.version(),
                    batch.aggregate_id
                )));
            }
            current = current.max(stored.version());
            stored_type.get_or_insert_with(|| stored.aggregate_type().to_string());
        }
        check_stream_position(&batch, current, stored_type.as_deref())?;

        let aggregate_id = batch.aggregate_id.clone();
        for e in events {
            let pos = log.events.len();
            log.events.push(e.clone());
            log.streams.entry(aggregate_id.clone()).or_default().push(pos);
        }

        Ok(())
    }

    async fn get_events(
        &self,
        aggregate_id: &AggregateId,
        aggregate_type: &AggregateType,
    ) -> Result<Vec<Event>, EventStoreError> {
        let log = self.log.read().map_err(|_| Self::poisoned())?;
        let mut stream: Vec<Event> = log
            .stream(aggregate_id)
            .filter(|e| e.aggregate_type() == aggregate_type)
            .cloned()
            .collect();
        stream.sort_by_key(|e| e.version());
        Ok(stream)
    }

    async fn get_events_by_type(
        &self,
        aggregate_type: &AggregateType,
    ) -> Result<Vec<Event>, EventStoreError> {
        let log = self.log.read().map_err(|_| Self::poisoned())?;
        let events = log
            .events
            .iter()
            .filter(|e| e.aggregate_type() == aggregate_type)
            .cloned()
            .collect();
        Ok(Self::sorted_by_creation(events))
    }

    async fn get_all_events(&self) -> Result<Vec<Event>, EventStoreError> {
        let log = self.log.read().map_err(|_| Self::poisoned())?;
        Ok(Self::sorted_by_creation(log.events.clone()))
    }
}
