//! Pieces shared by the SQL-backed stores.
//!
//! ## Error Mapping
//!
//! | SQLx Error | EventStoreError | Scenario |
//! |------------|-----------------|----------|
//! | Database (unique violation) | `Concurrency` | Concurrent append of an existing (aggregate_id, version) |
//! | Database (other) | `Storage` | Check constraints, locks, other engine errors |
//! | PoolClosed / PoolTimedOut | `Storage` | Connection pool unavailable |
//! | Other | `Storage` | Network errors, decode failures, etc. |

use chrono::{DateTime, Utc};

use chronicle_core::{AggregateId, AggregateType, Event};

use super::r#trait::EventStoreError;

/// Columns selected by every event read, in this order.
pub(crate) const EVENT_COLUMNS: &str =
    "id, aggregate_id, aggregate_type, event_type, version, payload, created_at";

/// Raw `events` row as decoded by either backend.
#[derive(Debug)]
pub(crate) struct EventRow {
    #[allow(dead_code)] // Surrogate row id; ordering tie-breaker only.
    pub id: i64,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub event_type: String,
    pub version: i64,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = EventStoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let aggregate_id = AggregateId::parse(row.aggregate_id)
            .map_err(|e| EventStoreError::Storage(format!("corrupt aggregate_id: {e}")))?;
        let aggregate_type = AggregateType::parse(row.aggregate_type)
            .map_err(|e| EventStoreError::Storage(format!("corrupt aggregate_type: {e}")))?;
        let version = u64::try_from(row.version)
            .map_err(|_| EventStoreError::Storage(format!("negative version {}", row.version)))?;

        Ok(Event::new(
            aggregate_id,
            aggregate_type,
            row.event_type,
            version,
            row.payload,
            row.created_at,
        ))
    }
}

pub(crate) fn rows_into_events(rows: Vec<EventRow>) -> Result<Vec<Event>, EventStoreError> {
    rows.into_iter().map(Event::try_from).collect()
}

pub(crate) fn version_to_i64(version: u64) -> Result<i64, EventStoreError> {
    i64::try_from(version)
        .map_err(|_| EventStoreError::InvalidAppend(format!("version {version} out of range")))
}

/// Map SQLx errors to EventStoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            if db_err.is_unique_violation() {
                EventStoreError::Concurrency(msg)
            } else {
                EventStoreError::Storage(msg)
            }
        }
        sqlx::Error::PoolClosed => {
            EventStoreError::Storage(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            EventStoreError::Storage(format!("timed out acquiring a connection in {operation}"))
        }
        _ => EventStoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}

pub(crate) fn map_schema_error(statement: &str, err: sqlx::Error) -> EventStoreError {
    EventStoreError::Schema(format!("{}: {err}", statement.trim().lines().next().unwrap_or("")))
}
