//! SQLite-backed event store implementation.
//!
//! Same logical schema and guarantees as the Postgres store: a `UNIQUE
//! (aggregate_id, version)` constraint plus an existence check and the inserts
//! inside one transaction. Suited to embedded/single-process deployments and
//! to exercising the SQL path in tests via `sqlite::memory:`.
//!
//! Appends open their transaction with `BEGIN IMMEDIATE`, so the write lock is
//! taken before the version check. Competing writers on other connections
//! queue on the busy timeout instead of failing a lock upgrade, and the loser
//! then sees the winner's rows and reports `Concurrency`.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, Row, Sqlite, Transaction};
use tracing::instrument;

use chronicle_core::{AggregateId, AggregateType, Event};

use super::r#trait::{
    check_stream_position, validate_batch, EventStore, EventStoreError, StreamBatch,
};
use super::sql::{
    map_schema_error, map_sqlx_error, rows_into_events, version_to_i64, EventRow, EVENT_COLUMNS,
};

/// How long a writer waits for another connection's write lock.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        aggregate_id   TEXT    NOT NULL,
        aggregate_type TEXT    NOT NULL,
        event_type     TEXT    NOT NULL,
        version        INTEGER NOT NULL CHECK (version > 0),
        payload        BLOB    NOT NULL,
        created_at     TEXT    NOT NULL,
        UNIQUE (aggregate_id, version)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS events_aggregate_type_idx ON events (aggregate_type, created_at, id)",
    "CREATE INDEX IF NOT EXISTS events_created_at_idx ON events (created_at, id)",
];

/// SQLite-backed append-only event store.
#[derive(Debug, Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect a pool to `database_url` (e.g. `sqlite://chronicle.db?mode=rwc`).
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, EventStoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| map_sqlx_error("connect", e))?
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// A private in-memory database with its schema initialized.
    ///
    /// The pool is pinned to a single long-lived connection: every connection
    /// to `sqlite::memory:` opens its own empty database.
    pub async fn in_memory() -> Result<Self, EventStoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the `events` table and indexes if they don't exist.
    #[instrument(skip(self), err)]
    pub async fn init_schema(&self) -> Result<(), EventStoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_schema_error(statement, e))?;
        }
        Ok(())
    }

    async fn fetch_events<'q>(
        &self,
        operation: &str,
        query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> Result<Vec<Event>, EventStoreError> {
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        let mut decoded = Vec::with_capacity(rows.len());
        for row in rows {
            let row = EventRow::from_row(&row).map_err(|e| {
                EventStoreError::Storage(format!("failed to deserialize event row: {e}"))
            })?;
            decoded.push(row);
        }
        rows_into_events(decoded)
    }
}

async fn check_versions_free(
    tx: &mut Transaction<'_, Sqlite>,
    batch: &StreamBatch<'_>,
) -> Result<(), EventStoreError> {
    let taken: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT version
        FROM events
        WHERE aggregate_id = ?1 AND version BETWEEN ?2 AND ?3
        ORDER BY version ASC
        LIMIT 1
        "#,
    )
    .bind(batch.aggregate_id.as_str())
    .bind(version_to_i64(batch.first_version)?)
    .bind(version_to_i64(batch.last_version)?)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_versions_free", e))?;

    match taken {
        Some(version) => Err(EventStoreError::Concurrency(format!(
            "version {version} already exists for aggregate {}",
            batch.aggregate_id
        ))),
        None => Ok(()),
    }
}

async fn check_stream_version(
    tx: &mut Transaction<'_, Sqlite>,
    aggregate_id: &AggregateId,
) -> Result<(u64, Option<String>), EventStoreError> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(MAX(version), 0) AS current_version,
            MAX(aggregate_type) AS aggregate_type
        FROM events
        WHERE aggregate_id = ?1
        "#,
    )
    .bind(aggregate_id.as_str())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_stream_version", e))?;

    let current_version: i64 = row
        .try_get("current_version")
        .map_err(|e| EventStoreError::Storage(format!("failed to read current_version: {e}")))?;
    let aggregate_type: Option<String> = row
        .try_get("aggregate_type")
        .map_err(|e| EventStoreError::Storage(format!("failed to read aggregate_type: {e}")))?;

    Ok((u64::try_from(current_version).unwrap_or(0), aggregate_type))
}

#[async_trait]
impl EventStore for SqliteEventStore {
    #[instrument(skip_all, fields(event_count = events.len()), err)]
    async fn save_events(&self, events: &[Event]) -> Result<(), EventStoreError> {
        if events.is_empty() {
            return Ok(());
        }
        let batch = validate_batch(events)?;

        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let checked = async {
            check_versions_free(&mut tx, &batch).await?;
            let (current, stored_type) = check_stream_version(&mut tx, batch.aggregate_id).await?;
            check_stream_position(&batch, current, stored_type.as_deref())
        }
        .await;
        if let Err(err) = checked {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(err);
        }

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO events (aggregate_id, aggregate_type, event_type, version, payload, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(event.aggregate_id().as_str())
            .bind(event.aggregate_type().as_str())
            .bind(event.event_type())
            .bind(version_to_i64(event.version())?)
            .bind(event.payload())
            .bind(event.created_at())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_event", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(())
    }

    async fn get_events(
        &self,
        aggregate_id: &AggregateId,
        aggregate_type: &AggregateType,
    ) -> Result<Vec<Event>, EventStoreError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE aggregate_id = ?1 AND aggregate_type = ?2 \
             ORDER BY version ASC"
        );
        let query = sqlx::query(&sql)
            .bind(aggregate_id.as_str())
            .bind(aggregate_type.as_str());
        self.fetch_events("get_events", query).await
    }

    async fn get_events_by_type(
        &self,
        aggregate_type: &AggregateType,
    ) -> Result<Vec<Event>, EventStoreError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE aggregate_type = ?1 \
             ORDER BY created_at ASC, id ASC"
        );
        let query = sqlx::query(&sql).bind(aggregate_type.as_str());
        self.fetch_events("get_events_by_type", query).await
    }

    async fn get_all_events(&self) -> Result<Vec<Event>, EventStoreError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY created_at ASC, id ASC");
        self.fetch_events("get_all_events", sqlx::query(&sql)).await
    }
}

impl<'r> FromRow<'r, SqliteRow> for EventRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(EventRow {
            id: row.try_get("id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            aggregate_type: row.try_get("aggregate_type")?,
            event_type: row.try_get("event_type")?,
            version: row.try_get("version")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
