//! Postgres-backed event store implementation.
//!
//! Append-only semantics and optimistic concurrency are enforced at the
//! database level: the `(aggregate_id, version)` pair is `UNIQUE`, and
//! `save_events` checks for existing pairs and inserts the batch inside one
//! transaction.
//!
//! ## Thread Safety
//!
//! `PostgresEventStore` is `Send + Sync` and cheap to clone. All operations use
//! the SQLx connection pool which handles thread-safe connection management.

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{instrument, Span};

use chronicle_core::{AggregateId, AggregateType, Event};

use super::query::{EventFilter, EventQueryResult, Pagination};
use super::r#trait::{
    check_stream_position, validate_batch, EventStore, EventStoreError, StreamBatch,
};
use super::sql::{
    map_schema_error, map_sqlx_error, rows_into_events, version_to_i64, EventRow, EVENT_COLUMNS,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id             BIGSERIAL PRIMARY KEY,
        aggregate_id   TEXT        NOT NULL,
        aggregate_type TEXT        NOT NULL,
        event_type     TEXT        NOT NULL,
        version        BIGINT      NOT NULL CHECK (version > 0),
        payload        BYTEA       NOT NULL,
        created_at     TIMESTAMPTZ NOT NULL,
        CONSTRAINT events_aggregate_version_key UNIQUE (aggregate_id, version)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS events_aggregate_type_idx ON events (aggregate_type, created_at, id)",
    "CREATE INDEX IF NOT EXISTS events_created_at_idx ON events (created_at, id)",
];

/// Postgres-backed append-only event store.
///
/// ## Optimistic Concurrency
///
/// The `save_events()` method uses a transaction to:
/// 1. Check that none of the batch's `(aggregate_id, version)` pairs exist
/// 2. Check the stream's aggregate type and that the batch leaves no gap
/// 3. Insert the events
///
/// If another transaction commits the same pair between steps 1 and 3, the
/// unique constraint makes the insert fail, which is reported as a concurrency
/// error as well.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Create a new PostgresEventStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool to `database_url`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, EventStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
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

    async fn fetch_events(
        &self,
        operation: &str,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
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

/// Fail with `Concurrency` if any version of the batch is already stored.
async fn check_versions_free(
    tx: &mut Transaction<'_, Postgres>,
    batch: &StreamBatch<'_>,
) -> Result<(), EventStoreError> {
    let taken: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT version
        FROM events
        WHERE aggregate_id = $1 AND version BETWEEN $2 AND $3
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

/// Returns `(current_version, aggregate_type)`; `(0, None)` for a new stream.
async fn check_stream_version(
    tx: &mut Transaction<'_, Postgres>,
    aggregate_id: &AggregateId,
) -> Result<(u64, Option<String>), EventStoreError> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(MAX(version), 0) AS current_version,
            MAX(aggregate_type) AS aggregate_type
        FROM events
        WHERE aggregate_id = $1
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
impl EventStore for PostgresEventStore {
    #[instrument(
        skip_all,
        fields(event_count = events.len(), aggregate_id, first_version),
        err
    )]
    async fn save_events(&self, events: &[Event]) -> Result<(), EventStoreError> {
        if events.is_empty() {
            return Ok(());
        }
        let batch = validate_batch(events)?;

        let span = Span::current();
        span.record("aggregate_id", batch.aggregate_id.as_str());
        span.record("first_version", batch.first_version);

        let mut tx = self
            .pool
            .begin()
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
                INSERT INTO events (
                    aggregate_id,
                    aggregate_type,
                    event_type,
                    version,
                    payload,
                    created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6)
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

    #[instrument(
        skip_all,
        fields(aggregate_id = %aggregate_id, aggregate_type = %aggregate_type),
        err
    )]
    async fn get_events(
        &self,
        aggregate_id: &AggregateId,
        aggregate_type: &AggregateType,
    ) -> Result<Vec<Event>, EventStoreError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE aggregate_id = $1 AND aggregate_type = $2 \
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
             WHERE aggregate_type = $1 \
             ORDER BY created_at ASC, id ASC"
        );
        let query = sqlx::query(&sql).bind(aggregate_type.as_str());
        self.fetch_events("get_events_by_type", query).await
    }

    async fn get_all_events(&self) -> Result<Vec<Event>, EventStoreError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY created_at ASC, id ASC");
        self.fetch_events("get_all_events", sqlx::query(&sql)).await
    }

    async fn query_events(
        &self,
        filter: EventFilter,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError> {
        // Optional filters collapse to TRUE when their parameter is NULL,
        // which keeps this a single parameterized statement.
        const WHERE: &str = r#"
            WHERE ($1::text IS NULL OR aggregate_id = $1)
              AND ($2::text IS NULL OR aggregate_type = $2)
              AND ($3::text IS NULL OR event_type = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at <= $5)
        "#;

        let aggregate_id = filter.aggregate_id.as_ref().map(AggregateId::as_str);
        let aggregate_type = filter.aggregate_type.as_ref().map(AggregateType::as_str);
        let event_type = filter.event_type.as_deref();

        let count_sql = format!("SELECT COUNT(*) FROM events {WHERE}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(aggregate_id)
            .bind(aggregate_type)
            .bind(event_type)
            .bind(filter.created_after)
            .bind(filter.created_before)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_events", e))?;

        let page_sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events {WHERE} \
             ORDER BY created_at ASC, id ASC \
             LIMIT $6 OFFSET $7"
        );
        let query = sqlx::query(&page_sql)
            .bind(aggregate_id)
            .bind(aggregate_type)
            .bind(event_type)
            .bind(filter.created_after)
            .bind(filter.created_before)
            .bind(i64::from(pagination.limit))
            .bind(i64::from(pagination.offset));
        let events = self.fetch_events("query_events", query).await?;

        let total = u64::try_from(total).unwrap_or(0);
        let has_more = total > u64::from(pagination.offset) + u64::from(pagination.limit);

        Ok(EventQueryResult {
            events,
            total,
            pagination,
            has_more,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for EventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
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
