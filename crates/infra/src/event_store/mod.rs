//! Append-only event store boundary.
//!
//! This module defines the storage abstraction for aggregate event streams and
//! its backends: in-memory (tests/dev), PostgreSQL and SQLite.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod sqlite;
mod sql;
pub mod r#trait;

use std::sync::Arc;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use query::{EventFilter, EventQueryResult, Pagination};
pub use sqlite::SqliteEventStore;
pub use r#trait::{EventStore, EventStoreError};

/// Type-erased store handle, as produced by configuration.
pub type SharedEventStore = Arc<dyn EventStore>;
