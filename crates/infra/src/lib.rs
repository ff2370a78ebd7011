//! Infrastructure layer: event stores, aggregate repository and configuration.

pub mod config;
pub mod event_store;
pub mod registry;
pub mod repository;

mod integration_tests;

#[cfg(test)]
mod test_support;

pub use config::{StoreBackend, StoreConfig};
pub use event_store::{EventStore, EventStoreError, SharedEventStore};
pub use registry::{AggregateFactory, AggregateRegistry};
pub use repository::{Repository, RepositoryConfig, RepositoryError};
