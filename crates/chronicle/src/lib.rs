//! `chronicle` — a schemaless, event-sourced entity.
//!
//! Build a [`Chronicle`], record changes with `track_*`, persist it with
//! [`Chronicle::save`] through a [`Repository`](chronicle_infra::Repository),
//! and rebuild it later with [`Chronicle::load`] or [`Chronicle::reload`].
//! Typed reads go through [`Chronicle::state`] / [`Chronicle::state_all`],
//! which coerce the stored JSON into the requested type.

pub mod chronicle;
pub mod coerce;
pub mod error;

pub use chronicle::{register_chronicle_type, Chronicle, CREATED, DELETED};
pub use coerce::{coerce, CoercionError};
pub use error::ChronicleError;
