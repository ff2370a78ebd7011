use thiserror::Error;

use chronicle_core::{AggregateId, DomainError};
use chronicle_infra::RepositoryError;

/// Errors raised by `Chronicle` operations.
///
/// Lifecycle variants are caller mistakes and are detected in memory before
/// any event is recorded. Storage failures arrive wrapped in `Repository`.
#[derive(Debug, Error)]
pub enum ChronicleError {
    #[error("chronicle {id} already exists")]
    AlreadyExists { id: AggregateId },

    #[error("cannot record changes on unsaved chronicle {id}")]
    NotCreated { id: AggregateId },

    #[error("chronicle {id} is already deleted")]
    AlreadyDeleted { id: AggregateId },

    /// `Created` and `Deleted` are only recorded by their dedicated operations.
    #[error("event type '{0}' is reserved")]
    ReservedEventType(String),

    #[error("no property named '{0}'")]
    MissingKey(String),

    #[error("cannot coerce property '{key}' into {target}: {reason}")]
    Coercion {
        key: String,
        target: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ChronicleError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Repository(e) if e.is_not_found())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Repository(e) if e.is_conflict())
    }

    /// The save may have been stored; `reload` before recording more changes.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Repository(e) if e.is_indeterminate())
    }

    pub fn is_coercion(&self) -> bool {
        matches!(self, Self::Coercion { .. })
    }
}
