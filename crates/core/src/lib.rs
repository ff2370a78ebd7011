//! `chronicle-core` — event-sourcing building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identities, immutable events, the aggregate base and the payload codec.

pub mod aggregate;
pub mod codec;
pub mod error;
pub mod event;
pub mod id;

pub use aggregate::{Aggregate, AggregateBase, PropertyMap, StateAccessor};
pub use codec::{Codec, JsonCodec};
pub use error::{DomainError, DomainResult};
pub use event::Event;
pub use id::{AggregateId, AggregateType};
