//! Aggregate base: identity, version and not-yet-persisted events.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};

use crate::error::DomainResult;
use crate::event::Event;
use crate::id::{AggregateId, AggregateType};

/// Dynamically typed domain state, keyed by property name.
pub type PropertyMap = Map<String, JsonValue>;

/// Shared bookkeeping embedded by every event-sourced aggregate.
///
/// Invariant: `version` equals the highest version among all events ever
/// applied to this instance, historical or pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateBase {
    id: AggregateId,
    aggregate_type: AggregateType,
    version: u64,
    pending: Vec<Event>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AggregateBase {
    /// A fresh instance at version 0 with no events.
    pub fn new(id: AggregateId, aggregate_type: AggregateType) -> Self {
        let now = Utc::now();
        Self {
            id,
            aggregate_type,
            version: 0,
            pending: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &AggregateId {
        &self.id
    }

    pub fn aggregate_type(&self) -> &AggregateType {
        &self.aggregate_type
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Record a new event at `version + 1` and keep it pending.
    ///
    /// Purely in-memory; never fails. Callers that want the event reflected
    /// in domain state must also `apply` it.
    pub fn add_event(&mut self, event_type: impl Into<String>, payload: Vec<u8>) -> Event {
        let now = Utc::now();
        self.version += 1;

        let event = Event::new(
            self.id.clone(),
            self.aggregate_type.clone(),
            event_type,
            self.version,
            payload,
            now,
        );
        if self.version == 1 {
            self.created_at = now;
        }
        self.updated_at = now;
        self.pending.push(event.clone());
        event
    }

    /// Version tracking for applied events.
    ///
    /// New events were already counted by `add_event`; historical events
    /// advance the version and timestamps only when they are ahead of it.
    pub fn apply(&mut self, event: &Event, is_new: bool) {
        if is_new || event.version() <= self.version {
            return;
        }
        self.version = event.version();
        if event.version() == 1 {
            self.created_at = event.created_at();
        }
        self.updated_at = event.created_at();
    }

    pub fn uncommitted_events(&self) -> &[Event] {
        &self.pending
    }

    pub fn clear_uncommitted_events(&mut self) {
        self.pending.clear();
    }

    /// Overwrite identity-independent bookkeeping from a replayed instance.
    pub fn replace_from(&mut self, other: &AggregateBase) {
        self.version = other.version;
        self.created_at = other.created_at;
        self.updated_at = other.updated_at;
        self.pending.clear();
    }
}

/// Event-sourced aggregate (object-safe so repositories can hold any kind).
///
/// Implementors embed an `AggregateBase` and extend `apply` to evolve their
/// domain state. `apply` must stay deterministic: the same history always
/// yields the same state.
pub trait Aggregate: Send + Sync {
    fn base(&self) -> &AggregateBase;

    fn base_mut(&mut self) -> &mut AggregateBase;

    /// Evolve in-memory state from a single event.
    ///
    /// `is_new` is true for events just recorded via `add_event`, false for
    /// history being replayed from the store.
    fn apply(&mut self, event: &Event, is_new: bool) -> DomainResult<()>;

    fn id(&self) -> &AggregateId {
        self.base().id()
    }

    fn aggregate_type(&self) -> &AggregateType {
        self.base().aggregate_type()
    }

    fn version(&self) -> u64 {
        self.base().version()
    }

    fn uncommitted_events(&self) -> &[Event] {
        self.base().uncommitted_events()
    }

    fn clear_uncommitted_events(&mut self) {
        self.base_mut().clear_uncommitted_events();
    }
}

/// Read access to projected state, required for anything a repository loads.
pub trait StateAccessor: Aggregate {
    fn properties(&self) -> &PropertyMap;

    fn is_deleted(&self) -> bool;

    fn created_at(&self) -> DateTime<Utc> {
        self.base().created_at()
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.base().updated_at()
    }
}

impl Aggregate for AggregateBase {
    fn base(&self) -> &AggregateBase {
        self
    }

    fn base_mut(&mut self) -> &mut AggregateBase {
        self
    }

    fn apply(&mut self, event: &Event, is_new: bool) -> DomainResult<()> {
        AggregateBase::apply(self, event, is_new);
        Ok(())
    }
}
