//! Schemaless event-sourced aggregate.
//!
//! A `Chronicle` keeps its domain state as a JSON property map instead of a
//! hand-written struct. Three event kinds drive it:
//!
//! - `Created`: replaces the map with the initial payload
//! - `Deleted`: sets the deletion flag and merges `{"reason": ..}`
//! - anything else: shallow-merges its payload into the map
//!
//! ## Lifecycle
//!
//! ```text
//! NotCreated (v0) ──track_create──► Active (v1) ──track_change*──► Active (vN)
//!                                                  │
//!                                                  └──track_delete──► Deleted (vN+1)
//! ```
//!
//! Every transition records and applies its event in memory immediately; only
//! `save` makes it durable.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};

use chronicle_core::{
    Aggregate, AggregateBase, AggregateId, AggregateType, Codec, DomainError, DomainResult,
    Event, JsonCodec, PropertyMap, StateAccessor, codec::to_json_value,
};
use chronicle_infra::{EventStore, Repository};

use crate::coerce::coerce;
use crate::error::ChronicleError;

pub const CREATED: &str = "Created";
pub const DELETED: &str = "Deleted";

#[derive(Debug, Clone, PartialEq)]
pub struct Chronicle {
    base: AggregateBase,
    properties: PropertyMap,
    deleted: bool,
}

impl Chronicle {
    /// A fresh, not yet created instance with a generated id.
    pub fn new(aggregate_type: AggregateType) -> Self {
        Self::with_id(AggregateId::new(), aggregate_type)
    }

    pub fn with_id(id: AggregateId, aggregate_type: AggregateType) -> Self {
        Self {
            base: AggregateBase::new(id, aggregate_type),
            properties: PropertyMap::new(),
            deleted: false,
        }
    }

    /// Owned snapshot of any loaded instance's projected state.
    pub fn from_state(state: &dyn StateAccessor) -> Self {
        let mut base = AggregateBase::new(state.id().clone(), state.aggregate_type().clone());
        base.replace_from(state.base());
        Self {
            base,
            properties: state.properties().clone(),
            deleted: state.is_deleted(),
        }
    }

    /// Load through `repo` by identity.
    pub async fn load<S: EventStore>(
        repo: &Repository<S>,
        id: &AggregateId,
        aggregate_type: &AggregateType,
    ) -> Result<Self, ChronicleError> {
        let loaded = repo.load(id, aggregate_type).await?;
        Ok(Self::from_state(loaded.as_ref()))
    }

    pub fn id(&self) -> &AggregateId {
        self.base.id()
    }

    pub fn aggregate_type(&self) -> &AggregateType {
        self.base.aggregate_type()
    }

    pub fn version(&self) -> u64 {
        self.base.version()
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn has_pending_events(&self) -> bool {
        !self.base.uncommitted_events().is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.base.created_at()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.base.updated_at()
    }

    /// Record the `Created` event. Must be the first mutation.
    pub fn track_create<T: Serialize + ?Sized>(
        &mut self,
        initial: &T,
    ) -> Result<(), ChronicleError> {
        if self.version() != 0 {
            return Err(ChronicleError::AlreadyExists { id: self.id().clone() });
        }
        let payload = object_payload(initial)?;
        self.record(CREATED, payload)
    }

    /// Record a domain event whose payload is merged into the properties.
    pub fn track_change<T: Serialize + ?Sized>(
        &mut self,
        event_type: &str,
        data: &T,
    ) -> Result<(), ChronicleError> {
        if event_type == CREATED || event_type == DELETED {
            return Err(ChronicleError::ReservedEventType(event_type.to_string()));
        }
        if event_type.trim().is_empty() {
            return Err(DomainError::validation("event type must not be empty").into());
        }
        if self.version() == 0 {
            return Err(ChronicleError::NotCreated { id: self.id().clone() });
        }
        let payload = object_payload(data)?;
        self.record(event_type, payload)
    }

    /// Logically delete. The stream stays loadable afterwards.
    pub fn track_delete(&mut self, reason: &str) -> Result<(), ChronicleError> {
        if self.version() == 0 {
            return Err(ChronicleError::NotCreated { id: self.id().clone() });
        }
        if self.deleted {
            return Err(ChronicleError::AlreadyDeleted { id: self.id().clone() });
        }
        let mut payload = PropertyMap::new();
        payload.insert("reason".to_string(), json!(reason));
        self.record(DELETED, payload)
    }

    fn record(&mut self, event_type: &str, payload: PropertyMap) -> Result<(), ChronicleError> {
        let bytes = JsonCodec.encode(&JsonValue::Object(payload))?;
        let event = self.base.add_event(event_type, bytes);
        self.apply(&event, true)?;
        Ok(())
    }

    /// Extract one property as `T`.
    pub fn state<T: DeserializeOwned>(&self, key: &str) -> Result<T, ChronicleError> {
        let value = self
            .properties
            .get(key)
            .ok_or_else(|| ChronicleError::MissingKey(key.to_string()))?;
        coerce(value).map_err(|e| ChronicleError::Coercion {
            key: key.to_string(),
            target: std::any::type_name::<T>(),
            reason: e.to_string(),
        })
    }

    /// Extract the whole property map as `T` (typically a struct).
    pub fn state_all<T: DeserializeOwned>(&self) -> Result<T, ChronicleError> {
        let all = JsonValue::Object(self.properties.clone());
        coerce(&all).map_err(|e| ChronicleError::Coercion {
            key: "*".to_string(),
            target: std::any::type_name::<T>(),
            reason: e.to_string(),
        })
    }

    /// Persist pending events. On failure they stay pending.
    ///
    /// When the error `is_indeterminate` the events may already be stored:
    /// `reload` before recording anything else.
    pub async fn save<S: EventStore>(
        &mut self,
        repo: &Repository<S>,
    ) -> Result<(), ChronicleError> {
        repo.save(self).await?;
        Ok(())
    }

    /// Discard local edits and replace state with the stored history's replay.
    pub async fn reload<S: EventStore>(
        &mut self,
        repo: &Repository<S>,
    ) -> Result<(), ChronicleError> {
        let fresh = Self::load(repo, self.id(), self.aggregate_type()).await?;
        if self.has_pending_events() {
            tracing::debug!(
                aggregate_id = %self.id(),
                discarded = self.base.uncommitted_events().len(),
                "reload discarded unsaved events"
            );
        }
        *self = fresh;
        Ok(())
    }
}

/// Serialize `value` and require a JSON object.
fn object_payload<T: Serialize + ?Sized>(value: &T) -> Result<PropertyMap, ChronicleError> {
    match to_json_value(value)? {
        JsonValue::Object(map) => Ok(map),
        other => Err(DomainError::validation(format!(
            "event payload must be a JSON object, got {}",
            kind(&other)
        ))
        .into()),
    }
}

fn kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a bool",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Register the `Chronicle` factory for `aggregate_type` on `repo`.
pub fn register_chronicle_type<S>(
    repo: &mut Repository<S>,
    aggregate_type: AggregateType,
) -> Result<(), ChronicleError> {
    let ty = aggregate_type.clone();
    repo.register_aggregate(aggregate_type, move |id| {
        Box::new(Chronicle::with_id(id, ty.clone()))
    })?;
    Ok(())
}

impl Aggregate for Chronicle {
    fn base(&self) -> &AggregateBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AggregateBase {
        &mut self.base
    }

    fn apply(&mut self, event: &Event, is_new: bool) -> DomainResult<()> {
        // Decode first so a bad payload leaves the instance untouched.
        let payload = match event.decode_payload()? {
            JsonValue::Object(map) => map,
            JsonValue::Null => PropertyMap::new(),
            other => {
                return Err(DomainError::codec(format!(
                    "payload of {} v{} is {}, expected an object",
                    event.event_type(),
                    event.version(),
                    kind(&other)
                )));
            }
        };

        self.base.apply(event, is_new);
        match event.event_type() {
            CREATED => self.properties = payload,
            DELETED => {
                self.deleted = true;
                self.properties.extend(payload);
            }
            _ => self.properties.extend(payload),
        }
        Ok(())
    }
}

impl StateAccessor for Chronicle {
    fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}
