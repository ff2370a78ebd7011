//! Minimal state-carrying aggregate shared by the infra unit tests.

use serde_json::Value as JsonValue;

use chronicle_core::{
    Aggregate, AggregateBase, AggregateId, AggregateType, Codec, DomainResult, Event, JsonCodec,
    PropertyMap, StateAccessor,
};

pub(crate) fn counter_type() -> AggregateType {
    AggregateType::parse("counter").unwrap()
}

/// Every `Recorded` event merges its object payload into `properties`.
#[derive(Debug, Clone)]
pub(crate) struct Counter {
    base: AggregateBase,
    properties: PropertyMap,
}

impl Counter {
    pub(crate) fn new(id: AggregateId) -> Self {
        Self {
            base: AggregateBase::new(id, counter_type()),
            properties: PropertyMap::new(),
        }
    }

    /// Copy of a loaded instance, ready to record further events.
    pub(crate) fn from_state(loaded: &dyn StateAccessor) -> Self {
        let mut counter = Self::new(loaded.id().clone());
        counter.base.replace_from(loaded.base());
        counter.properties = loaded.properties().clone();
        counter
    }

    pub(crate) fn record(&mut self, payload: JsonValue) -> Event {
        let bytes = JsonCodec.encode(&payload).unwrap();
        let event = self.base.add_event("Recorded", bytes);
        self.apply(&event, true).unwrap();
        event
    }
}

impl Aggregate for Counter {
    fn base(&self) -> &AggregateBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AggregateBase {
        &mut self.base
    }

    fn apply(&mut self, event: &Event, is_new: bool) -> DomainResult<()> {
        self.base.apply(event, is_new);
        if let JsonValue::Object(fields) = event.decode_payload()? {
            self.properties.extend(fields);
        }
        Ok(())
    }
}

impl StateAccessor for Counter {
    fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    fn is_deleted(&self) -> bool {
        false
    }
}
