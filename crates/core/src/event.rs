use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::codec::{Codec, JsonCodec};
use crate::error::DomainResult;
use crate::id::{AggregateId, AggregateType};

/// One immutable fact about one aggregate.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** per aggregate (1, 2, 3, ... with no gaps)
/// - designed to be **append-only**
///
/// `version` is the only ordering key for replay. `created_at` is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    aggregate_id: AggregateId,
    aggregate_type: AggregateType,
    event_type: String,
    version: u64,
    payload: Vec<u8>,
    created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(
        aggregate_id: AggregateId,
        aggregate_type: AggregateType,
        event_type: impl Into<String>,
        version: u64,
        payload: Vec<u8>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            aggregate_id,
            aggregate_type,
            event_type: event_type.into(),
            version,
            payload,
            created_at,
        }
    }

    pub fn aggregate_id(&self) -> &AggregateId {
        &self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &AggregateType {
        &self.aggregate_type
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Decode the payload with the default JSON codec.
    pub fn decode_payload(&self) -> DomainResult<JsonValue> {
        JsonCodec.decode(&self.payload)
    }
}
