//! Encode/decode boundary between domain data and stored payload bytes.
//!
//! Storage never needs compile-time knowledge of domain schemas: it only sees
//! the bytes a `Codec` produced.

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::{DomainError, DomainResult};

/// Turns dynamically typed domain values into opaque bytes and back.
pub trait Codec: Send + Sync {
    fn encode(&self, value: &JsonValue) -> DomainResult<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> DomainResult<JsonValue>;
}

/// UTF-8 JSON payloads.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &JsonValue) -> DomainResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| DomainError::codec(format!("encode failed: {e}")))
    }

    fn decode(&self, bytes: &[u8]) -> DomainResult<JsonValue> {
        if bytes.is_empty() {
            return Ok(JsonValue::Null);
        }
        serde_json::from_slice(bytes).map_err(|e| DomainError::codec(format!("decode failed: {e}")))
    }
}

/// Serialize any value into the dynamic representation codecs work on.
pub fn to_json_value<T: Serialize + ?Sized>(value: &T) -> DomainResult<JsonValue> {
    serde_json::to_value(value)
        .map_err(|e| DomainError::codec(format!("serialization failed: {e}")))
}
