//! Lenient, rule-based extraction of typed values from JSON properties.
//!
//! `Coercing` is a `serde::Deserializer` over a borrowed `serde_json::Value`.
//! It answers each typed request from the target (`deserialize_i32`,
//! `deserialize_string`, ...) by converting the stored value when a rule
//! allows it:
//!
//! | target   | accepted sources                                             |
//! |----------|--------------------------------------------------------------|
//! | integers | integer; float (truncated toward zero); numeric text; bool   |
//! | floats   | any number; numeric text; bool                               |
//! | string   | string; number or bool rendered as text                      |
//! | bool     | bool; number (non-zero is true); "true"/"false"/"1"/"0"      |
//! | option   | `null` is `None`, anything else coerces the inner type       |
//!
//! Sequences, maps and structs are walked recursively; map keys get the same
//! scalar rules applied to their text. Enums are decoded by `serde_json`
//! as-is. Every failure surfaces as one `CoercionError`.

use std::borrow::Cow;
use std::fmt;

use serde::de::value::BorrowedStrDeserializer;
use serde::de::{self, DeserializeOwned, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use serde::{forward_to_deserialize_any, Deserializer};
use serde_json::{Map, Number, Value as JsonValue};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CoercionError(String);

impl de::Error for CoercionError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        CoercionError(msg.to_string())
    }
}

/// Coerce `value` into `T`.
pub fn coerce<T: DeserializeOwned>(value: &JsonValue) -> Result<T, CoercionError> {
    T::deserialize(Coercing(value))
}

/// Deserializer applying the coercion rules to one borrowed value.
#[derive(Debug, Clone, Copy)]
pub struct Coercing<'de>(pub &'de JsonValue);

impl Coercing<'_> {
    fn scalar(&self) -> Cow<'_, JsonValue> {
        Cow::Borrowed(self.0)
    }
}

fn describe(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "null".to_string(),
        JsonValue::Bool(b) => format!("bool {b}"),
        JsonValue::Number(n) => format!("number {n}"),
        JsonValue::String(s) => format!("string {s:?}"),
        JsonValue::Array(_) => "array".to_string(),
        JsonValue::Object(_) => "object".to_string(),
    }
}

fn unsupported(value: &JsonValue, target: &str) -> CoercionError {
    CoercionError(format!("cannot coerce {} to {target}", describe(value)))
}

fn truncate_to_i64(f: f64) -> Result<i64, CoercionError> {
    if !f.is_finite() {
        return Err(CoercionError(format!("{f} is not a finite number")));
    }
    let t = f.trunc();
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    if t < i64::MIN as f64 || t >= 9_223_372_036_854_775_808.0 {
        return Err(CoercionError(format!("{f} is out of range for a signed integer")));
    }
    Ok(t as i64)
}

fn truncate_to_u64(f: f64) -> Result<u64, CoercionError> {
    if !f.is_finite() {
        return Err(CoercionError(format!("{f} is not a finite number")));
    }
    let t = f.trunc();
    if t < 0.0 {
        return Err(CoercionError(format!("{f} is negative")));
    }
    if t >= 18_446_744_073_709_551_616.0 {
        return Err(CoercionError(format!("{f} is out of range for an unsigned integer")));
    }
    Ok(t as u64)
}

fn number_to_i64(n: &Number) -> Result<i64, CoercionError> {
    if let Some(i) = n.as_i64() {
        return Ok(i);
    }
    if n.is_u64() {
        return Err(CoercionError(format!("{n} is out of range for a signed integer")));
    }
    match n.as_f64() {
        Some(f) => truncate_to_i64(f),
        None => Err(CoercionError(format!("{n} is not representable"))),
    }
}

fn number_to_u64(n: &Number) -> Result<u64, CoercionError> {
    if let Some(u) = n.as_u64() {
        return Ok(u);
    }
    if n.is_i64() {
        return Err(CoercionError(format!("{n} is negative")));
    }
    match n.as_f64() {
        Some(f) => truncate_to_u64(f),
        None => Err(CoercionError(format!("{n} is not representable"))),
    }
}

fn signed(value: &JsonValue) -> Result<i64, CoercionError> {
    match value {
        JsonValue::Number(n) => number_to_i64(n),
        JsonValue::Bool(b) => Ok(i64::from(*b)),
        JsonValue::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(i);
            }
            match s.parse::<f64>() {
                Ok(f) => truncate_to_i64(f),
                Err(_) => Err(unsupported(value, "an integer")),
            }
        }
        _ => Err(unsupported(value, "an integer")),
    }
}

fn unsigned(value: &JsonValue) -> Result<u64, CoercionError> {
    match value {
        JsonValue::Number(n) => number_to_u64(n),
        JsonValue::Bool(b) => Ok(u64::from(*b)),
        JsonValue::String(s) => {
            let s = s.trim();
            if let Ok(u) = s.parse::<u64>() {
                return Ok(u);
            }
            match s.parse::<f64>() {
                Ok(f) => truncate_to_u64(f),
                Err(_) => Err(unsupported(value, "an unsigned integer")),
            }
        }
        _ => Err(unsupported(value, "an unsigned integer")),
    }
}

fn float(value: &JsonValue) -> Result<f64, CoercionError> {
    match value {
        JsonValue::Number(n) => n
            .as_f64()
            .ok_or_else(|| CoercionError(format!("{n} is not representable as a float"))),
        JsonValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        JsonValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| unsupported(value, "a float")),
        _ => Err(unsupported(value, "a float")),
    }
}

fn float32(value: &JsonValue) -> Result<f32, CoercionError> {
    let f = float(value)?;
    let narrowed = f as f32;
    if f.is_finite() && !narrowed.is_finite() {
        return Err(CoercionError(format!("{f} is out of range for f32")));
    }
    Ok(narrowed)
}

fn boolean(value: &JsonValue) -> Result<bool, CoercionError> {
    match value {
        JsonValue::Bool(b) => Ok(*b),
        JsonValue::Number(n) => Ok(n.as_f64().is_some_and(|f| f != 0.0)),
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(unsupported(value, "a bool")),
        },
        _ => Err(unsupported(value, "a bool")),
    }
}

fn narrow<T, U>(wide: U, target: &str) -> Result<T, CoercionError>
where
    T: TryFrom<U>,
    U: fmt::Display + Copy,
{
    T::try_from(wide).map_err(|_| CoercionError(format!("{wide} is out of range for {target}")))
}

macro_rules! coerce_signed {
    ($($method:ident => $visit:ident : $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
                let wide = signed(&self.scalar())?;
                visitor.$visit(narrow::<$ty, i64>(wide, stringify!($ty))?)
            }
        )*
    };
}

macro_rules! coerce_unsigned {
    ($($method:ident => $visit:ident : $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
                let wide = unsigned(&self.scalar())?;
                visitor.$visit(narrow::<$ty, u64>(wide, stringify!($ty))?)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for Coercing<'de> {
    type Error = CoercionError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            JsonValue::Null => visitor.visit_unit(),
            JsonValue::Bool(b) => visitor.visit_bool(*b),
            JsonValue::Number(n) => {
                if let Some(u) = n.as_u64() {
                    visitor.visit_u64(u)
                } else if let Some(i) = n.as_i64() {
                    visitor.visit_i64(i)
                } else {
                    visitor.visit_f64(float(self.0)?)
                }
            }
            JsonValue::String(s) => visitor.visit_borrowed_str(s),
            JsonValue::Array(items) => visitor.visit_seq(Elements(items.iter())),
            JsonValue::Object(map) => visitor.visit_map(Entries::new(map)),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_bool(boolean(self.0)?)
    }

    coerce_signed! {
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_i128 => visit_i128: i128,
    }

    coerce_unsigned! {
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_u128 => visit_u128: u128,
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_f32(float32(self.0)?)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_f64(float(self.0)?)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        if let JsonValue::String(s) = self.0 {
            let mut chars = s.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                return visitor.visit_char(c);
            }
        }
        Err(unsupported(self.0, "a single character"))
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            JsonValue::String(s) => visitor.visit_borrowed_str(s),
            JsonValue::Number(n) => visitor.visit_string(n.to_string()),
            JsonValue::Bool(b) => visitor.visit_string(b.to_string()),
            other => Err(unsupported(other, "a string")),
        }
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            JsonValue::String(s) => visitor.visit_borrowed_bytes(s.as_bytes()),
            JsonValue::Array(items) => visitor.visit_seq(Elements(items.iter())),
            other => Err(unsupported(other, "bytes")),
        }
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            JsonValue::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            JsonValue::Null => visitor.visit_unit(),
            other => Err(unsupported(other, "unit")),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            JsonValue::Array(items) => visitor.visit_seq(Elements(items.iter())),
            other => Err(unsupported(other, "a sequence")),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            JsonValue::Object(map) => visitor.visit_map(Entries::new(map)),
            other => Err(unsupported(other, "a map")),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self.0 {
            JsonValue::Object(map) => visitor.visit_map(Entries::new(map)),
            JsonValue::Array(items) => visitor.visit_seq(Elements(items.iter())),
            other => Err(unsupported(other, name)),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.0
            .deserialize_enum(name, variants, visitor)
            .map_err(|e| CoercionError(e.to_string()))
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }
}

struct Elements<'de>(std::slice::Iter<'de, JsonValue>);

impl<'de> SeqAccess<'de> for Elements<'de> {
    type Error = CoercionError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error> {
        self.0
            .next()
            .map(|item| seed.deserialize(Coercing(item)))
            .transpose()
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.0.len())
    }
}

struct Entries<'de> {
    iter: serde_json::map::Iter<'de>,
    value: Option<&'de JsonValue>,
}

impl<'de> Entries<'de> {
    fn new(map: &'de Map<String, JsonValue>) -> Self {
        Self {
            iter: map.iter(),
            value: None,
        }
    }
}

impl<'de> MapAccess<'de> for Entries<'de> {
    type Error = CoercionError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Self::Error> {
        match self.iter.next() {
            Some((key, value)) => {
                self.value = Some(value);
                seed.deserialize(MapKey(key.as_str())).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, Self::Error> {
        match self.value.take() {
            Some(value) => seed.deserialize(Coercing(value)),
            None => Err(CoercionError("map value requested before its key".to_string())),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

/// Object keys are always text; typed key requests parse that text.
struct MapKey<'de>(&'de str);

impl MapKey<'_> {
    fn scalar(&self) -> Cow<'_, JsonValue> {
        Cow::Owned(JsonValue::String(self.0.to_owned()))
    }
}

impl<'de> Deserializer<'de> for MapKey<'de> {
    type Error = CoercionError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_borrowed_str(self.0)
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_bool(boolean(&self.scalar())?)
    }

    coerce_signed! {
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_i128 => visit_i128: i128,
    }

    coerce_unsigned! {
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_u128 => visit_u128: u128,
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_f32(float32(&self.scalar())?)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_f64(float(&self.scalar())?)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        BorrowedStrDeserializer::<CoercionError>::new(self.0)
            .deserialize_enum(name, variants, visitor)
    }

    forward_to_deserialize_any! {
        char str string bytes byte_buf unit unit_struct seq tuple
        tuple_struct map struct identifier ignored_any
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn floats_truncate_toward_zero() {
        assert_eq!(coerce::<i64>(&json!(3.9)).unwrap(), 3);
        assert_eq!(coerce::<i32>(&json!(-2.7)).unwrap(), -2);
        assert_eq!(coerce::<u8>(&json!(255.99)).unwrap(), 255);
    }

    #[test]
    fn integers_from_text_and_bools() {
        assert_eq!(coerce::<i64>(&json!("42")).unwrap(), 42);
        assert_eq!(coerce::<i64>(&json!(" 7.8 ")).unwrap(), 7);
        assert_eq!(coerce::<u16>(&json!(true)).unwrap(), 1);
        assert_eq!(coerce::<i8>(&json!(false)).unwrap(), 0);
    }

    #[test]
    fn unrepresentable_integers_fail() {
        assert!(coerce::<u32>(&json!(-1)).is_err());
        assert!(coerce::<u8>(&json!(256)).is_err());
        assert!(coerce::<i64>(&json!(u64::MAX)).is_err());
        assert!(coerce::<i64>(&json!(1e300)).is_err());
        assert!(coerce::<i64>(&json!("abc")).is_err());
        assert!(coerce::<i64>(&json!([1])).is_err());
        assert!(coerce::<i64>(&json!(null)).is_err());
    }

    #[test]
    fn floats_from_integers_text_and_bools() {
        assert_eq!(coerce::<f64>(&json!(3)).unwrap(), 3.0);
        assert_eq!(coerce::<f64>(&json!("2.5")).unwrap(), 2.5);
        assert_eq!(coerce::<f32>(&json!(true)).unwrap(), 1.0);
        assert!(coerce::<f32>(&json!(1e300)).is_err());
    }

    #[test]
    fn strings_render_scalars() {
        assert_eq!(coerce::<String>(&json!("plain")).unwrap(), "plain");
        assert_eq!(coerce::<String>(&json!(5)).unwrap(), "5");
        assert_eq!(coerce::<String>(&json!(1.5)).unwrap(), "1.5");
        assert_eq!(coerce::<String>(&json!(true)).unwrap(), "true");
        assert!(coerce::<String>(&json!({"a": 1})).is_err());
    }

    #[test]
    fn bools_from_numbers_and_text() {
        assert!(coerce::<bool>(&json!(2)).unwrap());
        assert!(!coerce::<bool>(&json!(0.0)).unwrap());
        assert!(coerce::<bool>(&json!("TRUE")).unwrap());
        assert!(!coerce::<bool>(&json!("0")).unwrap());
        assert!(coerce::<bool>(&json!("yes")).is_err());
    }

    #[test]
    fn null_is_none_and_values_are_some() {
        assert_eq!(coerce::<Option<i32>>(&json!(null)).unwrap(), None);
        assert_eq!(coerce::<Option<i32>>(&json!("12")).unwrap(), Some(12));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Line {
        sku: String,
        qty: u32,
        #[serde(default)]
        note: Option<String>,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Order {
        id: String,
        total: f64,
        lines: Vec<Line>,
        flags: BTreeMap<String, bool>,
    }

    #[test]
    fn nested_shapes_apply_rules_recursively() {
        let value = json!({
            "id": 1001,
            "total": "19.5",
            "lines": [{"sku": 7, "qty": 2.9}, {"sku": "b", "qty": "3", "note": null}],
            "flags": {"paid": 1, "shipped": "false"},
            "ignored": {"deep": [1, 2, 3]}
        });
        let order: Order = coerce(&value).unwrap();
        assert_eq!(
            order,
            Order {
                id: "1001".into(),
                total: 19.5,
                lines: vec![
                    Line { sku: "7".into(), qty: 2, note: None },
                    Line { sku: "b".into(), qty: 3, note: None },
                ],
                flags: BTreeMap::from([("paid".into(), true), ("shipped".into(), false)]),
            }
        );
    }

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "snake_case")]
    enum Status {
        Draft,
        Archived { reason: String },
    }

    #[test]
    fn enums_decode_structurally() {
        assert_eq!(coerce::<Status>(&json!("draft")).unwrap(), Status::Draft);
        assert_eq!(
            coerce::<Status>(&json!({"archived": {"reason": "old"}})).unwrap(),
            Status::Archived { reason: "old".into() }
        );
        // Structured decoding does not coerce: a number is not a variant.
        let err = coerce::<Status>(&json!(3)).unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn map_keys_follow_the_scalar_rules() {
        let by_id: HashMap<u32, String> = coerce(&json!({"1": "a", "2": "b"})).unwrap();
        assert_eq!(by_id, HashMap::from([(1, "a".to_string()), (2, "b".to_string())]));

        let signed: BTreeMap<i64, f64> = coerce(&json!({"-3": "1.5", " 4.9 ": 2})).unwrap();
        assert_eq!(signed, BTreeMap::from([(-3, 1.5), (4, 2.0)]));

        let switches: BTreeMap<bool, u8> = coerce(&json!({"true": 1, "0": "2"})).unwrap();
        assert_eq!(switches, BTreeMap::from([(true, 1), (false, 2)]));

        assert!(coerce::<HashMap<u32, String>>(&json!({"one": "a"})).is_err());
        assert!(coerce::<HashMap<u8, String>>(&json!({"300": "a"})).is_err());
    }

    #[derive(Debug, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
    #[serde(rename_all = "snake_case")]
    enum Slot {
        Morning,
        Evening,
    }

    #[test]
    fn enum_keys_decode_by_variant_name() {
        let slots: BTreeMap<Slot, u32> = coerce(&json!({"morning": "2", "evening": 3})).unwrap();
        assert_eq!(slots, BTreeMap::from([(Slot::Morning, 2), (Slot::Evening, 3)]));
    }

    proptest! {
        #[test]
        fn float_to_int_matches_trunc(f in -1.0e15f64..1.0e15f64) {
            prop_assert_eq!(coerce::<i64>(&json!(f)).unwrap(), f.trunc() as i64);
        }

        #[test]
        fn integer_text_round_trips(i in any::<i64>()) {
            prop_assert_eq!(coerce::<i64>(&json!(i.to_string())).unwrap(), i);
        }
    }
}
