// SPDX-License-Identifier: MIT OR Apache-2.0

//! Strict JSON parsing that rejects duplicate object keys.
//!
//! `serde_json::Value`'s default map (a `BTreeMap`) silently keeps the last
//! of any duplicate key during normal parsing. Canonical JSON requires
//! duplicate keys to be a hard parse error, so this module re-implements
//! just enough of `Value` deserialization to catch that case before it is
//! thrown away.

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Number, Value};
use spine_error::{ErrorCode, SpineError};
use std::fmt;

/// Parse `bytes` as JSON, erroring if any object contains a duplicate key.
///
/// # Errors
///
/// Returns [`SpineError`] with [`ErrorCode::InputInvalid`] on malformed JSON
/// or a duplicate object key.
pub fn parse_strict(bytes: &[u8]) -> Result<Value, SpineError> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    let value = de
        .deserialize_any(StrictValueVisitor)
        .map_err(|e| SpineError::new(ErrorCode::InputInvalid, format!("parse failed: {e}")))?;
    de.end()
        .map_err(|e| SpineError::new(ErrorCode::InputInvalid, format!("trailing data: {e}")))?;
    Ok(value)
}

struct StrictValueVisitor;

impl<'de> Visitor<'de> for StrictValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value with no duplicate object keys")
    }

    fn visit_bool<E>(self, v: bool) -> Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Bool(v))
    }
    fn visit_i64<E>(self, v: i64) -> Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Number(v.into()))
    }
    fn visit_u64<E>(self, v: u64) -> Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Number(v.into()))
    }
    fn visit_f64<E>(self, v: f64) -> Result<Value, E>
    where
        E: de::Error,
    {
        Number::from_f64(v)
            .map(Value::Number)
            .ok_or_else(|| E::custom("non-finite number"))
    }
    fn visit_str<E>(self, v: &str) -> Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::String(v.to_owned()))
    }
    fn visit_string<E>(self, v: String) -> Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::String(v))
    }
    fn visit_none<E>(self) -> Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Null)
    }
    fn visit_unit<E>(self) -> Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut out = Vec::new();
        while let Some(v) = seq.next_element_seed(StrictValueSeed)? {
            out.push(v);
        }
        Ok(Value::Array(out))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut out = Map::new();
        while let Some((k, v)) = map.next_entry_seed(KeySeed, StrictValueSeed)? {
            if out.contains_key(&k) {
                return Err(de::Error::custom(format!("duplicate object key: {k}")));
            }
            out.insert(k, v);
        }
        Ok(Value::Object(out))
    }
}

struct KeySeed;

impl<'de> de::DeserializeSeed<'de> for KeySeed {
    type Value = String;
    fn deserialize<D>(self, deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(KeyVisitor)
    }
}

struct KeyVisitor;
impl<'de> Visitor<'de> for KeyVisitor {
    type Value = String;
    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string object key")
    }
    fn visit_str<E>(self, v: &str) -> Result<String, E>
    where
        E: de::Error,
    {
        Ok(v.to_owned())
    }
    fn visit_string<E>(self, v: String) -> Result<String, E>
    where
        E: de::Error,
    {
        Ok(v)
    }
}

struct StrictValueSeed;
impl<'de> de::DeserializeSeed<'de> for StrictValueSeed {
    type Value = Value;
    fn deserialize<D>(self, deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(StrictValueVisitor)
    }
}
