// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = "Deterministic canonical JSON serialization and SHA-256 hashing."]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! This crate is the base of the settlement spine: every hash, signature,
//! and manifest entry elsewhere in the workspace is computed over the byte
//! string produced here.
//!
//! [`normalize`] walks a [`serde_json::Value`] and rejects anything that
//! cannot round-trip (non-finite floats, recursion past a sane depth —
//! standing in for cycle rejection, since a parsed `Value` tree cannot
//! itself contain a cycle). [`to_canonical_bytes`] always normalizes first,
//! then serializes with codepoint-sorted object keys, the minimal JSON
//! escape set, and no incidental whitespace. Two independent
//! implementations of this module, given the same logical value, must
//! produce byte-identical output — that is the entire point of the crate.

mod parse;

pub use parse::parse_strict;

use serde::Serialize;
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};
use spine_error::{ErrorCode, SpineError};

/// Maximum nesting depth [`normalize`] will walk.
///
/// A parsed [`Value`] tree cannot contain a cycle, so this bound exists to
/// reject pathological input (and mirrors the "reject cycles" requirement
/// for tree-shaped data) rather than to detect an actual cycle.
pub const MAX_DEPTH: usize = 512;

/// Normalize a JSON value for canonical serialization.
///
/// Rejects non-finite numbers and values nested deeper than [`MAX_DEPTH`].
/// Object keys are not reordered here — [`to_canonical_bytes`] relies on
/// `serde_json`'s `BTreeMap`-backed [`Map`] for codepoint-sorted key order,
/// since this crate is built without the `preserve_order` feature.
///
/// # Errors
///
/// Returns [`SpineError`] with [`ErrorCode::InputInvalid`] if the value
/// contains a non-finite float or exceeds [`MAX_DEPTH`].
pub fn normalize(value: &Value, path: &str) -> Result<Value, SpineError> {
    normalize_at(value, path, 0)
}

fn normalize_at(value: &Value, path: &str, depth: usize) -> Result<Value, SpineError> {
    if depth > MAX_DEPTH {
        return Err(SpineError::new(
            ErrorCode::InputInvalid,
            format!("value nested past max depth {MAX_DEPTH}"),
        )
        .with_path(path.to_string()));
    }
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(value.clone()),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(SpineError::new(
                        ErrorCode::InputInvalid,
                        "non-finite number cannot be canonicalized",
                    )
                    .with_path(path.to_string()));
                }
            }
            Ok(Value::Number(n.clone()))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(normalize_at(item, &format!("{path}[{i}]"), depth + 1)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                let child_path = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                out.insert(k.clone(), normalize_at(v, &child_path, depth + 1)?);
            }
            Ok(Value::Object(out))
        }
    }
}

/// Serialize any `Serialize` value to its canonical JSON byte string.
///
/// Always normalizes first (see module docs for why this is the only
/// supported path — there is deliberately no "normalize-optional" entry
/// point in this crate).
///
/// # Errors
///
/// Returns [`SpineError`] if `value` cannot be converted to
/// [`serde_json::Value`], fails [`normalize`], or (should not happen for a
/// normalized value) fails to serialize.
pub fn to_canonical_bytes(value: &impl Serialize) -> Result<Vec<u8>, SpineError> {
    let v = serde_json::to_value(value).map_err(|e| {
        SpineError::new(ErrorCode::InputInvalid, format!("not representable as JSON: {e}"))
    })?;
    let normalized = normalize(&v, "")?;
    serde_json::to_vec(&normalized)
        .map_err(|e| SpineError::new(ErrorCode::InputInvalid, format!("canonical encode failed: {e}")))
}

/// Serialize any `Serialize` value to its canonical JSON string.
///
/// # Errors
///
/// See [`to_canonical_bytes`].
pub fn to_canonical_string(value: &impl Serialize) -> Result<String, SpineError> {
    let bytes = to_canonical_bytes(value)?;
    // `to_canonical_bytes` only ever produces bytes `serde_json` itself
    // wrote, which are always valid UTF-8.
    Ok(String::from_utf8(bytes).expect("canonical JSON is valid UTF-8"))
}

/// Hex-encode the SHA-256 digest of a byte slice (lowercase, 64 chars).
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_lower(&hasher.finalize())
}

/// Compute the SHA-256 hash of a value's canonical JSON representation.
///
/// # Errors
///
/// See [`to_canonical_bytes`].
pub fn canonical_hash(value: &impl Serialize) -> Result<String, SpineError> {
    let bytes = to_canonical_bytes(value)?;
    Ok(sha256_hex(&bytes))
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

/// Construct a JSON number for an integer within the IEEE-754 safe range.
///
/// Mirrors the "integers within the safe range are emitted verbatim" rule:
/// callers building canonical documents by hand (rather than via `Serialize`
/// derive) should prefer this over ad hoc `Number::from` calls so overflow
/// is caught early instead of silently truncating during hashing.
///
/// # Errors
///
/// Returns [`ErrorCode::InputInvalid`] if `n` falls outside
/// `[-(2^53 - 1), 2^53 - 1]`.
pub fn safe_integer(n: i64) -> Result<Number, SpineError> {
    const MAX_SAFE: i64 = 9_007_199_254_740_991;
    if !(-MAX_SAFE..=MAX_SAFE).contains(&n) {
        return Err(SpineError::new(
            ErrorCode::InputInvalid,
            format!("{n} is outside the safe integer range"),
        ));
    }
    Ok(Number::from(n))
}
