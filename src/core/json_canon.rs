//! Canonical JSON encoder for fingerprint hashing.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanonJsonError {
    #[error("json encode failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize a value to canonical JSON bytes.
///
/// Canonical rules:
/// - object keys sorted by UTF-8 byte order, recursively
/// - no insignificant whitespace
///
/// String content is untouched: whitespace inside free-text fields IS
/// content, so two wordings that differ only in spacing hash differently.
pub fn to_canon_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonJsonError> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&canon_value(value))?)
}

fn canon_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = Map::new();
            for (key, val) in entries {
                out.insert(key, canon_value(val));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canon_value).collect()),
        other => other,
    }
}
