//! Canonical byte form of policy documents.
//!
//! Rules:
//! - mapping keys sorted recursively (UTF-8 byte order == code point order)
//! - list order preserved
//! - compact separators (`,` and `:`), no whitespace
//! - UTF-8 output; strings and numbers use standard JSON escaping/formatting
//!
//! Signatures are computed and verified over exactly these bytes.

use serde::Serialize;
use serde_json::Value;

use crate::error::{AdfreeError, Result};

/// Canonicalize a JSON value. Infallible: every `Value` is serializable.
pub fn canonicalize(value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    write_value(value, &mut out);
    out
}

/// Canonicalize any serializable value.
///
/// Fails only when `value` cannot be represented as JSON (e.g. a map with
/// non-string keys), which is a programming error on the caller side.
pub fn canonicalize_serializable<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let v = serde_json::to_value(value)
        .map_err(|e| AdfreeError::Internal(format!("value not serializable: {e}")))?;
    Ok(canonicalize(&v))
}

fn write_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => write_str(s, out),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push(b'{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_str(k, out);
                out.push(b':');
                write_value(v, out);
            }
            out.push(b'}');
        }
    }
}

fn write_str(s: &str, out: &mut Vec<u8>) {
    // Display on a string Value yields the escaped, quoted JSON literal.
    out.extend_from_slice(Value::String(s.to_owned()).to_string().as_bytes());
}
