//! Deterministic JSON serialization for Ed25519 signing.
//!
//! Produces a canonical byte representation by:
//! - Sorting object keys recursively (byte order, which equals code-point
//!   order for UTF-8)
//! - Dropping object entries whose value is `null`
//! - Preserving array order (array elements are never dropped)
//! - Encoding with no whitespace, no trailing newline
//! - Escaping every non-ASCII character as `\uxxxx` (lowercase hex,
//!   surrogate pairs above the BMP)
//!
//! These rules are contractual: the server, CLI, and browser all sign and
//! verify against exactly these bytes.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use crate::error::ProtocolError;

/// Produce canonical JSON bytes from any serializable document.
///
/// The output is deterministic: the same logical document always produces
/// the same bytes, regardless of field order in the source.
///
/// # Errors
///
/// Returns [`ProtocolError::NotRepresentable`] when the value cannot be
/// represented as JSON (for example a map with non-string keys).
pub fn canonical_bytes<T: Serialize>(doc: &T) -> Result<Vec<u8>, ProtocolError> {
    let value =
        serde_json::to_value(doc).map_err(|e| ProtocolError::NotRepresentable(e.to_string()))?;
    Ok(canonical_value(&value))
}

/// Produce canonical JSON bytes from an already-parsed value.
#[must_use]
pub fn canonical_value(value: &Value) -> Vec<u8> {
    let mut out = String::new();
    write_value(&mut out, value);
    out.into_bytes()
}

/// Build the signable view of a document: a copy with the top-level
/// `signature` entry removed. Server-derived fields (scores, revocation
/// markers, stored-at timestamps) are never part of the document models,
/// so removing the signature is sufficient.
#[must_use]
pub fn signable_view(doc: &Value) -> Value {
    let mut view = doc.clone();
    if let Value::Object(map) = &mut view {
        map.remove("signature");
    }
    view
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        // serde_json renders integers exactly and floats in shortest
        // round-trippable form; protocol fields only use integers and
        // strings, so the float path is defensive.
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => write_escaped(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, _)| k)
                .collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped(out, key);
                out.push(':');
                write_value(out, &map[key.as_str()]);
            }
            out.push('}');
        }
    }
}

fn write_escaped(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c if c.is_ascii() => out.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{:04x}", unit);
                }
            }
        }
    }
    out.push('"');
}
