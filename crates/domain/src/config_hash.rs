//! Declarative change detection over the desired configuration.

use std::fmt::Write as _;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Computes the SHA-256 hex digest of a desired configuration.
///
/// The digest covers a canonical JSON encoding (object keys sorted, arrays
/// in order), so semantically equal configurations always hash equal. An
/// empty configuration yields the empty string.
#[must_use]
pub fn compute_config_hash(config: &Map<String, Value>) -> String {
    if config.is_empty() {
        return String::new();
    }

    let mut canonical = String::new();
    write_canonical_object(config, &mut canonical);
    hex_digest(canonical.as_str())
}

/// Computes the config hash of an arbitrary JSON value.
///
/// `null`, `{}`, and `[]` all yield the empty string.
#[must_use]
pub fn compute_config_hash_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Object(map) => compute_config_hash(map),
        Value::Array(items) if items.is_empty() => String::new(),
        other => {
            let mut canonical = String::new();
            write_canonical(other, &mut canonical);
            hex_digest(canonical.as_str())
        }
    }
}

fn hex_digest(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(number) => {
            let _ = write!(out, "{number}");
        }
        Value::String(text) => write_escaped(text, out),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => write_canonical_object(map, out),
    }
}

fn write_canonical_object(map: &Map<String, Value>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    out.push('{');
    for (index, key) in keys.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        write_escaped(key, out);
        out.push(':');
        if let Some(value) = map.get(key.as_str()) {
            write_canonical(value, out);
        }
    }
    out.push('}');
}

fn write_escaped(text: &str, out: &mut String) {
    out.push('"');
    for character in text.chars() {
        match character {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            control if (control as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", control as u32);
            }
            other => out.push(other),
        }
    }
    out.push('"');
}
