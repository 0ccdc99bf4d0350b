//! # JSON Module
//!
//! JSON parsing with simd-json, falling back to serde_json when the SIMD
//! parser rejects the input, and flattening of JSON request bodies into
//! request parameters.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

/// Parse JSON text into a typed value
///
/// # Errors
///
/// Returns `Error::Json` when neither parser accepts the input.
pub fn parse_json<T: DeserializeOwned>(json_str: &str) -> Result<T> {
    parse_json_bytes(json_str.as_bytes())
}

/// Parse JSON bytes into a typed value
///
/// simd-json parses in place, so it works on a scratch copy.
///
/// # Errors
///
/// Returns `Error::Json` when neither parser accepts the input.
pub fn parse_json_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut scratch = bytes.to_vec();
    match simd_json::from_slice(&mut scratch) {
        Ok(value) => Ok(value),
        Err(_) => Ok(serde_json::from_slice(bytes)?),
    }
}

/// Serialize a value to JSON text
///
/// # Errors
///
/// Returns `Error::Json` when the value cannot be serialized.
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Serialize a value to indented JSON text
///
/// # Errors
///
/// Returns `Error::Json` when the value cannot be serialized.
pub fn to_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Flatten a JSON object body into string parameters
///
/// Nested objects and arrays use bracket keys, so
/// `{"hat": {"color": "red"}}` becomes `hat[color] = red`.
///
/// # Errors
///
/// Returns `Error::Json` when the body is not valid JSON. A body that is
/// valid JSON but not an object yields no parameters.
pub fn json_body_params(body: &[u8]) -> Result<HashMap<String, String>> {
    let value: serde_json::Value = parse_json_bytes(body)?;
    let mut params = HashMap::new();
    if let serde_json::Value::Object(fields) = value {
        for (key, field) in fields {
            flatten_into(&mut params, key, field);
        }
    }
    Ok(params)
}

fn flatten_into(params: &mut HashMap<String, String>, key: String, value: serde_json::Value) {
    match value {
        serde_json::Value::Object(fields) => {
            for (inner, field) in fields {
                flatten_into(params, format!("{key}[{inner}]"), field);
            }
        }
        serde_json::Value::Array(items) => {
            for (index, item) in items.into_iter().enumerate() {
                flatten_into(params, format!("{key}[{index}]"), item);
            }
        }
        serde_json::Value::String(text) => {
            params.insert(key, text);
        }
        serde_json::Value::Null => {
            params.insert(key, String::new());
        }
        other => {
            params.insert(key, other.to_string());
        }
    }
}
