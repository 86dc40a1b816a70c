//! # Common Provider Utilities
//!
//! Shared utilities used across all provider implementations: JSON flattening,
//! property extraction, path prefixing and metric recording.

use super::ProviderError;
use crate::crd::RemoteReference;
use crate::observability::metrics;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Instant;

/// Bytes stored for a single JSON value
///
/// Strings are taken verbatim. Numbers, booleans and null use their JSON text,
/// nested objects and arrays their compact JSON encoding.
#[must_use]
pub fn json_value_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.as_bytes().to_vec(),
        other => other.to_string().into_bytes(),
    }
}

/// Parse a fetched value as a JSON object
///
/// # Errors
///
/// Returns a backend error when the value is not valid JSON or not an object.
pub fn parse_json_object(raw: &[u8], path: &str) -> Result<Map<String, Value>, ProviderError> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ProviderError::Backend(format!(
            "value of {path} is not a JSON object"
        ))),
        Err(e) => Err(ProviderError::Backend(format!(
            "unable to unmarshal value of {path}: {e}"
        ))),
    }
}

/// Expand JSON object fields into raw bytes keyed by field name
#[must_use]
pub fn object_to_bytes(fields: &Map<String, Value>) -> BTreeMap<String, Vec<u8>> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), json_value_bytes(value)))
        .collect()
}

/// Extract one property from a JSON object
///
/// # Errors
///
/// Returns a backend error when the key does not exist.
pub fn extract_property(
    fields: &Map<String, Value>,
    property: &str,
    path: &str,
) -> Result<Vec<u8>, ProviderError> {
    fields.get(property).map(json_value_bytes).ok_or_else(|| {
        ProviderError::Backend(format!("property {property} not found in {path}"))
    })
}

/// `GetSecret` semantics for backends returning one opaque string per path:
/// the raw value without `property`, the extracted key with it
///
/// # Errors
///
/// Returns a backend error when a property was requested and the value is not a
/// JSON object or lacks the key.
pub fn select_value(raw: Vec<u8>, reference: &RemoteReference) -> Result<Vec<u8>, ProviderError> {
    match reference.property.as_deref() {
        None => Ok(raw),
        Some(property) => {
            let fields = parse_json_object(&raw, &reference.path)?;
            extract_property(&fields, property, &reference.path)
        }
    }
}

/// `GetSecretMap` semantics for backends returning one opaque string per path
///
/// # Errors
///
/// Returns a backend error when the value is not a JSON object.
pub fn select_map(
    raw: &[u8],
    reference: &RemoteReference,
) -> Result<BTreeMap<String, Vec<u8>>, ProviderError> {
    let fields = parse_json_object(raw, &reference.path)?;
    Ok(object_to_bytes(&fields))
}

/// Join an optional store-level prefix with a reference path
///
/// Paths already under the prefix (whole segments only) are left unchanged.
#[must_use]
pub fn join_prefix(prefix: Option<&str>, path: &str) -> String {
    match prefix.map(|p| p.trim_end_matches('/')).filter(|p| !p.is_empty()) {
        None => path.to_string(),
        Some(prefix) if is_under_prefix(prefix, path) => path.to_string(),
        Some(prefix) => format!("{prefix}/{}", path.trim_start_matches('/')),
    }
}

fn is_under_prefix(prefix: &str, path: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Record duration and outcome of a backend call
pub fn record_provider_metrics<T>(
    provider: &str,
    operation: &str,
    start_time: Instant,
    result: &Result<T, ProviderError>,
) {
    metrics::record_provider_operation(provider, operation, start_time.elapsed().as_secs_f64());
    if let Err(e) = result {
        metrics::increment_provider_operation_errors(provider, e.class().as_str());
    }
}
