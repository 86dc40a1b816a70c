//! # Kubernetes Validation
//!
//! Validates Kubernetes resource names and Secret data keys.

use anyhow::Result;
use regex::Regex;

/// Validate Kubernetes resource name (RFC 1123 subdomain)
/// Format: lowercase alphanumeric, hyphens, dots
/// Length: 1-253 characters
/// Cannot start or end with hyphen or dot
pub fn validate_kubernetes_name(name: &str, field_name: &str) -> Result<()> {
    let name_trimmed = name.trim();

    if name_trimmed.is_empty() {
        return Err(anyhow::anyhow!("{field_name} cannot be empty"));
    }

    if name_trimmed.len() > 253 {
        return Err(anyhow::anyhow!(
            "{} '{}' exceeds maximum length of 253 characters (got {})",
            field_name,
            name_trimmed,
            name_trimmed.len()
        ));
    }

    let name_regex =
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
            .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    if !name_regex.is_match(name_trimmed) {
        return Err(anyhow::anyhow!(
            "{field_name} '{name_trimmed}' must be a valid Kubernetes name (lowercase alphanumeric, hyphens, dots; cannot start/end with hyphen or dot)"
        ));
    }

    Ok(())
}

/// Validate a key of a Secret's `data` map
/// Format: alphanumeric, `-`, `_`, `.`
/// Length: 1-253 characters
pub fn validate_secret_key(key: &str, field_name: &str) -> Result<()> {
    if key.is_empty() {
        return Err(anyhow::anyhow!("{field_name} cannot be empty"));
    }

    if key.len() > 253 {
        return Err(anyhow::anyhow!(
            "{field_name} '{key}' exceeds maximum length of 253 characters (got {})",
            key.len()
        ));
    }

    let key_regex = Regex::new(r"^[-._a-zA-Z0-9]+$")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    if !key_regex.is_match(key) {
        return Err(anyhow::anyhow!(
            "{field_name} '{key}' must contain only alphanumeric characters, '-', '_' or '.'"
        ));
    }

    Ok(())
}
