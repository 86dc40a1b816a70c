//! # ExternalSecret Validation
//!
//! Checks an ExternalSecret before any backend is contacted.

use super::duration::parse_kubernetes_duration;
use super::kubernetes::{validate_kubernetes_name, validate_secret_key};
use crate::crd::ExternalSecret;
use anyhow::Result;
use std::time::Duration;

/// Validate an ExternalSecret and return its effective refresh interval
///
/// `refreshInterval` wins over the legacy `renewAfter`. `None` means the
/// resource syncs only on watch events.
pub fn validate_external_secret(es: &ExternalSecret) -> Result<Option<Duration>> {
    if let Err(e) = validate_kubernetes_name(&es.spec.store_ref.name, "storeRef.name") {
        return Err(anyhow::anyhow!("Invalid storeRef.name: {e}"));
    }

    for (index, data) in es.spec.data.iter().enumerate() {
        validate_secret_key(&data.secret_key, &format!("data[{index}].secretKey"))?;
        if data.remote_ref.path.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "data[{index}].remoteRef.path is required but is empty"
            ));
        }
    }

    for (index, reference) in es.spec.data_from.iter().enumerate() {
        if reference.path.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "dataFrom[{index}].path is required but is empty"
            ));
        }
    }

    es.refresh_interval_raw()
        .map(|raw| {
            parse_kubernetes_duration(raw)
                .map_err(|e| anyhow::anyhow!("Invalid refreshInterval '{raw}': {e}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn external_secret(spec: serde_json::Value) -> ExternalSecret {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "secret-sync.octopilot.io/v1alpha1",
            "kind": "ExternalSecret",
            "metadata": {"name": "db", "namespace": "apps"},
            "spec": spec
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_spec_returns_interval() {
        let es = external_secret(serde_json::json!({
            "storeRef": {"name": "vault"},
            "refreshInterval": "1h",
            "data": [{"secretKey": "password", "remoteRef": {"path": "db", "property": "password"}}],
            "dataFrom": [{"path": "db-common"}]
        }));
        assert_eq!(
            validate_external_secret(&es).unwrap(),
            Some(Duration::from_secs(3600))
        );
    }

    #[test]
    fn test_renew_after_is_used_when_refresh_interval_unset() {
        let es = external_secret(serde_json::json!({
            "storeRef": {"name": "vault"},
            "renewAfter": "2m"
        }));
        assert_eq!(
            validate_external_secret(&es).unwrap(),
            Some(Duration::from_secs(120))
        );
    }

    #[test]
    fn test_unset_interval_is_none() {
        let es = external_secret(serde_json::json!({"storeRef": {"name": "vault"}}));
        assert_eq!(validate_external_secret(&es).unwrap(), None);
    }

    #[test]
    fn test_invalid_fields_are_rejected() {
        let bad_interval = external_secret(serde_json::json!({
            "storeRef": {"name": "vault"},
            "refreshInterval": "soon"
        }));
        assert!(validate_external_secret(&bad_interval)
            .unwrap_err()
            .to_string()
            .contains("refreshInterval"));

        let bad_key = external_secret(serde_json::json!({
            "storeRef": {"name": "vault"},
            "data": [{"secretKey": "a/b", "remoteRef": {"path": "db"}}]
        }));
        assert!(validate_external_secret(&bad_key).is_err());

        let empty_path = external_secret(serde_json::json!({
            "storeRef": {"name": "vault"},
            "dataFrom": [{"path": " "}]
        }));
        assert!(validate_external_secret(&empty_path).is_err());
    }
}
