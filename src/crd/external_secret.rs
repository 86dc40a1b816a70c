//! # ExternalSecret
//!
//! Declarative request to materialize backend secret material as a Kubernetes Secret.

use super::status::ExternalSecretStatus;
use kube::CustomResource;
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};

/// ExternalSecret specification
///
/// Example:
/// ```yaml
/// apiVersion: secret-sync.octopilot.io/v1alpha1
/// kind: ExternalSecret
/// metadata:
///   name: database-credentials
///   namespace: payments
/// spec:
///   storeRef:
///     name: vault-backend
///   refreshInterval: 1h
///   dataFrom:
///     - path: payments/database
///   data:
///     - secretKey: password
///       remoteRef:
///         path: payments/database-rotated
///         property: password
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "ExternalSecret",
    group = "secret-sync.octopilot.io",
    version = "v1alpha1",
    namespaced,
    status = "ExternalSecretStatus",
    shortname = "es",
    printcolumn = r#"{"name":"Store", "type":"string", "jsonPath":".spec.storeRef.name"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Next Sync", "type":"string", "jsonPath":".status.nextSync"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSecretSpec {
    /// Store holding the backend configuration
    pub store_ref: StoreRef,
    /// How often to re-fetch from the backend (e.g. "1h", "15m", "0s").
    /// Unset means sync on change only. Zero means sync exactly once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<String>,
    /// Legacy name for `refreshInterval`, honored only when that field is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew_after: Option<String>,
    /// Partial Secret object overlaid onto the generated Secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "free_form_object")]
    pub template: Option<serde_json::Value>,
    /// Single values mapped to explicit keys, applied after `dataFrom`
    #[serde(default)]
    pub data: Vec<ExternalSecretData>,
    /// References whose JSON objects are expanded key by key
    #[serde(default)]
    pub data_from: Vec<RemoteReference>,
}

/// Reference to a SecretStore or ClusterSecretStore
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoreRef {
    pub name: String,
    #[serde(default)]
    pub kind: StoreKind,
}

/// Scope of the referenced store
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Namespaced store, looked up in the ExternalSecret's namespace
    #[default]
    SecretStore,
    /// Cluster-scoped store
    ClusterSecretStore,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::SecretStore => f.write_str("SecretStore"),
            StoreKind::ClusterSecretStore => f.write_str("ClusterSecretStore"),
        }
    }
}

/// One key of the generated Secret
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSecretData {
    pub secret_key: String,
    pub remote_ref: RemoteReference,
}

/// Pointer to a value or JSON object inside a backend
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteReference {
    /// Backend path or name of the secret
    #[serde(alias = "name")]
    pub path: String,
    /// Key within the fetched JSON object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    /// Backend-specific version selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl RemoteReference {
    /// Convenience constructor used by tests and the merge engine
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }
}

impl ExternalSecret {
    /// `namespace/name` identity used by the scheduler and backoff tracking
    #[must_use]
    pub fn identity(&self) -> String {
        format!(
            "{}/{}",
            self.metadata.namespace.as_deref().unwrap_or("default"),
            self.metadata.name.as_deref().unwrap_or("unknown")
        )
    }

    /// Effective refresh interval string, `refreshInterval` first
    #[must_use]
    pub fn refresh_interval_raw(&self) -> Option<&str> {
        self.spec
            .refresh_interval
            .as_deref()
            .or(self.spec.renew_after.as_deref())
    }
}

/// Template is an arbitrary partial Secret, so the API server must keep unknown fields
fn free_form_object(_gen: &mut SchemaGenerator) -> Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}
