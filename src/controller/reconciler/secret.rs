//! # Target Secret
//!
//! The Secret materialized for an ExternalSecret, built fresh every cycle and
//! written with server-side apply.
//!
//! Every applied Secret carries a hash of its type and data. A Secret whose
//! stored content no longer matches that hash was edited outside the
//! controller and is rewritten on the next watch event.

use super::merge::SecretData;
use crate::constants::{
    CONTENT_HASH_ANNOTATION, FORCE_SYNC_ANNOTATION, LAST_APPLIED_ANNOTATION, MANAGED_LABEL,
};
use crate::crd::ExternalSecret;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Default Secret type when the template does not override it
pub const DEFAULT_SECRET_TYPE: &str = "Opaque";

/// Desired state of a managed Secret
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredSecret {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub type_: String,
    /// Base64-encoded values
    pub data: SecretData,
    /// Controller reference to the owning ExternalSecret; absent until the
    /// ExternalSecret has a uid
    pub owner: Option<OwnerReference>,
}

impl DesiredSecret {
    /// Secret named after the ExternalSecret, carrying its labels and
    /// annotations and owned by it so deletion cascades
    #[must_use]
    pub fn for_external_secret(es: &ExternalSecret, data: SecretData) -> Self {
        let annotations = es
            .metadata
            .annotations
            .iter()
            .flatten()
            .filter(|(key, _)| {
                ![
                    LAST_APPLIED_ANNOTATION,
                    FORCE_SYNC_ANNOTATION,
                    CONTENT_HASH_ANNOTATION,
                ]
                .contains(&key.as_str())
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            name: es.metadata.name.clone().unwrap_or_default(),
            namespace: es
                .metadata
                .namespace
                .clone()
                .unwrap_or_else(|| "default".to_string()),
            labels: es.metadata.labels.clone().unwrap_or_default(),
            annotations,
            type_: DEFAULT_SECRET_TYPE.to_string(),
            data,
            owner: es.controller_owner_ref(&()),
        }
    }

    /// Hash of the decoded data and type
    #[must_use]
    pub fn content_hash(&self) -> String {
        let decoded: BTreeMap<&str, Vec<u8>> = self
            .data
            .iter()
            .map(|(key, value)| {
                let bytes = BASE64_STANDARD
                    .decode(value)
                    .unwrap_or_else(|_| value.as_bytes().to_vec());
                (key.as_str(), bytes)
            })
            .collect();
        hash_content(
            &self.type_,
            decoded.iter().map(|(key, value)| (*key, value.as_slice())),
        )
    }

    /// Server-side apply body
    #[must_use]
    pub fn manifest(&self) -> serde_json::Value {
        let mut labels = self.labels.clone();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
        let mut annotations = self.annotations.clone();
        annotations.insert(CONTENT_HASH_ANNOTATION.to_string(), self.content_hash());

        let mut metadata = serde_json::json!({
            "name": self.name,
            "namespace": self.namespace,
            "labels": labels,
            "annotations": annotations,
        });
        if let Some(owner) = &self.owner {
            metadata["ownerReferences"] = serde_json::json!([owner]);
        }

        serde_json::json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": metadata,
            "type": self.type_,
            "data": self.data,
        })
    }
}

/// `sha256:<hex>` over the Secret type and its key/value pairs in key order
fn hash_content<'a>(type_: &str, data: impl Iterator<Item = (&'a str, &'a [u8])>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(type_.as_bytes());
    for (key, value) in data {
        hasher.update([0]);
        hasher.update(key.as_bytes());
        hasher.update([0]);
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value);
    }
    format!("sha256:{:x}", hasher.finalize())
}

/// True when a stored Secret still holds the content recorded in its hash annotation
#[must_use]
pub fn secret_matches_content_hash(secret: &Secret) -> bool {
    let Some(recorded) = secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(CONTENT_HASH_ANNOTATION))
    else {
        return false;
    };
    let type_ = secret.type_.as_deref().unwrap_or(DEFAULT_SECRET_TYPE);
    let stored = hash_content(
        type_,
        secret
            .data
            .iter()
            .flatten()
            .map(|(key, value)| (key.as_str(), value.0.as_slice())),
    );
    *recorded == stored
}
