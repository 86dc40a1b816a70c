//! # Object Store
//!
//! Kubernetes reads and writes used by a sync cycle, behind the
//! [`ObjectStore`] seam so the driver can run against an in-memory store in
//! tests.

use super::secret::{secret_matches_content_hash, DesiredSecret};
use super::status::status_patch;
use crate::constants::{FIELD_MANAGER, FORCE_SYNC_ANNOTATION};
use crate::crd::{
    ClusterSecretStore, ExternalSecret, ExternalSecretStatus, SecretStore, StoreConfig, StoreKind,
    StoreRef,
};
use crate::provider::session::CredentialReader;
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use tracing::debug;
use zeroize::Zeroizing;

/// Object access needed by the reconciliation driver
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Current ExternalSecret, `None` once deleted
    async fn get_external_secret(&self, namespace: &str, name: &str)
        -> Result<Option<ExternalSecret>>;

    /// Store referenced by an ExternalSecret in `namespace`
    async fn get_store(&self, store_ref: &StoreRef, namespace: &str) -> Result<StoreConfig>;

    /// Create or overwrite the managed Secret
    async fn upsert_secret(&self, secret: &DesiredSecret) -> Result<()>;

    async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ExternalSecretStatus,
    ) -> Result<()>;

    /// Remove the force-sync annotation after it was honored
    async fn clear_force_sync(&self, namespace: &str, name: &str) -> Result<()>;

    /// True when the managed Secret exists and still holds what was last applied
    async fn secret_in_sync(&self, namespace: &str, name: &str) -> Result<bool>;
}

/// [`ObjectStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl std::fmt::Debug for KubeObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore").finish_non_exhaustive()
    }
}

impl KubeObjectStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get_external_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ExternalSecret>> {
        let api: Api<ExternalSecret> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .with_context(|| format!("Failed to get ExternalSecret {namespace}/{name}"))
    }

    async fn get_store(&self, store_ref: &StoreRef, namespace: &str) -> Result<StoreConfig> {
        let spec = match store_ref.kind {
            StoreKind::SecretStore => {
                let api: Api<SecretStore> = Api::namespaced(self.client.clone(), namespace);
                api.get_opt(&store_ref.name)
                    .await
                    .with_context(|| format!("SecretStore {:?}", store_ref.name))?
                    .map(|store| store.spec.provider)
            }
            StoreKind::ClusterSecretStore => {
                let api: Api<ClusterSecretStore> = Api::all(self.client.clone());
                api.get_opt(&store_ref.name)
                    .await
                    .with_context(|| format!("ClusterSecretStore {:?}", store_ref.name))?
                    .map(|store| store.spec.provider)
            }
        }
        .ok_or_else(|| store_not_found(store_ref, namespace))?;

        Ok(StoreConfig {
            name: store_ref.name.clone(),
            kind: store_ref.kind,
            namespace: namespace.to_string(),
            spec,
        })
    }

    async fn upsert_secret(&self, secret: &DesiredSecret) -> Result<()> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &secret.namespace);
        api.patch(
            &secret.name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(secret.manifest()),
        )
        .await
        .with_context(|| {
            format!(
                "Failed to apply Secret {}/{}",
                secret.namespace, secret.name
            )
        })?;
        debug!(
            resource.namespace = %secret.namespace,
            resource.name = %secret.name,
            keys = secret.data.len(),
            "Applied Secret"
        );
        Ok(())
    }

    async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ExternalSecretStatus,
    ) -> Result<()> {
        let api: Api<ExternalSecret> = Api::namespaced(self.client.clone(), namespace);
        let patch = status_patch(status).context("Failed to serialize ExternalSecret status")?;
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
            .with_context(|| {
                format!("Failed to update status of ExternalSecret {namespace}/{name}")
            })?;
        Ok(())
    }

    async fn clear_force_sync(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<ExternalSecret> = Api::namespaced(self.client.clone(), namespace);
        let mut annotations = serde_json::Map::new();
        annotations.insert(FORCE_SYNC_ANNOTATION.to_string(), serde_json::Value::Null);
        let patch = serde_json::json!({ "metadata": { "annotations": annotations } });
        api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
            .with_context(|| {
                format!("Failed to clear force-sync annotation on ExternalSecret {namespace}/{name}")
            })?;
        debug!(
            resource.namespace = namespace,
            resource.name = name,
            "Cleared force-sync annotation"
        );
        Ok(())
    }

    async fn secret_in_sync(&self, namespace: &str, name: &str) -> Result<bool> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api
            .get_opt(name)
            .await
            .with_context(|| format!("Failed to get Secret {namespace}/{name}"))?;
        Ok(secret.is_some_and(|secret| secret_matches_content_hash(&secret)))
    }
}

fn store_not_found(store_ref: &StoreRef, namespace: &str) -> anyhow::Error {
    match store_ref.kind {
        StoreKind::SecretStore => anyhow::anyhow!(
            "SecretStore {:?} not found in namespace {namespace}",
            store_ref.name
        ),
        StoreKind::ClusterSecretStore => {
            anyhow::anyhow!("ClusterSecretStore {:?} not found", store_ref.name)
        }
    }
}

#[async_trait]
impl CredentialReader for KubeObjectStore {
    async fn read_secret_key(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api
            .get(name)
            .await
            .with_context(|| format!("Failed to get Secret {namespace}/{name}"))?;
        secret
            .data
            .and_then(|mut data| data.remove(key))
            .map(|value| Zeroizing::new(value.0))
            .ok_or_else(|| anyhow::anyhow!("Secret {namespace}/{name} has no key {key}"))
    }
}
