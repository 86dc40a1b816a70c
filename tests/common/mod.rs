//! Shared fixtures for integration tests: an in-memory cluster and a fake backend,
//! both plugged in through the controller's public traits.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use anyhow::Result;
use async_trait::async_trait;
use external_secret_controller::config::ControllerConfig;
use external_secret_controller::controller::reconciler::{DesiredSecret, ObjectStore, Reconciler};
use external_secret_controller::controller::scheduler::Scheduler;
use external_secret_controller::crd::{
    ExternalSecret, ExternalSecretStatus, RemoteReference, StoreConfig, StoreKind,
    StoreProviderSpec, StoreRef,
};
use external_secret_controller::provider::resolver::ClientFactory;
use external_secret_controller::provider::{ProviderError, SecretsClient};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct ClusterState {
    external_secrets: HashMap<String, ExternalSecret>,
    stores: HashMap<(StoreKind, String), StoreProviderSpec>,
    secrets: HashMap<String, DesiredSecret>,
    applied_hashes: HashMap<String, String>,
}

/// In-memory stand-in for the Kubernetes API
#[derive(Debug, Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl FakeCluster {
    pub fn apply(&self, es: ExternalSecret) {
        self.state
            .lock()
            .unwrap()
            .external_secrets
            .insert(es.identity(), es);
    }

    pub fn external_secret(&self, identity: &str) -> Option<ExternalSecret> {
        self.state
            .lock()
            .unwrap()
            .external_secrets
            .get(identity)
            .cloned()
    }

    pub fn delete(&self, identity: &str) {
        self.state.lock().unwrap().external_secrets.remove(identity);
    }

    pub fn add_store(&self, kind: StoreKind, name: &str) {
        self.state
            .lock()
            .unwrap()
            .stores
            .insert((kind, name.to_string()), StoreProviderSpec::default());
    }

    pub fn status(&self, identity: &str) -> Option<ExternalSecretStatus> {
        self.state
            .lock()
            .unwrap()
            .external_secrets
            .get(identity)
            .and_then(|es| es.status.clone())
    }

    pub fn secret(&self, identity: &str) -> Option<DesiredSecret> {
        self.state.lock().unwrap().secrets.get(identity).cloned()
    }

    pub fn delete_secret(&self, identity: &str) {
        self.state.lock().unwrap().secrets.remove(identity);
    }
}

#[async_trait]
impl ObjectStore for FakeCluster {
    async fn get_external_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ExternalSecret>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .external_secrets
            .get(&format!("{namespace}/{name}"))
            .cloned())
    }

    async fn get_store(&self, store_ref: &StoreRef, namespace: &str) -> Result<StoreConfig> {
        let spec = self
            .state
            .lock()
            .unwrap()
            .stores
            .get(&(store_ref.kind, store_ref.name.clone()))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{} {:?} not found", store_ref.kind, store_ref.name))?;
        Ok(StoreConfig {
            name: store_ref.name.clone(),
            kind: store_ref.kind,
            namespace: namespace.to_string(),
            spec,
        })
    }

    async fn upsert_secret(&self, secret: &DesiredSecret) -> Result<()> {
        let identity = format!("{}/{}", secret.namespace, secret.name);
        let mut state = self.state.lock().unwrap();
        state
            .applied_hashes
            .insert(identity.clone(), secret.content_hash());
        state.secrets.insert(identity, secret.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ExternalSecretStatus,
    ) -> Result<()> {
        if let Some(es) = self
            .state
            .lock()
            .unwrap()
            .external_secrets
            .get_mut(&format!("{namespace}/{name}"))
        {
            es.status = Some(status.clone());
        }
        Ok(())
    }

    async fn clear_force_sync(&self, _namespace: &str, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn secret_in_sync(&self, namespace: &str, name: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        let identity = format!("{namespace}/{name}");
        Ok(state
            .secrets
            .get(&identity)
            .zip(state.applied_hashes.get(&identity))
            .is_some_and(|(secret, applied)| secret.content_hash() == *applied))
    }
}

/// Backend answering from a fixed map of path to raw value
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    values: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    calls: Arc<AtomicUsize>,
    latency: Arc<Mutex<Duration>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub fn set(&self, path: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(path.to_string(), value.as_bytes().to_vec());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every call take `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Most calls ever running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.values
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| ProviderError::Backend(format!("secret {path} not found")))
    }
}

#[async_trait]
impl SecretsClient for FakeBackend {
    async fn get_secret(&self, reference: &RemoteReference) -> Result<Vec<u8>, ProviderError> {
        let raw = self.fetch(&reference.path).await?;
        match &reference.property {
            None => Ok(raw),
            Some(property) => {
                let fields: serde_json::Map<String, serde_json::Value> =
                    serde_json::from_slice(&raw)
                        .map_err(|e| ProviderError::Backend(e.to_string()))?;
                fields
                    .get(property)
                    .and_then(|v| v.as_str())
                    .map(|v| v.as_bytes().to_vec())
                    .ok_or_else(|| ProviderError::Backend(format!("property {property} not found")))
            }
        }
    }

    async fn get_secret_map(
        &self,
        reference: &RemoteReference,
    ) -> Result<BTreeMap<String, Vec<u8>>, ProviderError> {
        let raw = self.fetch(&reference.path).await?;
        let fields: BTreeMap<String, String> = serde_json::from_slice(&raw)
            .map_err(|e| ProviderError::Backend(format!("value of {} is not a JSON object: {e}", reference.path)))?;
        Ok(fields
            .into_iter()
            .map(|(k, v)| (k, v.into_bytes()))
            .collect())
    }
}

#[async_trait]
impl ClientFactory for FakeBackend {
    async fn client_for(
        &self,
        _store: &StoreConfig,
    ) -> Result<Box<dyn SecretsClient>, ProviderError> {
        Ok(Box::new(self.clone()))
    }
}

/// Reconciler wired to a fake cluster and backend
pub fn reconciler(cluster: &FakeCluster, backend: &FakeBackend) -> Arc<Reconciler> {
    Reconciler::new(
        Arc::new(cluster.clone()),
        Arc::new(backend.clone()),
        Scheduler::new(),
        ControllerConfig::default(),
    )
}

/// ExternalSecret `namespace/name` reading `dataFrom` paths from store `vault`
pub fn external_secret(
    namespace: &str,
    name: &str,
    refresh_interval: Option<&str>,
    data_from: &[&str],
) -> ExternalSecret {
    let mut spec = serde_json::json!({
        "storeRef": {"name": "vault"},
        "dataFrom": data_from.iter().map(|path| serde_json::json!({"path": path})).collect::<Vec<_>>()
    });
    if let Some(interval) = refresh_interval {
        spec["refreshInterval"] = serde_json::Value::String(interval.to_string());
    }
    serde_json::from_value(serde_json::json!({
        "apiVersion": "secret-sync.octopilot.io/v1alpha1",
        "kind": "ExternalSecret",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": format!("uid-{namespace}-{name}"),
            "generation": 1
        },
        "spec": spec
    }))
    .unwrap()
}
