//! In-memory backend used by merge and reconciler tests.

use super::common::{select_map, select_value};
use super::resolver::ClientFactory;
use super::{ProviderError, SecretsClient};
use crate::crd::{RemoteReference, StoreConfig};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Backend serving fixed values by path and counting every call
#[derive(Debug, Clone, Default)]
pub struct FakeSecretsClient {
    values: Arc<HashMap<String, Vec<u8>>>,
    calls: Arc<AtomicUsize>,
}

impl FakeSecretsClient {
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        Self {
            values: Arc::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fetch(&self, path: &str) -> Result<Vec<u8>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.values
            .get(path)
            .cloned()
            .ok_or_else(|| ProviderError::Backend(format!("secret {path} not found")))
    }
}

#[async_trait]
impl SecretsClient for FakeSecretsClient {
    async fn get_secret(&self, reference: &RemoteReference) -> Result<Vec<u8>, ProviderError> {
        select_value(self.fetch(&reference.path)?, reference)
    }

    async fn get_secret_map(
        &self,
        reference: &RemoteReference,
    ) -> Result<BTreeMap<String, Vec<u8>>, ProviderError> {
        select_map(&self.fetch(&reference.path)?, reference)
    }
}

/// Factory handing out clones of one fake client, or a fixed setup error
#[derive(Debug, Clone, Default)]
pub struct FakeClientFactory {
    pub client: FakeSecretsClient,
    pub setup_error: Option<String>,
}

#[async_trait]
impl ClientFactory for FakeClientFactory {
    async fn client_for(
        &self,
        _store: &StoreConfig,
    ) -> Result<Box<dyn SecretsClient>, ProviderError> {
        match &self.setup_error {
            Some(message) => Err(ProviderError::Auth(message.clone())),
            None => Ok(Box::new(self.client.clone())),
        }
    }
}
