//! # Store Resolver
//!
//! Turns a store's configuration into a ready backend client. Dispatch is a
//! single exhaustive match over [`StoreProvider`]; a new backend adds one arm
//! and one client type.

use super::aws::{self, AwsParameterStore, AwsSecretsManager, AwsSessionSpec};
use super::session::CredentialReader;
use super::vault::VaultClient;
use super::{ProviderError, SecretsClient};
use crate::crd::{StoreConfig, StoreProvider};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Builds backend clients for stores
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Construct a client for the store's single configured backend
    async fn client_for(&self, store: &StoreConfig)
        -> Result<Box<dyn SecretsClient>, ProviderError>;
}

/// Default factory backed by the real Vault and AWS clients
#[derive(Clone)]
pub struct StoreResolver {
    credentials: Arc<dyn CredentialReader>,
}

impl std::fmt::Debug for StoreResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreResolver").finish_non_exhaustive()
    }
}

impl StoreResolver {
    #[must_use]
    pub fn new(credentials: Arc<dyn CredentialReader>) -> Self {
        Self { credentials }
    }
}

/// Validate the one-of invariant, naming the store on failure
///
/// # Errors
///
/// Returns a config error when zero or several backends are set.
pub fn store_provider(store: &StoreConfig) -> Result<StoreProvider, ProviderError> {
    store.spec.provider().map_err(|e| {
        ProviderError::Config(format!(
            "{} does not have a valid client: {e}",
            store.display_name()
        ))
    })
}

#[async_trait]
impl ClientFactory for StoreResolver {
    async fn client_for(
        &self,
        store: &StoreConfig,
    ) -> Result<Box<dyn SecretsClient>, ProviderError> {
        let provider = store_provider(store)?;
        debug!(
            store = %store.display_name(),
            provider = provider.label(),
            "Resolving backend client"
        );
        let credentials = self.credentials.as_ref();

        let client: Box<dyn SecretsClient> = match provider {
            StoreProvider::Vault(vault) => {
                Box::new(VaultClient::connect(&vault, &store.namespace, credentials).await?)
            }
            StoreProvider::SecretsManager(sm) => {
                let sdk_config = aws::session(
                    AwsSessionSpec {
                        region: sm.region.as_deref(),
                        role: sm.role.as_deref(),
                        credentials_ref: sm.credentials_ref.as_ref(),
                    },
                    &store.namespace,
                    credentials,
                )
                .await?;
                Box::new(AwsSecretsManager::new(&sdk_config, sm.secret))
            }
            StoreProvider::ParameterStore(ps) => {
                let sdk_config = aws::session(
                    AwsSessionSpec {
                        region: ps.region.as_deref(),
                        role: ps.role.as_deref(),
                        credentials_ref: ps.credentials_ref.as_ref(),
                    },
                    &store.namespace,
                    credentials,
                )
                .await?;
                Box::new(AwsParameterStore::new(&sdk_config, ps.parameter))
            }
        };
        Ok(client)
    }
}
