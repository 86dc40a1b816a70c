//! # Provider Modules
//!
//! Backend clients for the external secret stores.
//!
//! Every backend implements [`SecretsClient`]. A client is built per sync cycle by
//! the [`resolver::StoreResolver`] from a store's configuration; sessions are not
//! cached across cycles.

use crate::crd::RemoteReference;
use crate::error::ErrorClass;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Read capability shared by all backends
#[async_trait]
pub trait SecretsClient: Send + Sync + std::fmt::Debug {
    /// Fetch one value. With `property` set the fetched value must be a flat JSON
    /// object containing that key.
    async fn get_secret(&self, reference: &RemoteReference) -> Result<Vec<u8>, ProviderError>;

    /// Fetch a flat JSON object and return it key by key
    async fn get_secret_map(
        &self,
        reference: &RemoteReference,
    ) -> Result<BTreeMap<String, Vec<u8>>, ProviderError>;
}

/// Errors raised while building or calling a backend client
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0}")]
    Config(String),
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    Backend(String),
}

impl ProviderError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::Config(_) => ErrorClass::Config,
            ProviderError::Auth(_) => ErrorClass::Auth,
            ProviderError::Backend(_) => ErrorClass::Backend,
        }
    }
}

// Common utilities shared across providers
pub mod common;
pub mod resolver;
pub mod session;
#[cfg(test)]
pub(crate) mod testing;

// Provider implementations
pub mod aws;
pub mod vault;
