//! # Credential Sessions
//!
//! Backends authenticate with material stored in Kubernetes Secrets. The
//! [`CredentialReader`] seam lets the resolver read that material without
//! depending on the Kubernetes client, so backends can be exercised in tests
//! with in-memory credentials.

use super::ProviderError;
use async_trait::async_trait;
use zeroize::Zeroizing;

/// Reads single keys out of Kubernetes Secrets
#[async_trait]
pub trait CredentialReader: Send + Sync {
    /// Raw bytes of `key` in Secret `namespace/name`
    async fn read_secret_key(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> anyhow::Result<Zeroizing<Vec<u8>>>;
}

/// Read a credential as UTF-8 text, mapping every failure to an auth error
///
/// # Errors
///
/// Returns [`ProviderError::Auth`] when the Secret or key is missing or the
/// value is not valid UTF-8.
pub async fn read_credential(
    reader: &dyn CredentialReader,
    namespace: &str,
    name: &str,
    key: &str,
) -> Result<Zeroizing<String>, ProviderError> {
    let raw = reader
        .read_secret_key(namespace, name, key)
        .await
        .map_err(|e| {
            ProviderError::Auth(format!(
                "could not read key {key} of secret {namespace}/{name}: {e:#}"
            ))
        })?;
    let text = std::str::from_utf8(&raw).map_err(|e| {
        ProviderError::Auth(format!(
            "key {key} of secret {namespace}/{name} is not valid UTF-8: {e}"
        ))
    })?;
    Ok(Zeroizing::new(text.trim().to_string()))
}
