//! # Merge Engine
//!
//! Builds the data of the target Secret from an ExternalSecret's references.
//!
//! 1. `dataFrom` maps are merged in declared order; later maps win on collision.
//! 2. `data` values are assigned under their `secretKey`, overriding anything
//!    from `dataFrom`.
//! 3. Every value is base64 encoded, the wire form of a Secret's `data`.
//!
//! The first failing fetch aborts the build, so a partial payload is never
//! returned.

use crate::crd::{ExternalSecretData, RemoteReference};
use crate::provider::{ProviderError, SecretsClient};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use std::collections::BTreeMap;
use tracing::debug;

/// Secret data keyed by Secret key, values base64 encoded
pub type SecretData = BTreeMap<String, String>;

/// Fetch and merge all references into base64-encoded Secret data
///
/// # Errors
///
/// Returns the first backend error, prefixed with the failing path. The
/// error class is preserved.
pub async fn build_secret_data(
    client: &dyn SecretsClient,
    data_from: &[RemoteReference],
    data: &[ExternalSecretData],
) -> Result<SecretData, ProviderError> {
    let mut merged: BTreeMap<String, Vec<u8>> = BTreeMap::new();

    for reference in data_from {
        let fields = client
            .get_secret_map(reference)
            .await
            .map_err(|e| at_path(&reference.path, e))?;
        debug!(
            path = %reference.path,
            keys = fields.len(),
            "Merged dataFrom reference"
        );
        merged.extend(fields);
    }

    for entry in data {
        let value = client
            .get_secret(&entry.remote_ref)
            .await
            .map_err(|e| at_path(&entry.remote_ref.path, e))?;
        merged.insert(entry.secret_key.clone(), value);
    }

    Ok(encode_values(merged))
}

/// Base64 encode every value
#[must_use]
pub fn encode_values(raw: BTreeMap<String, Vec<u8>>) -> SecretData {
    raw.into_iter()
        .map(|(key, value)| (key, BASE64_STANDARD.encode(value)))
        .collect()
}

fn at_path(path: &str, error: ProviderError) -> ProviderError {
    let prefixed = |message: String| format!("path {path:?}: {message}");
    match error {
        ProviderError::Config(message) => ProviderError::Config(prefixed(message)),
        ProviderError::Auth(message) => ProviderError::Auth(prefixed(message)),
        ProviderError::Backend(message) => ProviderError::Backend(prefixed(message)),
    }
}
