//! # AWS Secrets Manager Client
//!
//! Reads secrets with `GetSecretValue`. `SecretString` is preferred; binary
//! secrets fall back to `SecretBinary`.

use crate::crd::RemoteReference;
use crate::provider::common::{join_prefix, record_provider_metrics, select_map, select_value};
use crate::provider::{ProviderError, SecretsClient};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info_span, Instrument};

const PROVIDER: &str = "aws-secrets-manager";

/// The single Secrets Manager call the controller makes
#[async_trait]
pub trait SecretsManagerApi: Send + Sync {
    async fn get_secret_value(
        &self,
        secret_id: &str,
        version_id: Option<&str>,
    ) -> Result<Vec<u8>, ProviderError>;
}

#[async_trait]
impl SecretsManagerApi for SecretsManagerClient {
    async fn get_secret_value(
        &self,
        secret_id: &str,
        version_id: Option<&str>,
    ) -> Result<Vec<u8>, ProviderError> {
        let output = self
            .get_secret_value()
            .secret_id(secret_id)
            .set_version_id(version_id.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                ProviderError::Backend(format!(
                    "GetSecretValue for {secret_id} failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        if let Some(text) = output.secret_string() {
            Ok(text.as_bytes().to_vec())
        } else if let Some(binary) = output.secret_binary() {
            Ok(binary.as_ref().to_vec())
        } else {
            Err(ProviderError::Backend(format!(
                "secret {secret_id} has neither a string nor a binary value"
            )))
        }
    }
}

/// AWS Secrets Manager provider implementation
pub struct AwsSecretsManager {
    api: Box<dyn SecretsManagerApi>,
    prefix: Option<String>,
}

impl std::fmt::Debug for AwsSecretsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSecretsManager")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl AwsSecretsManager {
    /// Client for an authenticated session
    #[must_use]
    pub fn new(sdk_config: &SdkConfig, prefix: Option<String>) -> Self {
        Self::with_api(Box::new(SecretsManagerClient::new(sdk_config)), prefix)
    }

    #[must_use]
    pub fn with_api(api: Box<dyn SecretsManagerApi>, prefix: Option<String>) -> Self {
        Self { api, prefix }
    }

    async fn fetch(&self, reference: &RemoteReference) -> Result<Vec<u8>, ProviderError> {
        let secret_id = join_prefix(self.prefix.as_deref(), &reference.path);
        debug!(secret.id = %secret_id, version = ?reference.version, "GetSecretValue");
        self.api
            .get_secret_value(&secret_id, reference.version.as_deref())
            .await
    }
}

#[async_trait]
impl SecretsClient for AwsSecretsManager {
    async fn get_secret(&self, reference: &RemoteReference) -> Result<Vec<u8>, ProviderError> {
        let span = info_span!("aws.secret.get", secret.path = %reference.path);
        let start = Instant::now();

        let result = async { select_value(self.fetch(reference).await?, reference) }
            .instrument(span)
            .await;

        record_provider_metrics(PROVIDER, "get_secret", start, &result);
        result
    }

    async fn get_secret_map(
        &self,
        reference: &RemoteReference,
    ) -> Result<BTreeMap<String, Vec<u8>>, ProviderError> {
        let span = info_span!("aws.secret.get_map", secret.path = %reference.path);
        let start = Instant::now();

        let result = async { select_map(&self.fetch(reference).await?, reference) }
            .instrument(span)
            .await;

        record_provider_metrics(PROVIDER, "get_secret_map", start, &result);
        result
    }
}
