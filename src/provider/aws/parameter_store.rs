//! # AWS Parameter Store Client
//!
//! Reads parameters with `GetParameter`, always decrypting `SecureString`
//! values. A reference version is expressed with the SSM selector syntax
//! `name:version`.

use crate::crd::RemoteReference;
use crate::provider::common::{join_prefix, record_provider_metrics, select_map, select_value};
use crate::provider::{ProviderError, SecretsClient};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ssm::error::DisplayErrorContext;
use aws_sdk_ssm::Client as SsmClient;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info_span, Instrument};

const PROVIDER: &str = "aws-parameter-store";

/// The single SSM call the controller makes
#[async_trait]
pub trait ParameterStoreApi: Send + Sync {
    /// Decrypted value of a parameter (name may carry a `:version` selector)
    async fn get_parameter(&self, name: &str) -> Result<String, ProviderError>;
}

#[async_trait]
impl ParameterStoreApi for SsmClient {
    async fn get_parameter(&self, name: &str) -> Result<String, ProviderError> {
        let output = self
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|e| {
                ProviderError::Backend(format!(
                    "GetParameter for {name} failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        output
            .parameter()
            .and_then(|p| p.value())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Backend(format!("parameter {name} has no value")))
    }
}

/// AWS Parameter Store provider implementation
pub struct AwsParameterStore {
    api: Box<dyn ParameterStoreApi>,
    parameter_path_prefix: Option<String>,
}

impl std::fmt::Debug for AwsParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsParameterStore")
            .field("parameter_path_prefix", &self.parameter_path_prefix)
            .finish_non_exhaustive()
    }
}

impl AwsParameterStore {
    /// Client for an authenticated session
    #[must_use]
    pub fn new(sdk_config: &SdkConfig, parameter_path_prefix: Option<String>) -> Self {
        Self::with_api(Box::new(SsmClient::new(sdk_config)), parameter_path_prefix)
    }

    #[must_use]
    pub fn with_api(
        api: Box<dyn ParameterStoreApi>,
        parameter_path_prefix: Option<String>,
    ) -> Self {
        Self {
            api,
            parameter_path_prefix,
        }
    }

    async fn fetch(&self, reference: &RemoteReference) -> Result<Vec<u8>, ProviderError> {
        let name = parameter_selector(
            &join_prefix(self.parameter_path_prefix.as_deref(), &reference.path),
            reference.version.as_deref(),
        );
        debug!(parameter.name = %name, "GetParameter");
        self.api.get_parameter(&name).await.map(String::into_bytes)
    }
}

/// SSM parameter selector for an optional version
fn parameter_selector(name: &str, version: Option<&str>) -> String {
    match version {
        Some(version) => format!("{name}:{version}"),
        None => name.to_string(),
    }
}

#[async_trait]
impl SecretsClient for AwsParameterStore {
    async fn get_secret(&self, reference: &RemoteReference) -> Result<Vec<u8>, ProviderError> {
        let span = info_span!("aws.parameter.get", parameter.path = %reference.path);
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
        let span = info_span!("aws.parameter.get_map", parameter.path = %reference.path);
        let start = Instant::now();

        let result = async { select_map(&self.fetch(reference).await?, reference) }
            .instrument(span)
            .await;

        record_provider_metrics(PROVIDER, "get_secret_map", start, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeParameterStore {
        values: HashMap<String, String>,
    }

    impl FakeParameterStore {
        fn with(mut self, name: &str, value: &str) -> Self {
            self.values.insert(name.to_string(), value.to_string());
            self
        }
    }

    #[async_trait]
    impl ParameterStoreApi for FakeParameterStore {
        async fn get_parameter(&self, name: &str) -> Result<String, ProviderError> {
            self.values
                .get(name)
                .cloned()
                .ok_or_else(|| ProviderError::Backend(format!("parameter {name} not found")))
        }
    }

    #[test]
    fn test_parameter_selector_appends_version() {
        assert_eq!(parameter_selector("/app/db", None), "/app/db");
        assert_eq!(parameter_selector("/app/db", Some("3")), "/app/db:3");
    }

    #[tokio::test]
    async fn test_get_secret_returns_raw_value_without_property() {
        let client = AwsParameterStore::with_api(
            Box::new(FakeParameterStore::default().with("/prod/api-key", "abc123")),
            Some("/prod".to_string()),
        );

        let value = client
            .get_secret(&RemoteReference::new("api-key"))
            .await
            .unwrap();
        assert_eq!(value, b"abc123");
    }

    #[tokio::test]
    async fn test_get_secret_map_and_property() {
        let client = AwsParameterStore::with_api(
            Box::new(
                FakeParameterStore::default()
                    .with("/app/db:2", r#"{"user":"admin","password":"pw"}"#),
            ),
            None,
        );

        let mut reference = RemoteReference::new("/app/db");
        reference.version = Some("2".to_string());

        let map = client.get_secret_map(&reference).await.unwrap();
        assert_eq!(map.len(), 2);

        reference.property = Some("password".to_string());
        assert_eq!(client.get_secret(&reference).await.unwrap(), b"pw");
    }

    #[tokio::test]
    async fn test_invalid_json_for_map_is_backend_error() {
        let client = AwsParameterStore::with_api(
            Box::new(FakeParameterStore::default().with("/app/flag", "true-ish")),
            None,
        );
        let result = client.get_secret_map(&RemoteReference::new("/app/flag")).await;
        assert!(matches!(result, Err(ProviderError::Backend(_))));
    }
}
