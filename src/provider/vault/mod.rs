//! # Vault KV Client
//!
//! Native HTTP client for the HashiCorp Vault KV secrets engine (v1 and v2).
//! Uses reqwest for HTTP requests; authentication lives in [`auth`].
//!
//! References:
//! - [KV v1 API](https://developer.hashicorp.com/vault/api-docs/secret/kv/kv-v1)
//! - [KV v2 API](https://developer.hashicorp.com/vault/api-docs/secret/kv/kv-v2)

mod auth;

use crate::crd::{RemoteReference, VaultKvVersion, VaultStore};
use crate::provider::common::{
    extract_property, json_value_bytes, object_to_bytes, record_provider_metrics,
};
use crate::provider::session::CredentialReader;
use crate::provider::{ProviderError, SecretsClient};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info_span, Instrument};
use zeroize::Zeroizing;

const PROVIDER: &str = "vault";

/// Vault KV client bound to one mount and one client token
pub struct VaultClient {
    http: reqwest::Client,
    server: String,
    mount: String,
    version: VaultKvVersion,
    namespace: Option<String>,
    token: Zeroizing<String>,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("server", &self.server)
            .field("mount", &self.mount)
            .field("version", &self.version)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl VaultClient {
    /// Build an HTTP client for the store and log in with its auth method
    ///
    /// # Errors
    ///
    /// Config errors for an invalid auth block or CA bundle, auth errors when
    /// the login fails.
    pub async fn connect(
        store: &VaultStore,
        default_namespace: &str,
        credentials: &dyn CredentialReader,
    ) -> Result<Self, ProviderError> {
        let method = store
            .auth
            .method()
            .map_err(|e| ProviderError::Config(format!("vault store {}: {e}", store.server)))?;
        let http = build_http_client(store.ca_bundle.as_deref())?;

        let token = auth::Login {
            http: &http,
            server: &store.server,
            namespace: store.namespace.as_deref(),
            default_namespace,
            credentials,
        }
        .token(&method)
        .await?;

        Ok(Self::with_token(http, store, token))
    }

    /// Client for an already obtained token
    #[must_use]
    pub fn with_token(http: reqwest::Client, store: &VaultStore, token: Zeroizing<String>) -> Self {
        Self {
            http,
            server: store.server.trim_end_matches('/').to_string(),
            mount: store.path.clone(),
            version: store.version,
            namespace: store.namespace.clone(),
            token,
        }
    }

    /// Read the key/value fields stored at a reference
    async fn read(&self, reference: &RemoteReference) -> Result<Map<String, Value>, ProviderError> {
        let path = kv_read_path(&self.mount, self.version, &reference.path);
        let url = format!("{}/v1/{path}", self.server);

        let mut request = self
            .http
            .get(&url)
            .header("X-Vault-Token", self.token.as_str());
        if let Some(namespace) = &self.namespace {
            request = request.header("X-Vault-Namespace", namespace);
        }
        match (self.version, reference.version.as_deref()) {
            (VaultKvVersion::V2, Some(version)) => {
                request = request.query(&[("version", version)]);
            }
            (VaultKvVersion::V1, Some(version)) => {
                debug!(path = %path, version = %version, "KV v1 has no versions, ignoring");
            }
            (_, None) => {}
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Backend(format!("vault read of {path} failed: {e}")))?;
        let status = response.status();
        match status.as_u16() {
            404 => {
                return Err(ProviderError::Backend(format!(
                    "secret {path} not found in vault"
                )))
            }
            401 | 403 => {
                return Err(ProviderError::Auth(format!(
                    "vault denied read of {path}: {status}"
                )))
            }
            _ if !status.is_success() => {
                return Err(ProviderError::Backend(format!(
                    "vault read of {path} returned {status}"
                )))
            }
            _ => {}
        }

        let body: Value = response.json().await.map_err(|e| {
            ProviderError::Backend(format!("vault read of {path} returned invalid JSON: {e}"))
        })?;
        let data = match self.version {
            VaultKvVersion::V1 => body.get("data"),
            VaultKvVersion::V2 => body.get("data").and_then(|d| d.get("data")),
        };
        match data {
            Some(Value::Object(fields)) => Ok(fields.clone()),
            _ => Err(ProviderError::Backend(format!(
                "vault secret {path} has no key/value data"
            ))),
        }
    }
}

#[async_trait]
impl SecretsClient for VaultClient {
    async fn get_secret(&self, reference: &RemoteReference) -> Result<Vec<u8>, ProviderError> {
        let span = info_span!("vault.secret.get", secret.path = %reference.path);
        let start = Instant::now();

        let result = async {
            let fields = self.read(reference).await?;
            match reference.property.as_deref() {
                Some(property) => extract_property(&fields, property, &reference.path),
                None => {
                    let mut values = fields.values();
                    match (values.next(), values.next()) {
                        (Some(value), None) => Ok(json_value_bytes(value)),
                        _ => Err(ProviderError::Backend(format!(
                            "secret {} has {} fields, set a property to select one",
                            reference.path,
                            fields.len()
                        ))),
                    }
                }
            }
        }
        .instrument(span)
        .await;

        record_provider_metrics(PROVIDER, "get_secret", start, &result);
        result
    }

    async fn get_secret_map(
        &self,
        reference: &RemoteReference,
    ) -> Result<BTreeMap<String, Vec<u8>>, ProviderError> {
        let span = info_span!("vault.secret.get_map", secret.path = %reference.path);
        let start = Instant::now();

        let result = self
            .read(reference)
            .instrument(span)
            .await
            .map(|fields| object_to_bytes(&fields));

        record_provider_metrics(PROVIDER, "get_secret_map", start, &result);
        result
    }
}

/// API path for reading `path` from the KV mount
///
/// KV v2 reads go through the `data/` segment, which is inserted unless the
/// configured mount already ends with it (`secret/data`). A mount named
/// `data` is a mount like any other. KV v1 paths are used as-is.
#[must_use]
pub fn kv_read_path(mount: &str, version: VaultKvVersion, path: &str) -> String {
    let mount = mount.trim_matches('/');
    let path = path.trim_start_matches('/');
    match version {
        VaultKvVersion::V1 => format!("{mount}/{path}"),
        VaultKvVersion::V2 if mount.ends_with("/data") => format!("{mount}/{path}"),
        VaultKvVersion::V2 => format!("{mount}/data/{path}"),
    }
}

fn build_http_client(ca_bundle: Option<&str>) -> Result<reqwest::Client, ProviderError> {
    let mut builder = reqwest::Client::builder();
    if let Some(encoded) = ca_bundle {
        let pem = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| ProviderError::Config(format!("caBundle is not valid base64: {e}")))?;
        let certificates = reqwest::Certificate::from_pem_bundle(&pem)
            .map_err(|e| ProviderError::Config(format!("caBundle is not valid PEM: {e}")))?;
        for certificate in certificates {
            builder = builder.add_root_certificate(certificate);
        }
    }
    builder
        .build()
        .map_err(|e| ProviderError::Config(format!("could not build vault HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{SecretKeySelector, VaultAppRole, VaultAuth};
    use crate::provider::session::testing::StaticCredentials;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &str, version: VaultKvVersion) -> VaultStore {
        VaultStore {
            server: server.to_string(),
            path: "secret".to_string(),
            version,
            namespace: None,
            ca_bundle: None,
            auth: VaultAuth {
                token_secret_ref: Some(SecretKeySelector {
                    name: "vault-token".to_string(),
                    namespace: None,
                    key: "token".to_string(),
                }),
                app_role: None,
                kubernetes: None,
            },
        }
    }

    fn token_credentials() -> StaticCredentials {
        StaticCredentials::default().with("apps", "vault-token", "token", "s.test")
    }

    #[test]
    fn test_kv_read_path_inserts_data_segment_for_v2() {
        assert_eq!(kv_read_path("secret", VaultKvVersion::V2, "app/db"), "secret/data/app/db");
        assert_eq!(kv_read_path("/secret/", VaultKvVersion::V2, "/app"), "secret/data/app");
        assert_eq!(kv_read_path("secret/data", VaultKvVersion::V2, "app"), "secret/data/app");
    }

    #[test]
    fn test_kv_read_path_only_trusts_a_trailing_data_segment() {
        assert_eq!(kv_read_path("data", VaultKvVersion::V2, "app"), "data/data/app");
        assert_eq!(
            kv_read_path("data/team", VaultKvVersion::V2, "app"),
            "data/team/data/app"
        );
        assert_eq!(kv_read_path("metadata", VaultKvVersion::V2, "app"), "metadata/data/app");
    }

    #[test]
    fn test_kv_read_path_leaves_v1_unchanged() {
        assert_eq!(kv_read_path("secret", VaultKvVersion::V1, "app/db"), "secret/app/db");
    }

    #[test]
    fn test_invalid_ca_bundle_is_config_error() {
        assert!(matches!(
            build_http_client(Some("%%%not-base64")),
            Err(ProviderError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_get_secret_map_reads_kv_v2() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/app/db"))
            .and(header("X-Vault-Token", "s.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "data": {"user": "admin", "password": "hunter2"},
                    "metadata": {"version": 3}
                }
            })))
            .mount(&server)
            .await;

        let client = VaultClient::connect(
            &store(&server.uri(), VaultKvVersion::V2),
            "apps",
            &token_credentials(),
        )
        .await
        .unwrap();
        let map = client
            .get_secret_map(&RemoteReference::new("app/db"))
            .await
            .unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map["user"], b"admin");
        assert_eq!(map["password"], b"hunter2");
    }

    #[tokio::test]
    async fn test_get_secret_reads_kv_v1_property() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/app/db"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"user": "admin", "password": "hunter2"}
            })))
            .mount(&server)
            .await;

        let client = VaultClient::connect(
            &store(&server.uri(), VaultKvVersion::V1),
            "apps",
            &token_credentials(),
        )
        .await
        .unwrap();
        let value = client
            .get_secret(&RemoteReference::new("app/db").with_property("password"))
            .await
            .unwrap();

        assert_eq!(value, b"hunter2");
    }

    #[tokio::test]
    async fn test_get_secret_without_property_requires_single_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/single"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"data": {"token": "abc"}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/multi"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"data": {"a": "1", "b": "2"}}
            })))
            .mount(&server)
            .await;

        let client = VaultClient::connect(
            &store(&server.uri(), VaultKvVersion::V2),
            "apps",
            &token_credentials(),
        )
        .await
        .unwrap();

        let single = client.get_secret(&RemoteReference::new("single")).await;
        assert_eq!(single.unwrap(), b"abc");

        let multi = client.get_secret(&RemoteReference::new("multi")).await;
        assert!(matches!(multi, Err(ProviderError::Backend(_))));
    }

    #[tokio::test]
    async fn test_missing_property_and_not_found_are_backend_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/app/db"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"data": {"user": "admin"}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/absent"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({"errors": []})))
            .mount(&server)
            .await;

        let client = VaultClient::connect(
            &store(&server.uri(), VaultKvVersion::V2),
            "apps",
            &token_credentials(),
        )
        .await
        .unwrap();

        let missing = client
            .get_secret(&RemoteReference::new("app/db").with_property("password"))
            .await;
        assert!(matches!(missing, Err(ProviderError::Backend(_))));

        let absent = client.get_secret_map(&RemoteReference::new("absent")).await;
        assert!(matches!(absent, Err(ProviderError::Backend(_))));
    }

    #[tokio::test]
    async fn test_forbidden_read_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/app/db"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = VaultClient::connect(
            &store(&server.uri(), VaultKvVersion::V2),
            "apps",
            &token_credentials(),
        )
        .await
        .unwrap();
        let result = client.get_secret_map(&RemoteReference::new("app/db")).await;
        assert!(matches!(result, Err(ProviderError::Auth(_))));
    }

    #[tokio::test]
    async fn test_version_and_namespace_are_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/app/db"))
            .and(query_param("version", "2"))
            .and(header("X-Vault-Namespace", "team-a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"data": {"password": "old"}}
            })))
            .mount(&server)
            .await;

        let mut vault = store(&server.uri(), VaultKvVersion::V2);
        vault.namespace = Some("team-a".to_string());
        let client = VaultClient::connect(&vault, "apps", &token_credentials())
            .await
            .unwrap();

        let mut reference = RemoteReference::new("app/db").with_property("password");
        reference.version = Some("2".to_string());
        assert_eq!(client.get_secret(&reference).await.unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_app_role_login_exchanges_secret_id_for_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/approle/login"))
            .and(body_json(serde_json::json!({
                "role_id": "reader",
                "secret_id": "sid-123"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "auth": {"client_token": "s.from-approle"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/app"))
            .and(header("X-Vault-Token", "s.from-approle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"data": {"key": "value"}}
            })))
            .mount(&server)
            .await;

        let mut vault = store(&server.uri(), VaultKvVersion::V2);
        vault.auth = VaultAuth {
            token_secret_ref: None,
            app_role: Some(VaultAppRole {
                path: "approle".to_string(),
                role_id: "reader".to_string(),
                secret_ref: SecretKeySelector {
                    name: "approle".to_string(),
                    namespace: Some("vault-system".to_string()),
                    key: "secret-id".to_string(),
                },
            }),
            kubernetes: None,
        };
        let credentials =
            StaticCredentials::default().with("vault-system", "approle", "secret-id", "sid-123");

        let client = VaultClient::connect(&vault, "apps", &credentials).await.unwrap();
        let value = client.get_secret(&RemoteReference::new("app")).await.unwrap();
        assert_eq!(value, b"value");
    }

    #[tokio::test]
    async fn test_failed_login_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/approle/login"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let mut vault = store(&server.uri(), VaultKvVersion::V2);
        vault.auth = VaultAuth {
            token_secret_ref: None,
            app_role: Some(VaultAppRole {
                path: "approle".to_string(),
                role_id: "reader".to_string(),
                secret_ref: SecretKeySelector {
                    name: "approle".to_string(),
                    namespace: None,
                    key: "secret-id".to_string(),
                },
            }),
            kubernetes: None,
        };
        let credentials = StaticCredentials::default().with("apps", "approle", "secret-id", "x");

        let err = VaultClient::connect(&vault, "apps", &credentials)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Auth(_)));
    }
}
