//! # Vault Authentication
//!
//! Token, AppRole and Kubernetes service account logins. Each method produces a
//! client token used for subsequent KV reads.

use crate::crd::{VaultAppRole, VaultAuthMethod, VaultKubernetesAuth};
use crate::provider::session::{read_credential, CredentialReader};
use crate::provider::ProviderError;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

/// Projected service account token of the controller pod
const SERVICE_ACCOUNT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

#[derive(Serialize)]
struct AppRoleLogin<'a> {
    role_id: &'a str,
    secret_id: &'a str,
}

#[derive(Serialize)]
struct KubernetesLogin<'a> {
    role: &'a str,
    jwt: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: Option<LoginAuth>,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
}

/// Login request context
pub(super) struct Login<'a> {
    pub http: &'a reqwest::Client,
    pub server: &'a str,
    pub namespace: Option<&'a str>,
    /// Namespace for secret references without an explicit namespace
    pub default_namespace: &'a str,
    pub credentials: &'a dyn CredentialReader,
}

impl Login<'_> {
    /// Obtain a client token for the configured auth method
    pub(super) async fn token(
        &self,
        method: &VaultAuthMethod,
    ) -> Result<Zeroizing<String>, ProviderError> {
        match method {
            VaultAuthMethod::Token(selector) => {
                let namespace = selector
                    .namespace
                    .as_deref()
                    .unwrap_or(self.default_namespace);
                read_credential(self.credentials, namespace, &selector.name, &selector.key).await
            }
            VaultAuthMethod::AppRole(app_role) => self.app_role(app_role).await,
            VaultAuthMethod::Kubernetes(kubernetes) => self.kubernetes(kubernetes).await,
        }
    }

    async fn app_role(&self, app_role: &VaultAppRole) -> Result<Zeroizing<String>, ProviderError> {
        let selector = &app_role.secret_ref;
        let namespace = selector
            .namespace
            .as_deref()
            .unwrap_or(self.default_namespace);
        let secret_id =
            read_credential(self.credentials, namespace, &selector.name, &selector.key).await?;

        debug!(mount = %app_role.path, "Vault AppRole login");
        self.login(
            &app_role.path,
            &AppRoleLogin {
                role_id: &app_role.role_id,
                secret_id: &secret_id,
            },
        )
        .await
    }

    async fn kubernetes(
        &self,
        kubernetes: &VaultKubernetesAuth,
    ) -> Result<Zeroizing<String>, ProviderError> {
        let jwt = match &kubernetes.secret_ref {
            Some(selector) => {
                let namespace = selector
                    .namespace
                    .as_deref()
                    .unwrap_or(self.default_namespace);
                read_credential(self.credentials, namespace, &selector.name, &selector.key)
                    .await?
            }
            None => tokio::fs::read_to_string(SERVICE_ACCOUNT_TOKEN_PATH)
                .await
                .map(|t| Zeroizing::new(t.trim().to_string()))
                .map_err(|e| {
                    ProviderError::Auth(format!(
                        "could not read service account token {SERVICE_ACCOUNT_TOKEN_PATH}: {e}"
                    ))
                })?,
        };

        debug!(mount = %kubernetes.mount_path, role = %kubernetes.role, "Vault Kubernetes login");
        self.login(
            &kubernetes.mount_path,
            &KubernetesLogin {
                role: &kubernetes.role,
                jwt: &jwt,
            },
        )
        .await
    }

    async fn login<B: Serialize + Sync>(
        &self,
        mount: &str,
        body: &B,
    ) -> Result<Zeroizing<String>, ProviderError> {
        let url = format!(
            "{}/v1/auth/{}/login",
            self.server.trim_end_matches('/'),
            mount.trim_matches('/')
        );
        let mut request = self.http.post(&url).json(body);
        if let Some(namespace) = self.namespace {
            request = request.header("X-Vault-Namespace", namespace);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Auth(format!("vault login at {url} failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Auth(format!(
                "vault login at {url} returned {status}"
            )));
        }

        let body: LoginResponse = response.json().await.map_err(|e| {
            ProviderError::Auth(format!("vault login at {url} returned invalid JSON: {e}"))
        })?;
        body.auth
            .map(|auth| Zeroizing::new(auth.client_token))
            .ok_or_else(|| ProviderError::Auth(format!("vault login at {url} returned no token")))
    }
}
