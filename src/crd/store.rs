//! # Store Definitions
//!
//! `SecretStore` (namespaced) and `ClusterSecretStore` (cluster-scoped) carry the
//! connection details for exactly one backend. The wire shape keeps one optional
//! block per backend for schema compatibility; [`StoreProviderSpec::provider`]
//! turns it into the [`StoreProvider`] sum type the rest of the controller uses.

use super::external_secret::StoreKind;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Namespaced store, usable by ExternalSecrets in the same namespace
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "SecretStore",
    group = "secret-sync.octopilot.io",
    version = "v1alpha1",
    namespaced,
    shortname = "ss"
)]
#[serde(rename_all = "camelCase")]
pub struct SecretStoreSpec {
    #[serde(flatten)]
    pub provider: StoreProviderSpec,
}

/// Cluster-scoped store, usable by ExternalSecrets in any namespace
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "ClusterSecretStore",
    group = "secret-sync.octopilot.io",
    version = "v1alpha1",
    shortname = "css"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSecretStoreSpec {
    #[serde(flatten)]
    pub provider: StoreProviderSpec,
}

/// Backend blocks; exactly one must be set
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoreProviderSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault: Option<VaultStore>,
    #[serde(
        default,
        alias = "AWSSecretManager",
        skip_serializing_if = "Option::is_none"
    )]
    pub aws_secrets_manager: Option<AwsSecretsManagerStore>,
    #[serde(
        default,
        alias = "AWSParameterStore",
        skip_serializing_if = "Option::is_none"
    )]
    pub aws_parameter_store: Option<AwsParameterStoreStore>,
}

/// HashiCorp Vault KV store
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VaultStore {
    /// Vault address, e.g. `https://vault.example.com:8200`
    pub server: String,
    /// KV engine mount path
    #[serde(default = "default_vault_path")]
    pub path: String,
    /// KV engine version
    #[serde(default)]
    pub version: VaultKvVersion,
    /// Vault Enterprise namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Base64-encoded PEM bundle used to verify the server certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,
    pub auth: VaultAuth,
}

fn default_vault_path() -> String {
    crate::constants::DEFAULT_VAULT_KV_PATH.to_string()
}

/// KV secrets engine version
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VaultKvVersion {
    V1,
    #[default]
    V2,
}

/// Vault authentication; exactly one method must be set
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VaultAuth {
    /// Secret key holding a Vault token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_secret_ref: Option<SecretKeySelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_role: Option<VaultAppRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<VaultKubernetesAuth>,
}

/// AppRole login
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VaultAppRole {
    /// Auth mount path
    #[serde(default = "default_approle_path")]
    pub path: String,
    pub role_id: String,
    /// Secret key holding the AppRole secret id
    pub secret_ref: SecretKeySelector,
}

fn default_approle_path() -> String {
    crate::constants::DEFAULT_VAULT_APPROLE_PATH.to_string()
}

/// Kubernetes service account login
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VaultKubernetesAuth {
    /// Auth mount path
    #[serde(default = "default_kubernetes_path")]
    pub mount_path: String,
    /// Vault role bound to the service account
    pub role: String,
    /// Secret key holding a service account JWT.
    /// Defaults to the controller's own projected token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretKeySelector>,
}

fn default_kubernetes_path() -> String {
    crate::constants::DEFAULT_VAULT_KUBERNETES_PATH.to_string()
}

/// AWS Secrets Manager store
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AwsSecretsManagerStore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Role ARN assumed through STS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Name prefix joined in front of every remote path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(
        default,
        alias = "credentials",
        skip_serializing_if = "Option::is_none"
    )]
    pub credentials_ref: Option<CredentialsRef>,
}

/// AWS Systems Manager Parameter Store store
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AwsParameterStoreStore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Role ARN assumed through STS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Parameter path prefix joined in front of every remote path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    #[serde(
        default,
        alias = "credentials",
        skip_serializing_if = "Option::is_none"
    )]
    pub credentials_ref: Option<CredentialsRef>,
}

/// Secret holding `accessKeyID` and `secretAccessKey`
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsRef {
    pub secret_ref: SecretReference,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Single key of a Kubernetes Secret
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub key: String,
}

/// Store contents once the one-of invariant holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreProvider {
    Vault(VaultStore),
    SecretsManager(AwsSecretsManagerStore),
    ParameterStore(AwsParameterStoreStore),
}

impl StoreProvider {
    /// Provider label used in logs and metrics
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            StoreProvider::Vault(_) => "vault",
            StoreProvider::SecretsManager(_) => "aws-secrets-manager",
            StoreProvider::ParameterStore(_) => "aws-parameter-store",
        }
    }
}

/// Vault auth once the one-of invariant holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultAuthMethod {
    Token(SecretKeySelector),
    AppRole(VaultAppRole),
    Kubernetes(VaultKubernetesAuth),
}

/// A one-of block with zero or several members set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OneOfError {
    #[error("no {0} configured")]
    Missing(&'static str),
    #[error("more than one {what} configured: {}", .set.join(", "))]
    Ambiguous {
        what: &'static str,
        set: Vec<&'static str>,
    },
}

/// Picks the single populated variant out of a list of optional blocks
fn exactly_one<T>(
    what: &'static str,
    candidates: Vec<(&'static str, Option<T>)>,
) -> Result<T, OneOfError> {
    let mut set: Vec<(&'static str, T)> = candidates
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect();
    match set.len() {
        0 => Err(OneOfError::Missing(what)),
        1 => Ok(set.remove(0).1),
        _ => Err(OneOfError::Ambiguous {
            what,
            set: set.into_iter().map(|(name, _)| name).collect(),
        }),
    }
}

impl StoreProviderSpec {
    /// Resolve the populated backend block
    ///
    /// # Errors
    ///
    /// Returns an error when zero or more than one backend is set.
    pub fn provider(&self) -> Result<StoreProvider, OneOfError> {
        exactly_one(
            "backend",
            vec![
                ("vault", self.vault.clone().map(StoreProvider::Vault)),
                (
                    "awsSecretsManager",
                    self.aws_secrets_manager
                        .clone()
                        .map(StoreProvider::SecretsManager),
                ),
                (
                    "awsParameterStore",
                    self.aws_parameter_store
                        .clone()
                        .map(StoreProvider::ParameterStore),
                ),
            ],
        )
    }
}

impl VaultAuth {
    /// Resolve the populated auth method
    ///
    /// # Errors
    ///
    /// Returns an error when zero or more than one method is set.
    pub fn method(&self) -> Result<VaultAuthMethod, OneOfError> {
        exactly_one(
            "vault auth method",
            vec![
                (
                    "tokenSecretRef",
                    self.token_secret_ref.clone().map(VaultAuthMethod::Token),
                ),
                ("appRole", self.app_role.clone().map(VaultAuthMethod::AppRole)),
                (
                    "kubernetes",
                    self.kubernetes.clone().map(VaultAuthMethod::Kubernetes),
                ),
            ],
        )
    }
}

/// A store looked up for one ExternalSecret
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub name: String,
    pub kind: StoreKind,
    /// Namespace credential references default to: the store's own namespace for
    /// a `SecretStore`, the requesting ExternalSecret's namespace otherwise
    pub namespace: String,
    pub spec: StoreProviderSpec,
}

impl StoreConfig {
    /// `Kind/name` label used in error messages
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}
