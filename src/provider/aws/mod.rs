//! # AWS Providers
//!
//! AWS Secrets Manager and Systems Manager Parameter Store clients, plus the
//! session setup both share.
//!
//! Credentials come from the store's `credentialsRef` Secret (keys
//! `accessKeyID` and `secretAccessKey`) or, when absent, from the SDK's default
//! chain (environment, IRSA, instance profile). When the store names a role the
//! base credentials are exchanged through STS `AssumeRole` for temporary ones.

pub mod parameter_store;
pub mod secrets_manager;

pub use parameter_store::{AwsParameterStore, ParameterStoreApi};
pub use secrets_manager::{AwsSecretsManager, SecretsManagerApi};

use crate::constants::{AWS_ACCESS_KEY_ID_KEY, AWS_ROLE_SESSION_NAME, AWS_SECRET_ACCESS_KEY_KEY};
use crate::crd::CredentialsRef;
use crate::provider::session::{read_credential, CredentialReader};
use crate::provider::ProviderError;
use aws_config::SdkConfig;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_credential_types::Credentials;
use aws_sdk_sts::error::DisplayErrorContext;
use tracing::{debug, info, info_span, Instrument};

/// Connection settings shared by both AWS store kinds
#[derive(Debug, Clone, Copy)]
pub struct AwsSessionSpec<'a> {
    pub region: Option<&'a str>,
    pub role: Option<&'a str>,
    pub credentials_ref: Option<&'a CredentialsRef>,
}

/// Build an authenticated SDK config for a store
///
/// # Errors
///
/// Returns an auth error when the credentials Secret cannot be read or the
/// role cannot be assumed.
pub async fn session(
    spec: AwsSessionSpec<'_>,
    default_namespace: &str,
    credentials: &dyn CredentialReader,
) -> Result<SdkConfig, ProviderError> {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = spec.region {
        loader = loader.region(aws_config::Region::new(region.to_string()));
    }
    match spec.credentials_ref {
        Some(credentials_ref) => {
            let static_credentials =
                credentials_from_secret(credentials_ref, default_namespace, credentials).await?;
            loader = loader.credentials_provider(static_credentials);
        }
        None => debug!("No credentialsRef configured, using default AWS credential chain"),
    }
    let base = loader.load().await;

    match spec.role {
        Some(role) => assume_role(base, role).await,
        None => Ok(base),
    }
}

/// Static credentials from a Kubernetes Secret
async fn credentials_from_secret(
    credentials_ref: &CredentialsRef,
    default_namespace: &str,
    credentials: &dyn CredentialReader,
) -> Result<Credentials, ProviderError> {
    let secret_ref = &credentials_ref.secret_ref;
    let namespace = secret_ref.namespace.as_deref().unwrap_or(default_namespace);

    let access_key_id =
        read_credential(credentials, namespace, &secret_ref.name, AWS_ACCESS_KEY_ID_KEY).await?;
    let secret_access_key =
        read_credential(credentials, namespace, &secret_ref.name, AWS_SECRET_ACCESS_KEY_KEY)
            .await?;

    Ok(Credentials::new(
        access_key_id.as_str(),
        secret_access_key.as_str(),
        None,
        None,
        "kubernetes-secret",
    ))
}

/// Exchange the base credentials for temporary role credentials
async fn assume_role(base: SdkConfig, role: &str) -> Result<SdkConfig, ProviderError> {
    let span = info_span!("aws.sts.assume_role", role = role);
    let sts = aws_sdk_sts::Client::new(&base);

    let output = sts
        .assume_role()
        .role_arn(role)
        .role_session_name(AWS_ROLE_SESSION_NAME)
        .send()
        .instrument(span)
        .await
        .map_err(|e| {
            ProviderError::Auth(format!(
                "unable to assume role {role}: {}",
                DisplayErrorContext(&e)
            ))
        })?;

    let temporary = output
        .credentials()
        .map(assumed_credentials)
        .ok_or_else(|| ProviderError::Auth(format!("assume role {role} returned no credentials")))?;
    info!(role = role, "Assumed AWS role");

    Ok(base
        .into_builder()
        .credentials_provider(SharedCredentialsProvider::new(temporary))
        .build())
}

/// Convert STS output into SDK credentials
fn assumed_credentials(sts: &aws_sdk_sts::types::Credentials) -> Credentials {
    Credentials::new(
        sts.access_key_id(),
        sts.secret_access_key(),
        Some(sts.session_token().to_string()),
        std::time::SystemTime::try_from(*sts.expiration()).ok(),
        "sts-assume-role",
    )
}
