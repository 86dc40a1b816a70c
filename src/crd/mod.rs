//! # Custom Resource Definitions
//!
//! CRD types for the External Secret Controller.
//!
//! ## Module Structure
//!
//! - `external_secret.rs` - ExternalSecret request and remote references
//! - `store.rs` - SecretStore / ClusterSecretStore and backend configuration
//! - `status.rs` - Status types for tracking sync state
//! - `generate.rs` - CRD manifests for the `crdgen` binary

mod external_secret;
pub mod generate;
mod status;
mod store;

pub use external_secret::{
    ExternalSecret, ExternalSecretData, ExternalSecretSpec, RemoteReference, StoreKind, StoreRef,
};
pub use status::{Condition, ExternalSecretStatus};
pub use store::{
    AwsParameterStoreStore, AwsSecretsManagerStore, ClusterSecretStore, ClusterSecretStoreSpec,
    CredentialsRef, OneOfError, SecretKeySelector, SecretReference, SecretStore, SecretStoreSpec,
    StoreConfig, StoreProvider, StoreProviderSpec, VaultAppRole, VaultAuth, VaultAuthMethod,
    VaultKubernetesAuth, VaultKvVersion, VaultStore,
};
