//! # Reconciler
//!
//! Core reconciliation logic for `ExternalSecret` resources.
//!
//! The reconciler:
//! - Watches `ExternalSecret` resources across all namespaces
//! - Resolves the referenced `SecretStore` / `ClusterSecretStore`
//! - Fetches values from Vault, AWS Secrets Manager or AWS Parameter Store
//! - Writes the merged result to a Kubernetes Secret owned by the ExternalSecret
//! - Updates resource status with the outcome of each cycle
//!
//! ## Sync Cycle
//!
//! 1. Re-read the ExternalSecret and validate it
//! 2. Register or drop its periodic schedule
//! 3. Skip one-shot ExternalSecrets that already synced
//! 4. Look up the store and build a backend client
//! 5. Merge `dataFrom` then `data`, overlay `template`
//! 6. Server-side apply the Secret
//! 7. Update status

pub mod merge;
pub mod policy;
pub mod reconcile;
pub mod secret;
pub mod status;
pub mod store;
pub mod template;
pub mod types;
pub mod validation;

// Re-export public API
pub use reconcile::{reconcile, release_if_deleted, sync_external_secret};
pub use secret::DesiredSecret;
pub use store::{KubeObjectStore, ObjectStore};
pub use types::{
    BackoffState, CycleOutcome, Reconciler, ReconcilerError, SyncError, SyncPhase, TriggerSource,
};
