//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Requeue delay signalled to the watch source after a failed cycle (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 30;

/// Fibonacci backoff floor for repeated reconciliation errors (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 30;

/// Fibonacci backoff ceiling for repeated reconciliation errors (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Initial watch stream backoff after API server throttling (milliseconds)
pub const DEFAULT_WATCH_BACKOFF_START_MS: u64 = 1_000;

/// Maximum watch stream backoff after API server throttling (milliseconds)
pub const DEFAULT_WATCH_BACKOFF_MAX_MS: u64 = 30_000;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Minimum refresh interval that qualifies an ExternalSecret for periodic scheduling (seconds)
/// Shorter intervals only sync on watch events to bound backend call rate
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 60;

/// Longest duration accepted in `refreshInterval` (one year, in seconds)
pub const MAX_DURATION_SECS: u64 = 365 * 86_400;

/// Namespace the controller assumes when `POD_NAMESPACE` is not set
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "octopilot-system";

/// Field manager used for server-side apply of managed Secrets
pub const FIELD_MANAGER: &str = "external-secret-controller";

/// Session name used for every STS AssumeRole exchange
pub const AWS_ROLE_SESSION_NAME: &str = "external-secret-controller";

/// Key of the access key id inside an AWS credentials Secret
pub const AWS_ACCESS_KEY_ID_KEY: &str = "accessKeyID";

/// Key of the secret access key inside an AWS credentials Secret
pub const AWS_SECRET_ACCESS_KEY_KEY: &str = "secretAccessKey";

/// Annotation that forces a sync even when generation is unchanged
pub const FORCE_SYNC_ANNOTATION: &str = "secret-sync.octopilot.io/force-sync";

/// Annotation never propagated from an ExternalSecret to its Secret
pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Annotation on managed Secrets holding the hash of the content last applied
pub const CONTENT_HASH_ANNOTATION: &str = "secret-sync.octopilot.io/content-hash";

/// Label marking Secrets written by the controller
pub const MANAGED_LABEL: &str = "secret-sync.octopilot.io/managed";

/// Label selector for [`MANAGED_LABEL`]
pub const MANAGED_LABEL_SELECTOR: &str = "secret-sync.octopilot.io/managed=true";

/// Condition type reported on ExternalSecret status
pub const CONDITION_READY: &str = "Ready";

/// Default Vault KV mount when a store omits `path`
pub const DEFAULT_VAULT_KV_PATH: &str = "secret";

/// Default Vault auth mount for AppRole logins
pub const DEFAULT_VAULT_APPROLE_PATH: &str = "approle";

/// Default Vault auth mount for Kubernetes logins
pub const DEFAULT_VAULT_KUBERNETES_PATH: &str = "kubernetes";
