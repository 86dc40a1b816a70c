//! # Controller Configuration
//!
//! Process settings read once at startup. The deployment fills the
//! environment from a ConfigMap; `main` applies CLI overrides on top.

use std::time::Duration;

/// Settings read by the runtime and the sync driver
///
/// Every field falls back to the default in [`crate::constants`] when its
/// variable is unset or does not parse.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// HTTP port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// Requeue delay after a failure outside a sync cycle (seconds)
    pub reconciliation_error_requeue_secs: u64,
    /// Fibonacci backoff floor (seconds)
    pub backoff_min_secs: u64,
    /// Fibonacci backoff ceiling (seconds)
    pub backoff_max_secs: u64,
    /// Initial watch stream backoff after API server throttling (milliseconds)
    pub watch_backoff_start_ms: u64,
    /// Maximum watch stream backoff after API server throttling (milliseconds)
    pub watch_backoff_max_ms: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Minimum refresh interval that qualifies for periodic scheduling (seconds)
    pub min_refresh_interval_secs: u64,
    /// Namespace where the controller is deployed
    pub controller_namespace: String,
    /// `json` for JSON lines, anything else for human-readable text
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            reconciliation_error_requeue_secs: DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            watch_backoff_start_ms: DEFAULT_WATCH_BACKOFF_START_MS,
            watch_backoff_max_ms: DEFAULT_WATCH_BACKOFF_MAX_MS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            min_refresh_interval_secs: MIN_REFRESH_INTERVAL_SECS,
            controller_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            log_format: "text".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Read every setting from the environment
    #[must_use]
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            reconciliation_error_requeue_secs: env_var_or_default(
                "RECONCILIATION_ERROR_REQUEUE_SECS",
                DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS,
            ),
            backoff_min_secs: env_var_or_default("BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            watch_backoff_start_ms: env_var_or_default(
                "WATCH_BACKOFF_START_MS",
                DEFAULT_WATCH_BACKOFF_START_MS,
            ),
            watch_backoff_max_ms: env_var_or_default(
                "WATCH_BACKOFF_MAX_MS",
                DEFAULT_WATCH_BACKOFF_MAX_MS,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            min_refresh_interval_secs: env_var_or_default(
                "MIN_REFRESH_INTERVAL_SECS",
                MIN_REFRESH_INTERVAL_SECS,
            ),
            controller_namespace: env_var_or_default_str(
                "POD_NAMESPACE",
                DEFAULT_CONTROLLER_NAMESPACE,
            ),
            log_format: env_var_or_default_str("LOG_FORMAT", "text"),
        }
    }

    #[must_use]
    pub fn reconciliation_error_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.reconciliation_error_requeue_secs)
    }

    #[must_use]
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }

    #[must_use]
    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.min_refresh_interval_secs)
    }

    /// Whether logs should be emitted as JSON lines
    #[must_use]
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// Parsed value of `key`, or `default` when unset or malformed
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.metrics_port, 5000);
        assert_eq!(config.min_refresh_interval(), Duration::from_secs(60));
        assert_eq!(config.backoff_min_secs, 30);
        assert_eq!(config.backoff_max_secs, 300);
        assert!(!config.json_logs());
    }

    #[test]
    fn test_json_logs_is_case_insensitive() {
        let config = ControllerConfig {
            log_format: "JSON".to_string(),
            ..ControllerConfig::default()
        };
        assert!(config.json_logs());
    }

    #[test]
    fn test_env_var_or_default_falls_back_when_unset() {
        assert_eq!(
            env_var_or_default("EXTERNAL_SECRET_CONTROLLER_TEST_UNSET_PORT", 42_u16),
            42
        );
    }
}
