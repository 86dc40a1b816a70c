//! # External Secret Controller
//!
//! A Kubernetes controller that materializes secrets held in Vault, AWS Secrets
//! Manager or AWS Parameter Store as Kubernetes Secrets.
//!
//! ## Overview
//!
//! 1. **Watching ExternalSecrets** - Monitors `ExternalSecret` resources in all namespaces
//! 2. **Resolving stores** - Reads the referenced `SecretStore` or `ClusterSecretStore`
//! 3. **Fetching values** - Calls the configured backend and merges the results
//! 4. **Writing Secrets** - Server-side applies a Secret owned by the ExternalSecret
//! 5. **Periodic refresh** - Re-syncs ExternalSecrets on their `refreshInterval`
//!
//! Settings come from environment variables (see `ControllerConfig`); the flags
//! below override them.

use anyhow::Result;
use clap::Parser;
use external_secret_controller::config::ControllerConfig;
use external_secret_controller::runtime::{initialization, watch_loop};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "external-secret-controller", version, about)]
struct Args {
    /// Port for /metrics, /healthz and /readyz
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Log format: text or json
    #[arg(long, env = "LOG_FORMAT")]
    log_format: Option<String>,

    /// Minimum refresh interval, in seconds, that qualifies for periodic scheduling
    #[arg(long, env = "MIN_REFRESH_INTERVAL_SECS")]
    min_refresh_interval_secs: Option<u64>,
}

impl Args {
    fn apply(self, mut config: ControllerConfig) -> ControllerConfig {
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if let Some(secs) = self.min_refresh_interval_secs {
            config.min_refresh_interval_secs = secs;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().apply(ControllerConfig::from_env());

    let init = initialization::initialize(config).await?;

    watch_loop::run_watch_loop(
        init.external_secrets,
        init.secrets,
        init.reconciler,
        init.server_state,
        init.shutdown,
    )
    .await?;

    info!("Controller stopped");
    Ok(())
}
