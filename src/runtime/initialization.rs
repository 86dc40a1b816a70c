//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, Kubernetes client setup and the periodic scheduler.

use crate::config::ControllerConfig;
use crate::controller::reconciler::{KubeObjectStore, Reconciler};
use crate::controller::scheduler::Scheduler;
use crate::crd::ExternalSecret;
use crate::observability;
use crate::provider::resolver::StoreResolver;
use crate::server::{start_server, ServerState};
use anyhow::Result;
use k8s_openapi::api::core::v1::Secret;
use kube::{api::Api, api::ListParams, Client};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// ExternalSecrets across all namespaces
    pub external_secrets: Api<ExternalSecret>,
    /// Secrets across all namespaces, watched for managed ones
    pub secrets: Api<Secret>,
    /// Reconciler context
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Cancels the scheduler and the watch loop
    pub shutdown: CancellationToken,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the default `external_secret_controller=info` filter.
pub fn init_tracing(config: &ControllerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "external_secret_controller=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.json_logs() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        warn!("Tracing subscriber already initialized: {e}");
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Scheduler startup
/// - Reconciler setup
///
/// # Errors
///
/// Fails when metrics cannot be registered, the HTTP server does not come up
/// or no Kubernetes client can be built.
pub async fn initialize(config: ControllerConfig) -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection. Err means a provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();

    init_tracing(&config);

    info!(
        namespace = %config.controller_namespace,
        "Starting External Secret Controller"
    );
    info!(
        build.timestamp = env!("BUILD_TIMESTAMP"),
        build.datetime = env!("BUILD_DATETIME"),
        build.git_hash = env!("BUILD_GIT_HASH"),
        "Build info"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::new());
    let server_port = config.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!(error = %e, "HTTP server error");
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default().await?;
    let external_secrets: Api<ExternalSecret> = Api::all(client.clone());
    let secrets: Api<Secret> = Api::all(client.clone());

    let objects = KubeObjectStore::new(client.clone());
    let resolver = StoreResolver::new(Arc::new(objects.clone()));

    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new();
    let scheduler_runner = scheduler.clone();
    let scheduler_token = shutdown.clone();
    tokio::spawn(async move { scheduler_runner.run(scheduler_token).await });

    let reconciler = Reconciler::new(Arc::new(objects), Arc::new(resolver), scheduler, config);

    check_crd_queryable(&external_secrets).await;

    info!("Controller initialized, starting watch loop");

    Ok(InitializationResult {
        client,
        external_secrets,
        secrets,
        reconciler,
        server_state,
        shutdown,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    use crate::constants::{DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS};

    let startup_timeout = std::time::Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = std::time::Duration::from_millis(DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Log a startup summary, or a hint when the CRD is not installed
///
/// Existing resources are not reconciled here: the watch's initial list
/// delivers every ExternalSecret to the reconciler.
async fn check_crd_queryable(external_secrets: &Api<ExternalSecret>) {
    match external_secrets.list(&ListParams::default()).await {
        Ok(list) => {
            let by_namespace = names_by_namespace(&list.items);
            info!(
                total = list.items.len(),
                namespaces = by_namespace.len(),
                "Found existing ExternalSecret resources"
            );
            for (namespace, names) in &by_namespace {
                info!(
                    namespace = %namespace,
                    count = names.len(),
                    names = %names.join(", "),
                    "ExternalSecrets in namespace"
                );
            }
        }
        Err(e) => {
            error!(error = %e, "ExternalSecret CRD is not queryable. Is the CRD installed?");
            warn!("Continuing; the watch loop will retry");
        }
    }
}

/// Sorted ExternalSecret names grouped by namespace
#[must_use]
pub fn names_by_namespace(items: &[ExternalSecret]) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in items {
        grouped
            .entry(
                item.metadata
                    .namespace
                    .clone()
                    .unwrap_or_else(|| "default".to_string()),
            )
            .or_default()
            .push(item.metadata.name.clone().unwrap_or_default());
    }
    for names in grouped.values_mut() {
        names.sort();
    }
    grouped
}
