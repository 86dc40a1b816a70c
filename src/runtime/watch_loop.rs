//! # Watch Loop
//!
//! Controller watch loop that monitors ExternalSecret resources and triggers
//! reconciliation when changes are detected.
//!
//! Managed Secrets (selected by their managed label) are watched as owned
//! objects, so deleting or editing one re-runs its ExternalSecret.

use crate::constants::MANAGED_LABEL_SELECTOR;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::crd::ExternalSecret;
use crate::runtime::deletion_watch::start_deletion_watch;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use crate::server::ServerState;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube_runtime::{watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Run the controller watch loop until a shutdown signal arrives
///
/// The watch restarts after stream errors and after the stream ends. On exit
/// `shutdown` is cancelled, which also stops the periodic scheduler and the
/// deletion watch.
///
/// # Errors
///
/// Currently always returns `Ok`; stream failures are retried in place.
pub async fn run_watch_loop(
    external_secrets: Api<ExternalSecret>,
    secrets: Api<Secret>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    shutdown: CancellationToken,
) -> Result<(), anyhow::Error> {
    let config = reconciler.config();
    let backoff_start_ms = config.watch_backoff_start_ms;
    let backoff_max_ms = config.watch_backoff_max_ms;
    let restart_delay_secs = config.watch_restart_delay_secs;
    let backoff_duration_ms = Arc::new(AtomicU64::new(backoff_start_ms));

    // SIGTERM/SIGINT: stop reporting ready and stop the scheduler
    let signal_state = Arc::clone(&server_state);
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Received shutdown signal, initiating graceful shutdown");
        signal_state.set_ready(false);
        signal_token.cancel();
    });

    let deletion_watch = start_deletion_watch(
        external_secrets.clone(),
        Arc::clone(&reconciler),
        shutdown.clone(),
    );

    loop {
        if shutdown.is_cancelled() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let backoff = Arc::clone(&backoff_duration_ms);
        let watch_span = tracing::info_span!("controller.watch", operation = "watch_loop");

        info!("Starting controller watch loop");
        Controller::new(
            external_secrets.clone(),
            watcher::Config::default().any_semantic(),
        )
        .owns(
            secrets.clone(),
            watcher::Config::default().labels(MANAGED_LABEL_SELECTOR),
        )
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, Arc::clone(&reconciler))
        .filter_map(move |event| {
            let backoff = Arc::clone(&backoff);
            async move {
                match &event {
                    Ok((object, _action)) => {
                        backoff.store(backoff_start_ms, Ordering::Relaxed);
                        debug!(object = %object, "watch.event.success");
                        Some(event)
                    }
                    Err(e) => {
                        let error_string = format!("{e:?}");
                        handle_watch_stream_error(
                            &error_string,
                            &backoff,
                            backoff_max_ms,
                            restart_delay_secs,
                        )
                        .await
                        .map(|()| event)
                    }
                }
            }
        })
        .for_each(|_| futures::future::ready(()))
        .instrument(watch_span)
        .await;

        if shutdown.is_cancelled() || !server_state.ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = reconciler.config().watch_restart_delay_after_end_duration();
        warn!(
            delay_secs = delay.as_secs(),
            "Controller watch stream ended, restarting"
        );
        tokio::time::sleep(delay).await;
    }

    shutdown.cancel();
    if let Err(e) = deletion_watch.await {
        warn!(error = %e, "Deletion watch task failed");
    }
    info!("Controller stopped gracefully");
    Ok(())
}
