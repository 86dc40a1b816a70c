//! # Reconciliation Logic
//!
//! Drives one ExternalSecret through a sync cycle.
//!
//! Two sources trigger cycles: the kube runtime (watch events and error
//! requeues) through [`reconcile`], and the periodic [`Scheduler`] through a
//! job registered by [`sync_external_secret`]. Both go through the same
//! per-resource lock, so cycles for one ExternalSecret never overlap.
//!
//! [`Scheduler`]: crate::controller::scheduler::Scheduler

mod cycle;
mod schedule;

pub(crate) use schedule::update_schedule;

use crate::controller::reconciler::policy::{
    compute_next_sync, force_sync_requested, skip_sync, watch_event_is_settled,
};
use crate::controller::reconciler::status::{available_status, unavailable_status};
use crate::controller::reconciler::types::{
    CycleOutcome, Reconciler, ReconcilerError, SyncError, SyncPhase, TriggerSource,
};
use crate::controller::reconciler::validation::validate_external_secret;
use crate::crd::{ExternalSecret, ExternalSecretStatus};
use crate::observability::metrics;
use chrono::Utc;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// Kube runtime entry point
///
/// Watch events for a generation that already synced successfully are
/// dropped as long as the managed Secret is intact, except for making sure
/// the resource is on the schedule (after a controller restart the scheduler
/// starts empty). A missing or edited Secret is rewritten. Errors are handled
/// by the runtime's error policy.
pub async fn reconcile(
    es: Arc<ExternalSecret>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let namespace = es.metadata.namespace.as_deref().unwrap_or("default");
    let Some(name) = es.metadata.name.as_deref() else {
        return Err(ReconcilerError::ReconciliationFailed(anyhow::anyhow!(
            "ExternalSecret in namespace {namespace} has no name"
        )));
    };

    let trigger = if force_sync_requested(&es) {
        TriggerSource::Manual
    } else if watch_event_is_settled(&es) {
        if ctx.objects.secret_in_sync(namespace, name).await? {
            debug!(
                resource.namespace = namespace,
                resource.name = name,
                "Generation already synced, skipping watch event"
            );
            if let Ok(interval) = validate_external_secret(&es) {
                update_schedule(&ctx, namespace, name, interval);
            }
            return Ok(Action::await_change());
        }
        info!(
            resource.namespace = namespace,
            resource.name = name,
            "Managed Secret missing or modified, resyncing"
        );
        TriggerSource::Drift
    } else {
        TriggerSource::Watch
    };

    sync_external_secret(&ctx, namespace, name, trigger).await?;

    if trigger == TriggerSource::Manual {
        if let Err(e) = ctx.objects.clear_force_sync(namespace, name).await {
            warn!(
                resource.namespace = namespace,
                resource.name = name,
                error = %e,
                "Failed to clear force-sync annotation"
            );
        }
    }

    Ok(Action::await_change())
}

/// Drop in-memory state for `namespace/name` if the ExternalSecret is gone
///
/// Runs under the per-resource lock so it cannot race a cycle for a
/// recreated ExternalSecret of the same name. Returns whether state was
/// dropped.
///
/// # Errors
///
/// Fails when the ExternalSecret cannot be read.
pub async fn release_if_deleted(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
) -> anyhow::Result<bool> {
    let identity = format!("{namespace}/{name}");
    let sync_lock = ctx.sync_lock(&identity);
    let deleted = {
        let _guard = sync_lock.lock().await;
        let deleted = ctx.objects.get_external_secret(namespace, name).await?.is_none();
        if deleted {
            ctx.forget(&identity);
        }
        deleted
    };
    ctx.release_sync_lock(&identity, sync_lock);
    if deleted {
        debug!(
            resource.namespace = namespace,
            resource.name = name,
            "Released state of deleted ExternalSecret"
        );
    }
    Ok(deleted)
}

/// Run one sync cycle for `namespace/name`
///
/// The ExternalSecret is re-read under the per-resource lock so a cycle
/// always works on the latest spec. A missing ExternalSecret drops all
/// in-memory state for it, including its scheduler entry.
///
/// # Errors
///
/// Returns [`ReconcilerError::SyncFailed`] when a cycle step fails (after
/// recording the failure on the status), or
/// [`ReconcilerError::ReconciliationFailed`] when the ExternalSecret cannot be
/// read.
pub async fn sync_external_secret(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
    trigger: TriggerSource,
) -> Result<CycleOutcome, ReconcilerError> {
    let identity = format!("{namespace}/{name}");
    let span = tracing::info_span!(
        "sync",
        resource.namespace = namespace,
        resource.name = name,
        trigger = trigger.as_str()
    );

    sync_locked(ctx, namespace, name, identity, trigger)
        .instrument(span)
        .await
}

async fn sync_locked(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
    identity: String,
    trigger: TriggerSource,
) -> Result<CycleOutcome, ReconcilerError> {
    let sync_lock = ctx.sync_lock(&identity);
    let result = {
        let _guard = sync_lock.lock().await;
        run_locked(ctx, namespace, name, identity.clone(), trigger).await
    };
    ctx.release_sync_lock(&identity, sync_lock);
    result
}

async fn run_locked(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
    identity: String,
    trigger: TriggerSource,
) -> Result<CycleOutcome, ReconcilerError> {
    let Some(es) = ctx.objects.get_external_secret(namespace, name).await? else {
        info!("ExternalSecret deleted, dropping its schedule");
        ctx.forget(&identity);
        return Ok(CycleOutcome::Deleted);
    };

    let interval = match validate_external_secret(&es) {
        Ok(interval) => interval,
        Err(e) => {
            ctx.scheduler().remove(&identity);
            return Err(record_failure(ctx, &es, identity, SyncError::InvalidSpec(e)).await);
        }
    };

    update_schedule(ctx, namespace, name, interval);

    if !trigger.overrides_one_shot() && skip_sync(interval, es.status.as_ref()) {
        debug!("One-shot ExternalSecret already synced, skipping");
        return Ok(CycleOutcome::Skipped);
    }

    metrics::increment_reconciliations(trigger.as_str());
    ctx.set_phase(&identity, SyncPhase::Syncing);
    let start = Instant::now();
    let result = cycle::run_cycle(ctx, &es).await;
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    match result {
        Ok(keys) => {
            let now = Utc::now();
            let status = available_status(
                es.status.as_ref(),
                es.metadata.generation,
                compute_next_sync(interval, now),
                &now.to_rfc3339(),
            );
            write_status(ctx, &es, status).await;
            ctx.set_phase(&identity, SyncPhase::Available);
            ctx.reset_backoff(&identity);
            metrics::increment_secrets_synced();
            info!(keys, "Synced ExternalSecret");
            Ok(CycleOutcome::Synced)
        }
        Err(e) => Err(record_failure(ctx, &es, identity, e).await),
    }
}

/// Record a failed cycle everywhere it is observable
async fn record_failure(
    ctx: &Reconciler,
    es: &ExternalSecret,
    identity: String,
    error: SyncError,
) -> ReconcilerError {
    let class = error.class();
    error!(
        error.class = %class,
        reason = error.reason(),
        error = %error,
        "Sync failed"
    );

    let status = unavailable_status(
        es.status.as_ref(),
        es.metadata.generation,
        error.reason(),
        error.to_string(),
        &Utc::now().to_rfc3339(),
    );
    write_status(ctx, es, status).await;
    ctx.set_phase(&identity, SyncPhase::Unavailable);
    metrics::increment_reconciliation_errors(class.as_str());

    ReconcilerError::SyncFailed {
        identity,
        source: error,
    }
}

/// Write `status` unless it equals what is already stored
///
/// A failed write is logged and otherwise ignored; the next cycle rewrites
/// the full status.
async fn write_status(ctx: &Reconciler, es: &ExternalSecret, status: ExternalSecretStatus) {
    if es.status.as_ref() == Some(&status) {
        debug!("Status unchanged, skipping write");
        return;
    }
    let namespace = es.metadata.namespace.as_deref().unwrap_or("default");
    let name = es.metadata.name.as_deref().unwrap_or_default();
    if let Err(e) = ctx.objects.update_status(namespace, name, &status).await {
        warn!(error = %e, "Failed to update ExternalSecret status");
    }
}
