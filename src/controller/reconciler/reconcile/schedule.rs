//! Keeps the periodic scheduler in line with each ExternalSecret's refresh
//! interval.

use super::sync_external_secret;
use crate::controller::reconciler::policy::should_schedule;
use crate::controller::reconciler::types::{Reconciler, TriggerSource};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Weak;
use std::time::Duration;
use tracing::{info, warn};

/// Register, re-register or drop the scheduler entry for `namespace/name`
///
/// Entries are only replaced when the interval changed, so repeated cycles do
/// not reset the firing phase.
pub(crate) fn update_schedule(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
    interval: Option<Duration>,
) {
    let identity = format!("{namespace}/{name}");
    let scheduler = ctx.scheduler();

    let interval = match interval {
        Some(interval) if should_schedule(Some(interval), ctx.config().min_refresh_interval()) => {
            interval
        }
        _ => {
            if scheduler.remove(&identity) {
                info!(identity = %identity, "Removed ExternalSecret from periodic schedule");
            }
            return;
        }
    };

    if scheduler.interval_of(&identity) == Some(interval) {
        return;
    }

    let weak = ctx.weak();
    let namespace = namespace.to_string();
    let name = name.to_string();
    let job = move || scheduled_sync(weak.clone(), namespace.clone(), name.clone());
    match scheduler.add(identity.clone(), interval, job) {
        Ok(()) => info!(
            identity = %identity,
            interval_secs = interval.as_secs(),
            "Scheduled periodic sync"
        ),
        Err(e) => warn!(identity = %identity, error = %e, "Failed to schedule periodic sync"),
    }
}

// Returns a concrete boxed future: the job calls back into sync_external_secret
fn scheduled_sync(
    ctx: Weak<Reconciler>,
    namespace: String,
    name: String,
) -> BoxFuture<'static, anyhow::Result<()>> {
    async move {
        let Some(ctx) = ctx.upgrade() else {
            return Ok(());
        };
        sync_external_secret(&ctx, &namespace, &name, TriggerSource::Schedule)
            .await
            .map(|_| ())
            .map_err(anyhow::Error::from)
    }
    .boxed()
}
