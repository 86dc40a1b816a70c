//! # Sync Policy
//!
//! Pure decisions taken before and after a sync cycle:
//!
//! - whether an ExternalSecret qualifies for periodic scheduling
//! - whether a one-shot ExternalSecret has already synced
//! - the `nextSync` timestamp recorded after a successful cycle
//! - whether a watch event only reflects our own status write

use crate::constants::FORCE_SYNC_ANNOTATION;
use crate::crd::{ExternalSecret, ExternalSecretStatus};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Periodic scheduling requires an interval of at least `min_interval`
///
/// Shorter intervals still sync on every watch event; they are only kept off
/// the scheduler to bound the backend call rate.
#[must_use]
pub fn should_schedule(interval: Option<Duration>, min_interval: Duration) -> bool {
    interval.is_some_and(|interval| !interval.is_zero() && interval >= min_interval)
}

/// A zero interval means "sync once": skip once `nextSync` has been recorded
#[must_use]
pub fn skip_sync(interval: Option<Duration>, status: Option<&ExternalSecretStatus>) -> bool {
    interval.is_some_and(|interval| interval.is_zero())
        && status.is_some_and(|status| status.next_sync.is_some())
}

/// `nextSync` after a successful cycle at `now`
///
/// Unset interval leaves it unset. Zero pins it to the Unix epoch.
#[must_use]
pub fn compute_next_sync(interval: Option<Duration>, now: DateTime<Utc>) -> Option<String> {
    let interval = interval?;
    if interval.is_zero() {
        return Some(DateTime::<Utc>::UNIX_EPOCH.to_rfc3339());
    }
    let next = chrono::Duration::from_std(interval)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    Some(next.to_rfc3339())
}

/// True when the force-sync annotation is present
#[must_use]
pub fn force_sync_requested(es: &ExternalSecret) -> bool {
    es.metadata
        .annotations
        .as_ref()
        .is_some_and(|annotations| annotations.contains_key(FORCE_SYNC_ANNOTATION))
}

/// A watch event is settled when the spec generation was already processed
/// successfully and nobody asked for a forced sync
///
/// Status-only updates (including the controller's own) never change the
/// generation, so they are dropped here instead of re-running a cycle.
#[must_use]
pub fn watch_event_is_settled(es: &ExternalSecret) -> bool {
    let Some(status) = es.status.as_ref() else {
        return false;
    };
    let generation = es.metadata.generation;
    generation.is_some()
        && status.observed_generation == generation
        && status.is_ready()
        && !force_sync_requested(es)
}
