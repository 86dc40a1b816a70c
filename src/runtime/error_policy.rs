//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::ExternalSecret;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Decide when the runtime retries a failed resource
///
/// Sync failures were already logged and recorded on the status by the cycle
/// and back off per resource on the Fibonacci sequence. Plumbing failures
/// (API reads, status writes outside a cycle) requeue after the fixed
/// `RECONCILIATION_ERROR_REQUEUE_SECS` delay.
pub fn handle_reconciliation_error(
    obj: Arc<ExternalSecret>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let identity = obj.identity();
    if let ReconcilerError::ReconciliationFailed(e) = error {
        let delay = ctx.config().reconciliation_error_requeue_duration();
        warn!(
            identity = %identity,
            error = %format!("{e:#}"),
            requeue_secs = delay.as_secs(),
            "Reconciliation failed outside a sync cycle"
        );
        observability::metrics::increment_requeues_total("error");
        return Action::requeue(delay);
    }

    let (backoff_seconds, error_count) = ctx.next_error_backoff(&identity);

    let next_trigger_time = chrono::Duration::try_seconds(
        i64::try_from(backoff_seconds).unwrap_or(i64::MAX),
    )
    .and_then(|delta| chrono::Utc::now().checked_add_signed(delta))
    .map(|time| time.to_rfc3339())
    .unwrap_or_default();

    info!(
        identity = %identity,
        error = %error,
        backoff_secs = backoff_seconds,
        error_count,
        next_retry = %next_trigger_time,
        "Retrying with Fibonacci backoff"
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// Class of a watch stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401: RBAC revoked or token expired
    Unauthorized,
    /// 410: resource version expired
    Expired,
    /// 429: API server storage reinitializing or throttling
    Throttled,
    /// 404: CRD missing or object deleted
    NotFound,
    Other,
}

/// Classify a watch stream error from its debug rendering
///
/// 404 is checked before 401 because a plain-text 404 body surfaces as a
/// deserialization error that also mentions `WatchFailed`.
#[must_use]
pub fn classify_watch_error(error_string: &str) -> WatchErrorKind {
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    let is_401 =
        (error_string.contains("401") || error_string.contains("Unauthorized")) && !is_not_found;

    if is_401 {
        WatchErrorKind::Unauthorized
    } else if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        WatchErrorKind::Expired
    } else if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        WatchErrorKind::Throttled
    } else if is_not_found {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Other
    }
}

/// Handle watch stream errors with appropriate classification and backoff
///
/// Returns `None` to filter out the error (allow restart) or `Some(())` to continue.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    watch_restart_delay_secs: u64,
) -> Option<()> {
    match classify_watch_error(error_string) {
        WatchErrorKind::Unauthorized => {
            error!(
                error = %error_string,
                "Watch authentication failed (401 Unauthorized); check the controller's ClusterRole, ClusterRoleBinding and ServiceAccount"
            );
            warn!(
                delay_secs = watch_restart_delay_secs,
                "Waiting before retrying watch (RBAC may need time to propagate)"
            );
            tokio::time::sleep(Duration::from_secs(watch_restart_delay_secs)).await;
            None
        }
        WatchErrorKind::Expired => {
            warn!(
                error_type = "410",
                "Watch resource version expired, watch will restart"
            );
            None
        }
        WatchErrorKind::Throttled => {
            let current_backoff = backoff.load(Ordering::Relaxed);
            warn!(
                backoff_ms = current_backoff,
                "API server storage reinitializing (429), backing off before restart"
            );
            tokio::time::sleep(Duration::from_millis(current_backoff)).await;
            let new_backoff = current_backoff.saturating_mul(2).min(max_backoff_ms);
            backoff.store(new_backoff, Ordering::Relaxed);
            None
        }
        WatchErrorKind::NotFound => {
            warn!(
                error = %error_string,
                "Resource not found (404); normal after a deletion, otherwise check that the ExternalSecret CRD is installed"
            );
            Some(())
        }
        WatchErrorKind::Other => {
            error!(error = %error_string, "Controller stream error");
            tokio::time::sleep(Duration::from_secs(watch_restart_delay_secs)).await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_watch_errors() {
        assert_eq!(
            classify_watch_error("Api(ErrorResponse { code: 401, reason: \"Unauthorized\" })"),
            WatchErrorKind::Unauthorized
        );
        assert_eq!(
            classify_watch_error("WatchError(ErrorResponse { code: 410, message: \"too old resource version\" })"),
            WatchErrorKind::Expired
        );
        assert_eq!(
            classify_watch_error("storage is (re)initializing"),
            WatchErrorKind::Throttled
        );
        assert_eq!(
            classify_watch_error("ObjectNotFound(ExternalSecret apps/db)"),
            WatchErrorKind::NotFound
        );
        assert_eq!(
            classify_watch_error("connection reset by peer"),
            WatchErrorKind::Other
        );
    }

    #[test]
    fn test_not_found_wins_over_unauthorized() {
        assert_eq!(
            classify_watch_error("WatchFailed: invalid type: integer `404`, Unauthorized"),
            WatchErrorKind::NotFound
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_error_doubles_backoff_up_to_max() {
        let backoff = Arc::new(AtomicU64::new(2_000));

        assert!(handle_watch_stream_error("429 TooManyRequests", &backoff, 5_000, 5)
            .await
            .is_none());
        assert_eq!(backoff.load(Ordering::Relaxed), 4_000);

        handle_watch_stream_error("429 TooManyRequests", &backoff, 5_000, 5).await;
        assert_eq!(backoff.load(Ordering::Relaxed), 5_000);
    }

    #[tokio::test]
    async fn test_not_found_continues_stream() {
        let backoff = Arc::new(AtomicU64::new(1_000));
        assert!(handle_watch_stream_error("ObjectNotFound", &backoff, 5_000, 5)
            .await
            .is_some());
        assert_eq!(backoff.load(Ordering::Relaxed), 1_000);
    }
}
