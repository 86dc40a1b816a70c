//! # Status
//!
//! Builds ExternalSecret status after a cycle.
//!
//! The status only changes when something meaningful changed: the `Ready`
//! condition keeps its `lastTransitionTime` while its status stays the same, and
//! a failed cycle leaves `nextSync`/`lastSyncTime` untouched. Repeating the same
//! failure therefore produces an identical status, which the driver does not
//! write, so status writes never feed a watch loop.

use crate::constants::CONDITION_READY;
use crate::crd::{Condition, ExternalSecretStatus};

/// `Ready` condition reasons
pub mod reasons {
    pub const AVAILABLE: &str = "Available";
    pub const INVALID_SPEC: &str = "InvalidSpec";
    pub const STORE_NOT_FOUND: &str = "StoreNotFound";
    pub const STORE_SETUP_FAILED: &str = "StoreSetupFailed";
    pub const FETCH_FAILED: &str = "FetchFailed";
    pub const TEMPLATE_FAILED: &str = "TemplateFailed";
    pub const UPSERT_FAILED: &str = "UpsertFailed";
}

fn ready_condition(
    previous: Option<&ExternalSecretStatus>,
    ready: bool,
    reason: &str,
    message: String,
    now: &str,
) -> Condition {
    let status = if ready { "True" } else { "False" };
    let last_transition_time = previous
        .and_then(|s| s.condition(CONDITION_READY))
        .filter(|c| c.status == status)
        .and_then(|c| c.last_transition_time.clone())
        .unwrap_or_else(|| now.to_string());

    Condition {
        r#type: CONDITION_READY.to_string(),
        status: status.to_string(),
        last_transition_time: Some(last_transition_time),
        reason: Some(reason.to_string()),
        message: Some(message),
    }
}

/// Replace the `Ready` condition, keeping any foreign conditions
fn with_ready(previous: Option<&ExternalSecretStatus>, ready: Condition) -> Vec<Condition> {
    let mut conditions: Vec<Condition> = previous
        .map(|s| {
            s.conditions
                .iter()
                .filter(|c| c.r#type != CONDITION_READY)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    conditions.push(ready);
    conditions
}

/// Status after a successful cycle
#[must_use]
pub fn available_status(
    previous: Option<&ExternalSecretStatus>,
    generation: Option<i64>,
    next_sync: Option<String>,
    now: &str,
) -> ExternalSecretStatus {
    let ready = ready_condition(
        previous,
        true,
        reasons::AVAILABLE,
        "Secret was synced from the store".to_string(),
        now,
    );
    ExternalSecretStatus {
        conditions: with_ready(previous, ready),
        next_sync,
        observed_generation: generation,
        last_sync_time: Some(now.to_string()),
    }
}

/// Status after a failed cycle
#[must_use]
pub fn unavailable_status(
    previous: Option<&ExternalSecretStatus>,
    generation: Option<i64>,
    reason: &str,
    message: String,
    now: &str,
) -> ExternalSecretStatus {
    let ready = ready_condition(previous, false, reason, message, now);
    ExternalSecretStatus {
        conditions: with_ready(previous, ready),
        next_sync: previous.and_then(|s| s.next_sync.clone()),
        observed_generation: generation,
        last_sync_time: previous.and_then(|s| s.last_sync_time.clone()),
    }
}

/// Merge-patch body for the status subresource
///
/// An unset `nextSync` is sent as `null` so a removed refresh interval clears
/// the stored value.
pub fn status_patch(status: &ExternalSecretStatus) -> serde_json::Result<serde_json::Value> {
    let mut value = serde_json::to_value(status)?;
    if status.next_sync.is_none() {
        value["nextSync"] = serde_json::Value::Null;
    }
    Ok(serde_json::json!({ "status": value }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: &str = "2024-05-01T12:00:00+00:00";
    const T1: &str = "2024-05-01T13:00:00+00:00";

    #[test]
    fn test_available_status() {
        let status = available_status(None, Some(3), Some(T1.to_string()), T0);
        assert!(status.is_ready());
        assert_eq!(status.observed_generation, Some(3));
        assert_eq!(status.next_sync.as_deref(), Some(T1));
        assert_eq!(status.last_sync_time.as_deref(), Some(T0));
        let ready = status.condition("Ready").unwrap();
        assert_eq!(ready.reason.as_deref(), Some("Available"));
        assert_eq!(ready.last_transition_time.as_deref(), Some(T0));
    }

    #[test]
    fn test_transition_time_kept_while_status_unchanged() {
        let first = available_status(None, Some(1), None, T0);
        let second = available_status(Some(&first), Some(1), None, T1);
        assert_eq!(
            second.condition("Ready").unwrap().last_transition_time.as_deref(),
            Some(T0)
        );

        let failed = unavailable_status(
            Some(&second),
            Some(1),
            reasons::FETCH_FAILED,
            "boom".to_string(),
            T1,
        );
        assert_eq!(
            failed.condition("Ready").unwrap().last_transition_time.as_deref(),
            Some(T1)
        );
    }

    #[test]
    fn test_repeated_failure_is_identical() {
        let synced = available_status(None, Some(1), Some(T0.to_string()), T0);
        let failed = unavailable_status(
            Some(&synced),
            Some(1),
            reasons::STORE_NOT_FOUND,
            "SecretStore \"vault\" not found".to_string(),
            T1,
        );
        assert!(!failed.is_ready());
        assert_eq!(failed.next_sync.as_deref(), Some(T0));
        assert_eq!(failed.last_sync_time.as_deref(), Some(T0));

        let again = unavailable_status(
            Some(&failed),
            Some(1),
            reasons::STORE_NOT_FOUND,
            "SecretStore \"vault\" not found".to_string(),
            "2024-05-01T14:00:00+00:00",
        );
        assert_eq!(again, failed);
    }

    #[test]
    fn test_foreign_conditions_are_kept() {
        let mut previous = available_status(None, Some(1), None, T0);
        previous.conditions.insert(
            0,
            Condition {
                r#type: "Audited".to_string(),
                status: "True".to_string(),
                last_transition_time: None,
                reason: None,
                message: None,
            },
        );
        let next = available_status(Some(&previous), Some(2), None, T1);
        assert_eq!(next.conditions.len(), 2);
        assert!(next.condition("Audited").is_some());
    }

    #[test]
    fn test_status_patch_clears_next_sync() {
        let status = available_status(None, Some(1), None, T0);
        let patch = status_patch(&status).unwrap();
        assert!(patch["status"]["nextSync"].is_null());
        assert!(patch["status"].as_object().unwrap().contains_key("nextSync"));
        assert_eq!(patch["status"]["observedGeneration"], 1);
    }
}
