//! # Status Types
//!
//! Status reported on ExternalSecret resources.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of an ExternalSecret
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSecretStatus {
    /// Conditions; only `Ready` is written by the controller
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// RFC3339 time of the next scheduled sync.
    /// The Unix epoch marks a one-shot ExternalSecret that already synced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_sync: Option<String>,
    /// Generation last processed by a completed cycle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// RFC3339 time of the last successful sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<String>,
}

/// Kubernetes-style condition
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}

impl ExternalSecretStatus {
    /// Condition of the given type, if present
    #[must_use]
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == type_)
    }

    /// True when the `Ready` condition reports `True`
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.condition(crate::constants::CONDITION_READY)
            .is_some_and(|c| c.status == "True")
    }
}
