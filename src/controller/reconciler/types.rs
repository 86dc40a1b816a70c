//! # Types
//!
//! Core types for the reconciler.

use super::store::ObjectStore;
use super::template::TemplateError;
use super::status::reasons;
use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::scheduler::Scheduler;
use crate::error::ErrorClass;
use crate::provider::resolver::ClientFactory;
use crate::provider::ProviderError;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Sync of {identity} failed: {source}")]
    SyncFailed {
        identity: String,
        #[source]
        source: SyncError,
    },
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

/// Failure of one step of a sync cycle
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid ExternalSecret: {0:#}")]
    InvalidSpec(anyhow::Error),
    #[error("cannot get store reference: {0:#}")]
    StoreNotFound(anyhow::Error),
    #[error("cannot setup store client: {0}")]
    StoreSetup(ProviderError),
    #[error("cannot get ExternalSecret data from store: {0}")]
    Fetch(ProviderError),
    #[error("failed to merge secret with template field: {0}")]
    Template(TemplateError),
    #[error("cannot create/update ExternalSecret data from store: {0:#}")]
    Upsert(anyhow::Error),
}

impl SyncError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::InvalidSpec(_) | SyncError::StoreNotFound(_) => ErrorClass::Config,
            SyncError::StoreSetup(e) | SyncError::Fetch(e) => e.class(),
            SyncError::Template(_) => ErrorClass::Merge,
            SyncError::Upsert(_) => ErrorClass::Upsert,
        }
    }

    /// Reason recorded on the `Ready` condition
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            SyncError::InvalidSpec(_) => reasons::INVALID_SPEC,
            SyncError::StoreNotFound(_) => reasons::STORE_NOT_FOUND,
            SyncError::StoreSetup(_) => reasons::STORE_SETUP_FAILED,
            SyncError::Fetch(_) => reasons::FETCH_FAILED,
            SyncError::Template(_) => reasons::TEMPLATE_FAILED,
            SyncError::Upsert(_) => reasons::UPSERT_FAILED,
        }
    }
}

/// Trigger source for a sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Watch event or error requeue from the kube runtime
    Watch,
    /// Periodic scheduler firing
    Schedule,
    /// Watch event carrying the force-sync annotation; bypasses the one-shot skip
    Manual,
    /// Managed Secret deleted or edited behind the controller's back; bypasses the one-shot skip
    Drift,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Watch => "watch",
            TriggerSource::Schedule => "schedule",
            TriggerSource::Manual => "manual",
            TriggerSource::Drift => "drift",
        }
    }

    /// Whether the cycle runs even for a one-shot ExternalSecret that already synced
    #[must_use]
    pub fn overrides_one_shot(&self) -> bool {
        matches!(self, TriggerSource::Manual | TriggerSource::Drift)
    }
}

/// In-memory sync state per ExternalSecret
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
    /// No cycle has run since the controller started
    #[default]
    Idle,
    Syncing,
    /// Last cycle wrote the Secret
    Available,
    /// Last cycle failed
    Unavailable,
}

impl SyncPhase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "Idle",
            SyncPhase::Syncing => "Syncing",
            SyncPhase::Available => "Available",
            SyncPhase::Unavailable => "Unavailable",
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a cycle that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Secret written and status updated
    Synced,
    /// One-shot ExternalSecret that already synced
    Skipped,
    /// ExternalSecret no longer exists; its schedule was dropped
    Deleted,
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared reconciliation context
pub struct Reconciler {
    pub(crate) objects: Arc<dyn ObjectStore>,
    pub(crate) clients: Arc<dyn ClientFactory>,
    scheduler: Scheduler,
    config: ControllerConfig,
    // Backoff state per resource (identified by namespace/name), driven by error_policy
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
    // One async lock per resource so at most one cycle runs per ExternalSecret
    sync_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    phases: Mutex<HashMap<String, SyncPhase>>,
    // Scheduled jobs hold this instead of an Arc so the scheduler never keeps the reconciler alive
    this: Weak<Reconciler>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("scheduler", &self.scheduler)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        clients: Arc<dyn ClientFactory>,
        scheduler: Scheduler,
        config: ControllerConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            objects,
            clients,
            scheduler,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
            sync_locks: Mutex::new(HashMap::new()),
            phases: Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub(crate) fn weak(&self) -> Weak<Reconciler> {
        self.this.clone()
    }

    /// Current phase of `namespace/name`
    #[must_use]
    pub fn phase(&self, identity: &str) -> SyncPhase {
        lock(&self.phases)
            .get(identity)
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn set_phase(&self, identity: &str, phase: SyncPhase) {
        lock(&self.phases).insert(identity.to_string(), phase);
    }

    /// Get or create the sync lock for a resource
    pub(crate) fn sync_lock(&self, identity: &str) -> Arc<AsyncMutex<()>> {
        lock(&self.sync_locks)
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drop the sync lock of `identity` unless another cycle holds or awaits it
    pub(crate) fn release_sync_lock(&self, identity: &str, sync_lock: Arc<AsyncMutex<()>>) {
        let mut locks = lock(&self.sync_locks);
        // One reference in the map plus the caller's; clones are only taken under the map lock
        if Arc::strong_count(&sync_lock) == 2 {
            locks.remove(identity);
        }
    }

    /// Identities with in-memory state: a phase, backoff or scheduler entry
    #[must_use]
    pub fn tracked_identities(&self) -> BTreeSet<String> {
        let mut identities: BTreeSet<String> = lock(&self.phases).keys().cloned().collect();
        identities.extend(lock(&self.backoff_states).keys().cloned());
        identities.extend(self.scheduler.identities());
        identities
    }

    /// Drop all per-resource state after the ExternalSecret was deleted
    ///
    /// The sync lock is left to [`Self::release_sync_lock`] so a held lock is
    /// never replaced.
    pub(crate) fn forget(&self, identity: &str) {
        self.scheduler.remove(identity);
        lock(&self.phases).remove(identity);
        lock(&self.backoff_states).remove(identity);
    }

    /// Advance the resource's Fibonacci backoff; returns (delay seconds, error count)
    pub fn next_error_backoff(&self, identity: &str) -> (u64, u32) {
        let mut states = lock(&self.backoff_states);
        let state = states.entry(identity.to_string()).or_insert_with(|| {
            BackoffState::new(self.config.backoff_min_secs, self.config.backoff_max_secs)
        });
        state.increment_error();
        (state.backoff.next_backoff_seconds(), state.error_count)
    }

    pub(crate) fn reset_backoff(&self, identity: &str) {
        if let Some(state) = lock(&self.backoff_states).get_mut(identity) {
            state.reset();
        }
    }
}
