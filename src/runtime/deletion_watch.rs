//! # Deletion Watch
//!
//! The kube controller never reconciles an object that is gone, so a
//! separate watch releases the in-memory state (schedule, phase, backoff) of
//! deleted ExternalSecrets. After every relist, state for identities missing
//! from the list is released too, which covers deletions missed while the
//! watch was down.

use crate::controller::reconciler::{release_if_deleted, Reconciler};
use crate::crd::ExternalSecret;
use futures::{pin_mut, StreamExt};
use kube::api::Api;
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Spawn the deletion watch; it stops when `shutdown` is cancelled
pub fn start_deletion_watch(
    external_secrets: Api<ExternalSecret>,
    reconciler: Arc<Reconciler>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let stream = watcher(external_secrets, watcher::Config::default()).default_backoff();
        pin_mut!(stream);
        let mut tracker = DeletionTracker::new(reconciler);

        info!("ExternalSecret deletion watch started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                event = stream.next() => match event {
                    Some(Ok(event)) => tracker.handle(event).await,
                    Some(Err(e)) => warn!(error = %e, "Error watching ExternalSecret deletions"),
                    None => {
                        warn!("ExternalSecret deletion watch stream ended");
                        break;
                    }
                },
            }
        }
        debug!("ExternalSecret deletion watch stopped");
    })
}

/// Applies watch events to the reconciler's in-memory state
pub(crate) struct DeletionTracker {
    reconciler: Arc<Reconciler>,
    // Identities seen since the last `Init`, while a relist is in progress
    listed: Option<BTreeSet<String>>,
}

impl DeletionTracker {
    pub(crate) fn new(reconciler: Arc<Reconciler>) -> Self {
        Self {
            reconciler,
            listed: None,
        }
    }

    pub(crate) async fn handle(&mut self, event: watcher::Event<ExternalSecret>) {
        match event {
            watcher::Event::Delete(es) => self.release(&es.identity()).await,
            watcher::Event::Init => self.listed = Some(BTreeSet::new()),
            watcher::Event::InitApply(es) => {
                if let Some(listed) = self.listed.as_mut() {
                    listed.insert(es.identity());
                }
            }
            watcher::Event::InitDone => {
                let listed = self.listed.take().unwrap_or_default();
                for identity in self.reconciler.tracked_identities() {
                    if !listed.contains(&identity) {
                        self.release(&identity).await;
                    }
                }
            }
            watcher::Event::Apply(_) => {}
        }
    }

    async fn release(&self, identity: &str) {
        let Some((namespace, name)) = identity.split_once('/') else {
            return;
        };
        match release_if_deleted(&self.reconciler, namespace, name).await {
            Ok(true) => info!(
                resource.namespace = namespace,
                resource.name = name,
                "ExternalSecret deleted, released its state"
            ),
            Ok(false) => {}
            Err(e) => warn!(
                resource.namespace = namespace,
                resource.name = name,
                error = %format!("{e:#}"),
                "Failed to check whether ExternalSecret was deleted"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::controller::reconciler::store::testing::InMemoryObjects;
    use crate::controller::reconciler::SyncPhase;
    use crate::controller::scheduler::Scheduler;
    use crate::provider::testing::FakeClientFactory;
    use std::time::Duration;

    fn external_secret(name: &str) -> ExternalSecret {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "secret-sync.octopilot.io/v1alpha1",
            "kind": "ExternalSecret",
            "metadata": {"name": name, "namespace": "apps"},
            "spec": {"storeRef": {"name": "vault"}}
        }))
        .unwrap()
    }

    fn tracker(objects: &InMemoryObjects) -> DeletionTracker {
        DeletionTracker::new(Reconciler::new(
            Arc::new(objects.clone()),
            Arc::new(FakeClientFactory::default()),
            Scheduler::new(),
            ControllerConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_delete_event_releases_state() {
        let objects = InMemoryObjects::default();
        let mut tracker = tracker(&objects);
        let reconciler = Arc::clone(&tracker.reconciler);
        reconciler.set_phase("apps/db", SyncPhase::Unavailable);
        reconciler.next_error_backoff("apps/db");
        reconciler
            .scheduler()
            .add("apps/db", Duration::from_secs(300), || async { Ok(()) })
            .unwrap();

        tracker
            .handle(watcher::Event::Delete(external_secret("db")))
            .await;

        assert!(reconciler.tracked_identities().is_empty());
        assert!(!reconciler.scheduler().is_scheduled("apps/db"));
    }

    #[tokio::test]
    async fn test_delete_event_keeps_state_of_recreated_resource() {
        let objects = InMemoryObjects::default();
        objects.put_external_secret(external_secret("db"));
        let mut tracker = tracker(&objects);
        tracker.reconciler.set_phase("apps/db", SyncPhase::Available);

        tracker
            .handle(watcher::Event::Delete(external_secret("db")))
            .await;

        assert_eq!(tracker.reconciler.phase("apps/db"), SyncPhase::Available);
    }

    #[tokio::test]
    async fn test_relist_releases_identities_missing_from_the_list() {
        let objects = InMemoryObjects::default();
        objects.put_external_secret(external_secret("kept"));
        let mut tracker = tracker(&objects);
        tracker.reconciler.set_phase("apps/kept", SyncPhase::Available);
        tracker.reconciler.set_phase("apps/gone", SyncPhase::Available);

        tracker.handle(watcher::Event::Init).await;
        tracker
            .handle(watcher::Event::InitApply(external_secret("kept")))
            .await;
        tracker.handle(watcher::Event::InitDone).await;

        assert_eq!(
            tracker.reconciler.tracked_identities().into_iter().collect::<Vec<_>>(),
            vec!["apps/kept".to_string()]
        );
    }
}
