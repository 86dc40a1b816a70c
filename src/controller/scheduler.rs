//! # Scheduler
//!
//! Keeps one recurring job per ExternalSecret identity (`namespace/name`).
//!
//! - [`Scheduler::add`] registers or replaces a job. It fires once immediately
//!   and then every `interval`, measured from registration (fixed rate), so a
//!   slow job body never shifts later firing times.
//! - [`Scheduler::remove`] cancels future firings. A firing already in flight
//!   runs to completion.
//! - [`Scheduler::run`] is the dispatch loop. Every due job is spawned on its
//!   own task; the schedule lock is held only while the map is read or mutated.
//!
//! A failing or panicking job is logged and stays registered.

use crate::observability::metrics;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Job body run on every firing
pub type Job = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Rejected registrations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("refusing to schedule {0} with a zero interval")]
    ZeroInterval(String),
}

struct ScheduleEntry {
    next_fire: Instant,
    interval: Duration,
    job: Job,
}

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<String, ScheduleEntry>>,
    /// Wakes the dispatch loop when the earliest deadline may have moved
    changed: Notify,
}

/// Per-identity recurring job scheduler
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, ScheduleEntry>> {
        // Entries stay consistent across a panic: every mutation is a single insert/remove
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register or replace the job for `identity`
    ///
    /// The job is due immediately and then every `interval`.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::ZeroInterval`] for a zero interval.
    pub fn add<F, Fut>(
        &self,
        identity: impl Into<String>,
        interval: Duration,
        job: F,
    ) -> Result<(), ScheduleError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let identity = identity.into();
        if interval.is_zero() {
            return Err(ScheduleError::ZeroInterval(identity));
        }

        let job: Job = Arc::new(move || job().boxed());
        let count = {
            let mut entries = self.entries();
            let replaced = entries
                .insert(
                    identity.clone(),
                    ScheduleEntry {
                        next_fire: Instant::now(),
                        interval,
                        job,
                    },
                )
                .is_some();
            debug!(
                identity = %identity,
                interval_secs = interval.as_secs(),
                replaced,
                "Scheduled job"
            );
            entries.len()
        };
        metrics::set_scheduled_entities(count);
        self.inner.changed.notify_one();
        Ok(())
    }

    /// Cancel future firings for `identity`; returns whether an entry existed
    pub fn remove(&self, identity: &str) -> bool {
        let (removed, count) = {
            let mut entries = self.entries();
            (entries.remove(identity).is_some(), entries.len())
        };
        if removed {
            debug!(identity = %identity, "Unscheduled job");
            metrics::set_scheduled_entities(count);
            self.inner.changed.notify_one();
        }
        removed
    }

    #[must_use]
    pub fn is_scheduled(&self, identity: &str) -> bool {
        self.entries().contains_key(identity)
    }

    /// Interval of the job registered for `identity`
    #[must_use]
    pub fn interval_of(&self, identity: &str) -> Option<Duration> {
        self.entries().get(identity).map(|entry| entry.interval)
    }

    /// Identities with a registered job
    #[must_use]
    pub fn identities(&self) -> Vec<String> {
        self.entries().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Earliest pending firing
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries().values().map(|entry| entry.next_fire).min()
    }

    /// Dispatch every job due at `now`; returns how many were spawned
    ///
    /// Due entries advance by whole intervals past `now`, so firings missed
    /// while the loop was stalled are skipped rather than replayed. An entry
    /// whose next firing is not representable fires one last time and is
    /// dropped.
    pub fn tick(&self, now: Instant) -> usize {
        let (due, expired, count) = {
            let mut entries = self.entries();
            let mut due = Vec::new();
            let mut expired = Vec::new();
            for (identity, entry) in entries.iter_mut() {
                if entry.next_fire > now {
                    continue;
                }
                due.push((identity.clone(), Arc::clone(&entry.job)));
                match next_fire_after(entry.next_fire, entry.interval, now) {
                    Some(next_fire) => entry.next_fire = next_fire,
                    None => expired.push(identity.clone()),
                }
            }
            for identity in &expired {
                entries.remove(identity);
            }
            (due, expired, entries.len())
        };

        if !expired.is_empty() {
            for identity in &expired {
                error!(identity = %identity, "Interval overflows the clock, dropping scheduled job");
            }
            metrics::set_scheduled_entities(count);
        }
        for (identity, job) in &due {
            metrics::increment_scheduler_fires();
            tokio::spawn(dispatch(identity.clone(), Arc::clone(job)));
        }
        due.len()
    }

    /// Run the dispatch loop until `shutdown` is cancelled
    ///
    /// All entries are dropped on shutdown.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Scheduler started");
        loop {
            self.tick(Instant::now());
            let deadline = self.next_deadline();

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = self.inner.changed.notified() => {}
                () = sleep_until(deadline) => {}
            }
        }

        let dropped = {
            let mut entries = self.entries();
            let dropped = entries.len();
            entries.clear();
            dropped
        };
        metrics::set_scheduled_entities(0);
        info!(dropped, "Scheduler stopped");
    }
}

/// First firing strictly after `now` on the fixed-rate grid starting at `next_fire`
fn next_fire_after(mut next_fire: Instant, interval: Duration, now: Instant) -> Option<Instant> {
    while next_fire <= now {
        next_fire = next_fire.checked_add(interval)?;
    }
    Some(next_fire)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Run one firing, containing errors and panics
async fn dispatch(identity: String, job: Job) {
    match AssertUnwindSafe(job()).catch_unwind().await {
        Ok(Ok(())) => debug!(identity = %identity, "Scheduled job completed"),
        Ok(Err(e)) => warn!(identity = %identity, error = %format!("{e:#}"), "Scheduled job failed"),
        Err(_) => error!(identity = %identity, "Scheduled job panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_job(counter: &Arc<AtomicUsize>) -> impl Fn() -> BoxFuture<'static, anyhow::Result<()>> {
        let counter = Arc::clone(counter);
        move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        }
    }

    fn spawn_loop(scheduler: &Scheduler) -> CancellationToken {
        let token = CancellationToken::new();
        let loop_scheduler = scheduler.clone();
        let loop_token = token.clone();
        tokio::spawn(async move { loop_scheduler.run(loop_token).await });
        token
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_immediately_then_every_interval() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let token = spawn_loop(&scheduler);

        scheduler
            .add("apps/db", Duration::from_secs(60), counting_job(&fired))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 4);

        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_job_does_not_shift_firing_times() {
        let scheduler = Scheduler::new();
        let started = Arc::new(AtomicUsize::new(0));
        let token = spawn_loop(&scheduler);

        let job_started = Arc::clone(&started);
        scheduler
            .add("apps/slow", Duration::from_secs(60), move || {
                let started = Arc::clone(&job_started);
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    // Longer than the interval
                    tokio::time::sleep(Duration::from_secs(150)).await;
                    Ok(())
                }
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(181)).await;
        // Fired at 0s, 60s, 120s and 180s despite each run taking 150s
        assert_eq!(started.load(Ordering::SeqCst), 4);

        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_job_does_not_delay_other_identities() {
        let scheduler = Scheduler::new();
        let fast = Arc::new(AtomicUsize::new(0));
        let token = spawn_loop(&scheduler);

        scheduler
            .add("apps/stuck", Duration::from_secs(60), || async {
                std::future::pending::<()>().await;
                Ok(())
            })
            .unwrap();
        scheduler
            .add("apps/fast", Duration::from_secs(60), counting_job(&fast))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(fast.load(Ordering::SeqCst), 2);

        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_re_adding_before_first_fire_keeps_one_entry() {
        let scheduler = Scheduler::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        scheduler
            .add("apps/db", Duration::from_secs(60), counting_job(&first))
            .unwrap();
        scheduler
            .add("apps/db", Duration::from_secs(120), counting_job(&second))
            .unwrap();

        assert_eq!(scheduler.len(), 1);
        assert_eq!(
            scheduler.interval_of("apps/db"),
            Some(Duration::from_secs(120))
        );

        assert_eq!(scheduler.tick(Instant::now()), 1);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_cancels_future_firings() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let token = spawn_loop(&scheduler);

        scheduler
            .add("apps/db", Duration::from_secs(60), counting_job(&fired))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        assert!(scheduler.remove("apps/db"));
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_scheduled("apps/db"));

        token.cancel();
    }

    #[test]
    fn test_remove_unknown_identity_is_noop() {
        let scheduler = Scheduler::new();
        assert!(!scheduler.remove("apps/missing"));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let scheduler = Scheduler::new();
        let result = scheduler.add("apps/db", Duration::ZERO, || async { Ok(()) });
        assert_eq!(
            result,
            Err(ScheduleError::ZeroInterval("apps/db".to_string()))
        );
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_and_panicking_jobs_stay_registered() {
        let scheduler = Scheduler::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let token = spawn_loop(&scheduler);

        let failing = Arc::clone(&attempts);
        scheduler
            .add("apps/failing", Duration::from_secs(60), move || {
                let attempts = Arc::clone(&failing);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("backend unavailable")
                }
            })
            .unwrap();
        scheduler
            .add("apps/panicking", Duration::from_secs(60), || async {
                panic!("job bug")
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(scheduler.is_scheduled("apps/failing"));
        assert!(scheduler.is_scheduled("apps/panicking"));

        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_interval_is_dropped_without_stopping_the_loop() {
        let scheduler = Scheduler::new();
        let huge = Arc::new(AtomicUsize::new(0));
        let other = Arc::new(AtomicUsize::new(0));
        let token = spawn_loop(&scheduler);

        scheduler
            .add("apps/huge", Duration::MAX, counting_job(&huge))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(huge.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_scheduled("apps/huge"));

        scheduler
            .add("apps/other", Duration::from_secs(60), counting_job(&other))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(other.load(Ordering::SeqCst), 2);

        token.cancel();
    }

    #[test]
    fn test_next_fire_after_skips_missed_firings() {
        let start = Instant::now();
        let interval = Duration::from_secs(60);
        assert_eq!(
            next_fire_after(start, interval, start + Duration::from_secs(150)),
            Some(start + Duration::from_secs(180))
        );
        assert_eq!(next_fire_after(start, Duration::MAX, start), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_clears_entries() {
        let scheduler = Scheduler::new();
        let token = CancellationToken::new();
        let loop_scheduler = scheduler.clone();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move { loop_scheduler.run(loop_token).await });

        scheduler
            .add("apps/db", Duration::from_secs(60), || async { Ok(()) })
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        token.cancel();
        handle.await.unwrap();
        assert!(scheduler.is_empty());
    }
}
