// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-interval scheduler guarded by store leases.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::{Clock, CourierError, StorageAdapter};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One unit of periodic work.
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    /// Stable task name, used for the lease and in logs and metrics.
    fn name(&self) -> &'static str;

    /// Runs once. Returns a short human-readable summary.
    async fn run(&self) -> Result<String, CourierError>;
}

/// Store lease name for a scheduled task.
pub fn task_lease(name: &str) -> String {
    format!("task:{name}")
}

/// Result of one firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRun {
    Completed { summary: String },
    /// The task lease was held by another firing.
    Skipped,
}

struct ScheduledTask {
    job: Arc<dyn ScheduledJob>,
    interval: Duration,
}

/// Drives registered jobs on fixed intervals until cancelled.
pub struct Scheduler {
    store: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
    holder: String,
    lease_ttl: Duration,
    tasks: Vec<ScheduledTask>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn StorageAdapter>,
        clock: Arc<dyn Clock>,
        holder: impl Into<String>,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            holder: holder.into(),
            lease_ttl,
            tasks: Vec::new(),
        }
    }

    /// Registers `job` to fire every `interval`. A zero interval disables it.
    pub fn add(&mut self, job: Arc<dyn ScheduledJob>, interval: Duration) -> &mut Self {
        if interval.is_zero() {
            warn!(task = job.name(), "zero interval, task not scheduled");
            return self;
        }
        self.tasks.push(ScheduledTask { job, interval });
        self
    }

    /// Names of the registered tasks, in registration order.
    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.job.name()).collect()
    }

    /// Fires one job now, under its lease.
    pub async fn run_once(&self, job: &dyn ScheduledJob) -> Result<TaskRun, CourierError> {
        run_guarded(
            self.store.as_ref(),
            self.clock.as_ref(),
            &self.holder,
            self.lease_ttl,
            job,
        )
        .await
    }

    /// Spawns one loop per task. Each loop waits a full interval before its
    /// first firing and exits when `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let Scheduler {
            store,
            clock,
            holder,
            lease_ttl,
            tasks,
        } = self;

        tasks
            .into_iter()
            .map(|task| {
                let store = store.clone();
                let clock = clock.clone();
                let holder = holder.clone();
                let cancel = cancel.clone();
                info!(task = task.job.name(), interval_secs = task.interval.as_secs_f64(), "scheduled task registered");
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(task.interval);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    // Skip the first immediate tick.
                    interval.tick().await;

                    loop {
                        tokio::select! {
                            _ = interval.tick() => {
                                let job = task.job.as_ref();
                                if let Err(e) = run_guarded(store.as_ref(), clock.as_ref(), &holder, lease_ttl, job).await {
                                    warn!(task = job.name(), error = %e, "scheduled task failed (non-fatal)");
                                }
                            }
                            _ = cancel.cancelled() => {
                                info!(task = task.job.name(), "scheduled task shutting down");
                                break;
                            }
                        }
                    }
                })
            })
            .collect()
    }
}

async fn run_guarded(
    store: &dyn StorageAdapter,
    clock: &dyn Clock,
    holder: &str,
    lease_ttl: Duration,
    job: &dyn ScheduledJob,
) -> Result<TaskRun, CourierError> {
    let name = job.name();
    let lease = task_lease(name);
    let now = clock.now();
    let expires = chrono::Duration::from_std(lease_ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(now);

    if !store.try_acquire_lease(&lease, holder, now, expires).await? {
        courier_prometheus::record_task_run(name, "skipped");
        debug!(task = name, "task lease held elsewhere, skipping firing");
        return Ok(TaskRun::Skipped);
    }

    let result = job.run().await;
    if let Err(e) = store.release_lease(&lease, holder).await {
        warn!(task = name, error = %e, "failed to release task lease");
    }

    match result {
        Ok(summary) => {
            courier_prometheus::record_task_run(name, "ok");
            debug!(task = name, summary = %summary, "task finished");
            Ok(TaskRun::Completed { summary })
        }
        Err(e) => {
            courier_prometheus::record_task_run(name, "error");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use courier_test_utils::TestHarness;

    #[derive(Default)]
    struct CountingJob {
        runs: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl ScheduledJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self) -> Result<String, CourierError> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(CourierError::Transient("boom".into()));
            }
            Ok(format!("run {n}"))
        }
    }

    fn scheduler(h: &TestHarness, holder: &str) -> Scheduler {
        Scheduler::new(
            h.storage.clone(),
            h.clock.clone(),
            holder,
            Duration::from_secs(300),
        )
    }

    #[tokio::test]
    async fn run_once_takes_and_releases_the_lease() {
        let h = TestHarness::builder().build().await.unwrap();
        let s = scheduler(&h, "worker-a");
        let job = CountingJob::default();

        assert_eq!(
            s.run_once(&job).await.unwrap(),
            TaskRun::Completed { summary: "run 1".into() }
        );
        assert_eq!(
            s.run_once(&job).await.unwrap(),
            TaskRun::Completed { summary: "run 2".into() }
        );
    }

    #[tokio::test]
    async fn held_lease_skips_the_firing() {
        let h = TestHarness::builder().build().await.unwrap();
        let now = h.now();
        assert!(h
            .storage
            .try_acquire_lease(&task_lease("counting"), "worker-b", now, now + chrono::Duration::minutes(5))
            .await
            .unwrap());

        let job = CountingJob::default();
        assert_eq!(scheduler(&h, "worker-a").run_once(&job).await.unwrap(), TaskRun::Skipped);
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_run_still_releases_the_lease() {
        let h = TestHarness::builder().build().await.unwrap();
        let s = scheduler(&h, "worker-a");
        let job = CountingJob {
            fail: true,
            ..CountingJob::default()
        };

        assert!(s.run_once(&job).await.is_err());
        assert!(s.run_once(&job).await.is_err());
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_interval_is_not_scheduled() {
        let h = TestHarness::builder().build().await.unwrap();
        let mut s = scheduler(&h, "worker-a");
        s.add(Arc::new(CountingJob::default()), Duration::ZERO);
        assert!(s.task_names().is_empty());
    }

    #[tokio::test]
    async fn spawned_loops_fire_and_stop_on_cancel() {
        let h = TestHarness::builder().build().await.unwrap();
        let job = Arc::new(CountingJob::default());
        let mut s = scheduler(&h, "worker-a");
        s.add(job.clone(), Duration::from_millis(20));

        let cancel = CancellationToken::new();
        let handles = s.spawn(cancel.clone());
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(job.runs.load(Ordering::SeqCst) >= 2);
    }
}
