// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine components as scheduled jobs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_config::CourierConfig;
use courier_core::{CourierError, HealthStatus};
use courier_engine::{
    CampaignDispatchEngine, ErrorRecoveryQueue, EventArchiver, HealthCheckService,
    ReconciliationService, Services,
};

use crate::scheduler::{ScheduledJob, Scheduler};

pub struct DispatchJob(pub Arc<CampaignDispatchEngine>);

#[async_trait]
impl ScheduledJob for DispatchJob {
    fn name(&self) -> &'static str {
        "dispatch"
    }

    async fn run(&self) -> Result<String, CourierError> {
        let stats = self.0.tick().await?;
        Ok(format!(
            "{} campaign(s), {} sent, {} deferred, {} completed",
            stats.campaigns, stats.sent, stats.deferred, stats.completed
        ))
    }
}

pub struct RetryDrainJob(pub Arc<ErrorRecoveryQueue>);

#[async_trait]
impl ScheduledJob for RetryDrainJob {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn run(&self) -> Result<String, CourierError> {
        let stats = self.0.process_due().await?;
        Ok(format!(
            "{} claimed, {} succeeded, {} dead-lettered",
            stats.claimed, stats.succeeded, stats.dead_lettered
        ))
    }
}

/// Runs reconciliation with the configured lookback.
pub struct ReconcileJob(pub Arc<ReconciliationService>);

#[async_trait]
impl ScheduledJob for ReconcileJob {
    fn name(&self) -> &'static str {
        "reconcile"
    }

    async fn run(&self) -> Result<String, CourierError> {
        let stats = self.0.run(self.0.default_lookback()).await?;
        Ok(format!(
            "{} page(s), {} inserted, {} updated",
            stats.pages, stats.inserted, stats.updated
        ))
    }
}

pub struct HealthCheckJob(pub Arc<HealthCheckService>);

#[async_trait]
impl ScheduledJob for HealthCheckJob {
    fn name(&self) -> &'static str {
        "health"
    }

    async fn run(&self) -> Result<String, CourierError> {
        match self.0.run_check().await? {
            HealthStatus::Healthy => Ok("healthy".into()),
            HealthStatus::Degraded(detail) => Ok(format!("degraded: {detail}")),
            HealthStatus::Unhealthy(detail) => Ok(format!("unhealthy: {detail}")),
        }
    }
}

pub struct ArchiveJob(pub Arc<EventArchiver>);

#[async_trait]
impl ScheduledJob for ArchiveJob {
    fn name(&self) -> &'static str {
        "archive"
    }

    async fn run(&self) -> Result<String, CourierError> {
        let archived = self.0.run().await?;
        Ok(format!("{archived} event(s) archived"))
    }
}

impl Scheduler {
    /// Registers every engine job at its configured cadence. The health
    /// check is only scheduled when `health.enabled` is set.
    pub fn for_services(config: &CourierConfig, services: &Services, holder: &str) -> Self {
        let mut scheduler = Scheduler::new(
            services.adapters.store.clone(),
            services.adapters.clock.clone(),
            holder,
            Duration::from_secs(config.service.lease_ttl_secs),
        );
        scheduler
            .add(
                Arc::new(DispatchJob(services.dispatch.clone())),
                Duration::from_secs(config.dispatch.tick_interval_secs),
            )
            .add(
                Arc::new(RetryDrainJob(services.retry_queue.clone())),
                Duration::from_secs(config.retry.interval_secs),
            )
            .add(
                Arc::new(ReconcileJob(services.reconciliation.clone())),
                Duration::from_secs(config.reconciliation.interval_secs),
            )
            .add(
                Arc::new(ArchiveJob(services.archiver.clone())),
                Duration::from_secs(config.archive.interval_secs),
            );
        if config.health.enabled {
            scheduler.add(
                Arc::new(HealthCheckJob(services.health.clone())),
                Duration::from_secs(config.health.interval_secs),
            );
        }
        scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TaskRun;
    use courier_test_utils::TestHarness;

    #[tokio::test]
    async fn registers_every_engine_task() {
        let h = TestHarness::builder()
            .with_config(|c| c.health.enabled = true)
            .build()
            .await
            .unwrap();
        let scheduler = Scheduler::for_services(&h.config, &h.services, "worker-a");
        assert_eq!(
            scheduler.task_names(),
            vec!["dispatch", "retry", "reconcile", "archive", "health"]
        );
    }

    #[tokio::test]
    async fn health_check_is_opt_in() {
        let h = TestHarness::builder().build().await.unwrap();
        let scheduler = Scheduler::for_services(&h.config, &h.services, "worker-a");
        assert!(!scheduler.task_names().contains(&"health"));
    }

    #[tokio::test]
    async fn dispatch_job_summarizes_the_tick() {
        let h = TestHarness::builder().build().await.unwrap();
        let scheduler = Scheduler::for_services(&h.config, &h.services, "worker-a");
        let run = scheduler
            .run_once(&DispatchJob(h.services.dispatch.clone()))
            .await
            .unwrap();
        assert_eq!(
            run,
            TaskRun::Completed {
                summary: "0 campaign(s), 0 sent, 0 deferred, 0 completed".into()
            }
        );
    }

    #[tokio::test]
    async fn archive_job_reports_count() {
        let h = TestHarness::builder().build().await.unwrap();
        let scheduler = Scheduler::for_services(&h.config, &h.services, "worker-a");
        let run = scheduler
            .run_once(&ArchiveJob(h.services.archiver.clone()))
            .await
            .unwrap();
        assert_eq!(
            run,
            TaskRun::Completed {
                summary: "0 event(s) archived".into()
            }
        );
    }
}
