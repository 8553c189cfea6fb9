// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synthetic end-to-end check.
//!
//! Sends a uniquely tagged message between two dedicated numbers and waits
//! for its inbound webhook to land in the store. A pipeline that silently
//! stopped delivering webhooks fails this check even while every component
//! reports itself healthy.

use std::sync::Arc;
use std::time::Duration;

use courier_config::model::HealthConfig;
use courier_core::types::{Alert, AlertKind, HealthCheckRecord, OutboundMessage};
use courier_core::{AlertSink, Clock, CourierError, HealthStatus, MessagingProvider, StorageAdapter};
use tokio::time::Instant;
use tracing::{error, info};

use crate::send::send_with_timeout;

pub struct HealthCheckService {
    store: Arc<dyn StorageAdapter>,
    provider: Arc<dyn MessagingProvider>,
    clock: Arc<dyn Clock>,
    alerts: Arc<dyn AlertSink>,
    config: HealthConfig,
    send_timeout: Duration,
}

impl HealthCheckService {
    pub fn new(
        store: Arc<dyn StorageAdapter>,
        provider: Arc<dyn MessagingProvider>,
        clock: Arc<dyn Clock>,
        alerts: Arc<dyn AlertSink>,
        config: HealthConfig,
        send_timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            clock,
            alerts,
            config,
            send_timeout,
        }
    }

    /// Runs one check. A failed check is reported as `Unhealthy`, not as an
    /// error; errors mean the check itself could not run.
    pub async fn run_check(&self) -> Result<HealthStatus, CourierError> {
        let (from, to) = match (&self.config.check_from, &self.config.check_to) {
            (Some(from), Some(to)) => (from.clone(), to.clone()),
            _ => {
                return Err(CourierError::Config(
                    "health.check_from and health.check_to must both be set".into(),
                ));
            }
        };

        let body = format!("courier health check {}", uuid::Uuid::new_v4().simple());
        let started_at = self.clock.now();
        let started = Instant::now();
        let message = OutboundMessage {
            from: from.clone(),
            to,
            body: body.clone(),
            media_urls: vec![],
        };

        let receipt = match send_with_timeout(self.provider.as_ref(), &message, self.send_timeout).await {
            Ok(receipt) => receipt,
            Err(e) => {
                let detail = format!("check send failed: {e}");
                return self.fail(None, detail).await;
            }
        };

        let deadline = started + Duration::from_secs(self.config.timeout_secs);
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));
        loop {
            if let Some(inbound) = self
                .store
                .find_inbound_activity(&from, &body, started_at)
                .await?
            {
                let latency = started.elapsed();
                let record = HealthCheckRecord {
                    outbound_external_id: Some(receipt.external_id.clone()),
                    passed: true,
                    latency_ms: Some(latency.as_millis() as i64),
                    detail: format!("inbound {} received", inbound.external_id),
                    created_at: self.clock.now(),
                };
                self.store.insert_health_check(&record).await?;
                courier_prometheus::record_health_check(true, Some(latency.as_secs_f64()));
                info!(
                    outbound = %receipt.external_id,
                    inbound = %inbound.external_id,
                    latency_ms = latency.as_millis() as u64,
                    "health check passed"
                );
                return Ok(HealthStatus::Healthy);
            }
            if Instant::now() >= deadline {
                let detail = format!(
                    "no inbound webhook for check {} within {}s",
                    receipt.external_id, self.config.timeout_secs
                );
                return self.fail(Some(receipt.external_id), detail).await;
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn fail(
        &self,
        outbound_external_id: Option<String>,
        detail: String,
    ) -> Result<HealthStatus, CourierError> {
        let now = self.clock.now();
        let record = HealthCheckRecord {
            outbound_external_id,
            passed: false,
            latency_ms: None,
            detail: detail.clone(),
            created_at: now,
        };
        self.store.insert_health_check(&record).await?;
        courier_prometheus::record_health_check(false, None);
        error!(detail = %detail, "health check failed");

        let alert = Alert {
            kind: AlertKind::HealthCheckFailed,
            subject: "health check failed".into(),
            detail: detail.clone(),
            raised_at: now,
        };
        if let Err(e) = self.alerts.send_alert(&alert).await {
            error!(error = %e, "failed to deliver health alert");
        }
        Ok(HealthStatus::Unhealthy(detail))
    }
}
