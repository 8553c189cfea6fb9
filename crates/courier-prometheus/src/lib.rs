// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics adapter for Courier.
//!
//! Uses the metrics-rs facade with the Prometheus exporter.
//! Metrics are rendered as Prometheus text format via the `render()` method,
//! which is exposed through the gateway's /metrics endpoint.

pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use courier_core::types::{AdapterType, HealthStatus};
use courier_core::{CourierError, PluginAdapter};

pub use recording::{
    record_compliance_transition, record_health_check, record_reconciled, record_retry, record_send,
    record_task_run, record_webhook, set_dead_letters,
};

/// Prometheus metrics adapter.
///
/// Installs the Prometheus recorder and exposes a handle for rendering
/// metrics in Prometheus text format.
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Create a new PrometheusAdapter.
    ///
    /// Installs the Prometheus recorder globally. Only one recorder can be
    /// installed per process. Returns an error if a recorder is already installed.
    pub fn new() -> Result<Self, CourierError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            CourierError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();

        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Build an adapter around a recorder that is not installed globally.
    ///
    /// Callers scope it with `metrics::with_local_recorder`.
    pub fn local() -> (Self, PrometheusRecorder) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (Self { handle }, recorder)
    }

    /// Get a reference to the Prometheus handle for rendering.
    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_recorder_renders_recorded_counters() {
        let (adapter, recorder) = PrometheusAdapter::local();
        metrics::with_local_recorder(&recorder, || {
            record_webhook("processed");
            record_webhook("processed");
            record_send("campaign", "sent");
        });
        let text = adapter.render();
        assert!(text.contains("courier_webhooks_total{outcome=\"processed\"} 2"), "{text}");
        assert!(text.contains("courier_sends_total"), "{text}");
    }

    #[test]
    fn check_latency_is_a_histogram() {
        let (adapter, recorder) = PrometheusAdapter::local();
        metrics::with_local_recorder(&recorder, || {
            record_health_check(true, Some(1.5));
            record_health_check(false, None);
        });
        let text = adapter.render();
        assert!(text.contains("courier_health_check_latency_seconds"), "{text}");
        assert!(text.contains("courier_health_checks_total{result=\"failed\"} 1"), "{text}");
    }

    #[tokio::test]
    async fn adapter_reports_healthy() {
        let (adapter, _recorder) = PrometheusAdapter::local();
        assert_eq!(adapter.name(), "prometheus");
        assert_eq!(adapter.adapter_type(), AdapterType::Observability);
        assert_eq!(adapter.health_check().await.unwrap(), HealthStatus::Healthy);
    }
}
