// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. Without an installed recorder every helper
//! is a no-op.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Courier metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "courier_webhooks_total",
        "Webhook deliveries by outcome (processed, duplicate, queued, rejected)"
    );
    describe_counter!("courier_sends_total", "Outbound provider sends by source and outcome");
    describe_counter!("courier_retry_total", "Retry queue attempts by item type and outcome");
    describe_counter!(
        "courier_reconciled_total",
        "Activities seen by reconciliation, by outcome"
    );
    describe_counter!(
        "courier_compliance_transitions_total",
        "Opt-out and opt-in transitions"
    );
    describe_counter!("courier_task_runs_total", "Scheduled task firings by outcome");
    describe_counter!("courier_health_checks_total", "Synthetic health checks by result");
    describe_gauge!("courier_dead_letters", "Retry entries in the dead-letter state");
    describe_histogram!(
        "courier_health_check_latency_seconds",
        "Round-trip latency of the synthetic health check"
    );
}

/// Record one webhook delivery.
pub fn record_webhook(outcome: &'static str) {
    metrics::counter!("courier_webhooks_total", "outcome" => outcome).increment(1);
}

/// Record one outbound send.
pub fn record_send(source: &'static str, outcome: &'static str) {
    metrics::counter!("courier_sends_total", "source" => source, "outcome" => outcome)
        .increment(1);
}

/// Record one retry attempt.
pub fn record_retry(item_type: &str, outcome: &'static str) {
    metrics::counter!(
        "courier_retry_total",
        "item_type" => item_type.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record reconciled activities.
pub fn record_reconciled(outcome: &'static str, count: u64) {
    metrics::counter!("courier_reconciled_total", "outcome" => outcome).increment(count);
}

/// Record a compliance transition (`opt_out` or `opt_in`).
pub fn record_compliance_transition(intent: &'static str) {
    metrics::counter!("courier_compliance_transitions_total", "intent" => intent).increment(1);
}

/// Record one scheduled task firing.
pub fn record_task_run(task: &str, outcome: &'static str) {
    metrics::counter!(
        "courier_task_runs_total",
        "task" => task.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a check result; latency only when the loop closed.
pub fn record_health_check(passed: bool, latency_seconds: Option<f64>) {
    let result = if passed { "passed" } else { "failed" };
    metrics::counter!("courier_health_checks_total", "result" => result).increment(1);
    if let Some(seconds) = latency_seconds {
        metrics::histogram!("courier_health_check_latency_seconds").record(seconds);
    }
}

/// Set the current dead-letter count.
pub fn set_dead_letters(count: f64) {
    metrics::gauge!("courier_dead_letters").set(count);
}
