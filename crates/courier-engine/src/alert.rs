// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Log-only alert sink, used when no email channel is configured.

use async_trait::async_trait;
use courier_core::types::Alert;
use courier_core::{AlertSink, CourierError};
use tracing::error;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn send_alert(&self, alert: &Alert) -> Result<(), CourierError> {
        error!(
            alert_kind = %alert.kind,
            subject = %alert.subject,
            detail = %alert.detail,
            raised_at = %alert.raised_at,
            "ALERT"
        );
        Ok(())
    }
}
