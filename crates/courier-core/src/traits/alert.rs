// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alerting egress trait.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::types::Alert;

/// The single notification channel for pipeline-level failures and
/// dead-lettered work.
#[async_trait]
pub trait AlertSink: Send + Sync + 'static {
    /// Delivers one alert to the operators.
    async fn send_alert(&self, alert: &Alert) -> Result<(), CourierError>;
}
