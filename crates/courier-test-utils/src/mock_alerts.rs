// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alert sink that records instead of notifying.

use async_trait::async_trait;
use courier_core::types::{Alert, AlertKind};
use courier_core::{AlertSink, CourierError};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().await.clone()
    }

    pub async fn count(&self, kind: AlertKind) -> usize {
        self.alerts
            .lock()
            .await
            .iter()
            .filter(|a| a.kind == kind)
            .count()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn send_alert(&self, alert: &Alert) -> Result<(), CourierError> {
        self.alerts.lock().await.push(alert.clone());
        Ok(())
    }
}
