// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging provider trait for the external SMS/voice API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CourierError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ActivityPage, OutboundMessage, SendReceipt};

/// Adapter for the external messaging provider.
///
/// Implementations must treat an ambiguous outcome (timeout, dropped
/// connection) as a failure, never as an accepted send.
#[async_trait]
pub trait MessagingProvider: PluginAdapter {
    /// Submits one message for delivery.
    async fn send_message(&self, message: &OutboundMessage) -> Result<SendReceipt, CourierError>;

    /// Lists activities created at or after `since`, one page at a time.
    async fn list_activities(
        &self,
        since: DateTime<Utc>,
        cursor: Option<&str>,
    ) -> Result<ActivityPage, CourierError>;
}
