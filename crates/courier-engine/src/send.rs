// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded provider sends.

use std::time::Duration;

use courier_core::types::{OutboundMessage, SendReceipt};
use courier_core::{CourierError, MessagingProvider};

/// Sends one message, turning an elapsed deadline into a transient
/// [`CourierError::Timeout`]. An ambiguous send is never reported as accepted.
pub async fn send_with_timeout(
    provider: &dyn MessagingProvider,
    message: &OutboundMessage,
    timeout: Duration,
) -> Result<SendReceipt, CourierError> {
    match tokio::time::timeout(timeout, provider.send_message(message)).await {
        Ok(result) => result,
        Err(_) => Err(CourierError::Timeout { duration: timeout }),
    }
}
