// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock messaging provider for deterministic testing.
//!
//! Send outcomes are popped from a FIFO script; when the script is empty
//! every send is accepted. Feed pages are popped the same way; when none
//! are queued the feed is empty. Every call is recorded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::types::{
    ActivityPage, ActivityStatus, AdapterType, HealthStatus, OutboundMessage, SendReceipt,
};
use courier_core::{CourierError, MessagingProvider, PluginAdapter};
use tokio::sync::Mutex;

/// One scripted response to `send_message`.
#[derive(Debug, Clone)]
pub enum ScriptedSend {
    Accept,
    /// Fails with a retryable provider error.
    Transient(String),
    /// Fails with a non-retryable provider error.
    Permanent(String),
    /// Sleeps before accepting, to trip caller timeouts.
    Stall(Duration),
}

/// A feed request as seen by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    pub since: DateTime<Utc>,
    pub cursor: Option<String>,
}

#[derive(Default)]
pub struct MockProvider {
    sends: Mutex<VecDeque<ScriptedSend>>,
    pages: Mutex<VecDeque<Result<ActivityPage, String>>>,
    sent: Mutex<Vec<OutboundMessage>>,
    attempts: AtomicU64,
    feed_requests: Mutex<Vec<FeedRequest>>,
    next_id: AtomicU64,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for the next sends, in order.
    pub async fn script_sends(&self, outcomes: impl IntoIterator<Item = ScriptedSend>) {
        self.sends.lock().await.extend(outcomes);
    }

    /// Queue a feed page.
    pub async fn push_page(&self, page: ActivityPage) {
        self.pages.lock().await.push_back(Ok(page));
    }

    /// Queue a failing feed request (retryable).
    pub async fn push_page_error(&self, message: &str) {
        self.pages.lock().await.push_back(Err(message.to_string()));
    }

    /// Messages the provider accepted.
    pub async fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    /// Accepted messages to one recipient.
    pub async fn sent_to(&self, to: &str) -> usize {
        self.sent.lock().await.iter().filter(|m| m.to == to).count()
    }

    /// Every send call, accepted or not.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn feed_requests(&self) -> Vec<FeedRequest> {
        self.feed_requests.lock().await.clone()
    }

    fn accept(&self) -> SendReceipt {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        SendReceipt {
            external_id: format!("mock_msg_{n}"),
            status: ActivityStatus::Queued,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        Ok(())
    }
}

#[async_trait]
impl MessagingProvider for MockProvider {
    async fn send_message(&self, message: &OutboundMessage) -> Result<SendReceipt, CourierError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .sends
            .lock()
            .await
            .pop_front()
            .unwrap_or(ScriptedSend::Accept);
        match scripted {
            ScriptedSend::Accept => {}
            ScriptedSend::Transient(message) => {
                return Err(CourierError::Provider {
                    message,
                    retryable: true,
                    source: None,
                });
            }
            ScriptedSend::Permanent(message) => {
                return Err(CourierError::Provider {
                    message,
                    retryable: false,
                    source: None,
                });
            }
            ScriptedSend::Stall(delay) => tokio::time::sleep(delay).await,
        }
        let receipt = self.accept();
        self.sent.lock().await.push(message.clone());
        Ok(receipt)
    }

    async fn list_activities(
        &self,
        since: DateTime<Utc>,
        cursor: Option<&str>,
    ) -> Result<ActivityPage, CourierError> {
        self.feed_requests.lock().await.push(FeedRequest {
            since,
            cursor: cursor.map(str::to_string),
        });
        match self.pages.lock().await.pop_front() {
            Some(Ok(page)) => Ok(page),
            Some(Err(message)) => Err(CourierError::Provider {
                message,
                retryable: true,
                source: None,
            }),
            None => Ok(ActivityPage::default()),
        }
    }
}
