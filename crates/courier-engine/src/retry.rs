// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable error recovery queue.
//!
//! Recoverable failures are written as retry entries keyed by
//! `(item_type, item_ref)`. [`ErrorRecoveryQueue::process_due`] atomically
//! claims due entries and hands each to the [`RetryHandler`] wired for its
//! type. Attempt `n` becomes eligible `base * 2^(n-1)` after the previous
//! failure; an entry that exhausts `max_attempts` is dead-lettered, never
//! dropped, and raises an alert.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_config::model::RetryConfig;
use courier_core::types::{Alert, AlertKind, NewRetryEntry, RetryEntry, RetryItemType};
use courier_core::{AlertSink, Clock, CourierError, StorageAdapter};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::compliance::ComplianceGate;
use crate::dispatch::CampaignDispatchEngine;
use crate::ingest::Ingestor;

/// Largest exponent applied to the base delay.
const MAX_BACKOFF_EXPONENT: u32 = 20;

/// Delay before attempt `attempt` (1-based): `base * 2^(attempt-1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    base.saturating_mul(1u32 << exponent)
}

/// Backoff parameters shared by everything that opens retry entries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
    pub claim_ttl: Duration,
    pub batch_size: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            base_delay: Duration::from_secs(config.base_delay_secs),
            max_attempts: config.max_attempts,
            claim_ttl: Duration::from_secs(config.claim_ttl_secs),
            batch_size: config.batch_size,
        }
    }

    /// When attempt `attempt` may run, counting from `now`.
    pub fn eligible_at(&self, now: DateTime<Utc>, attempt: u32) -> DateTime<Utc> {
        add_std(now, backoff_delay(self.base_delay, attempt))
    }
}

/// `at + d`, saturating at the largest representable instant.
pub(crate) fn add_std(at: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Opens retry entries. Cheap to clone; held by every component that can
/// fail recoverably.
#[derive(Clone)]
pub struct RetryScheduler {
    store: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl RetryScheduler {
    pub fn new(store: Arc<dyn StorageAdapter>, clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// An entry eligible after the first backoff step, for callers that
    /// write it themselves.
    pub fn entry(
        &self,
        item_type: RetryItemType,
        item_ref: &str,
        payload: Option<String>,
        max_attempts: Option<u32>,
        error: &str,
    ) -> NewRetryEntry {
        let now = self.clock.now();
        NewRetryEntry {
            item_type,
            item_ref: item_ref.to_string(),
            payload,
            max_attempts: max_attempts.unwrap_or(self.policy.max_attempts).max(1),
            next_eligible_at: self.policy.eligible_at(now, 1),
            last_error: error.to_string(),
            created_at: now,
        }
    }

    /// Opens an entry eligible after the first backoff step, or refreshes the
    /// error on the entry already open for this item.
    pub async fn enqueue(
        &self,
        item_type: RetryItemType,
        item_ref: &str,
        payload: Option<String>,
        max_attempts: Option<u32>,
        error: &str,
    ) -> Result<i64, CourierError> {
        let entry = self.entry(item_type, item_ref, payload, max_attempts, error);
        let id = self.store.upsert_retry(&entry).await?;
        debug!(retry_id = id, %item_type, item_ref, "retry entry opened");
        Ok(id)
    }
}

/// What a handler did with a claimed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The work is done (or no longer needed); the entry is deleted.
    Done,
    /// Preconditions are not met yet; retried later without using an attempt.
    Deferred,
}

/// Replays one kind of retry entry.
#[async_trait]
pub trait RetryHandler: Send + Sync + 'static {
    /// Re-executes the failed work. An error counts as a failed attempt.
    async fn handle(&self, entry: &RetryEntry) -> Result<HandlerOutcome, CourierError>;

    /// Called once when the entry is dead-lettered.
    async fn on_dead_letter(&self, _entry: &RetryEntry, _error: &str) -> Result<(), CourierError> {
        Ok(())
    }
}

/// One handler per item type, wired at process start.
#[derive(Clone)]
pub struct RetryHandlers {
    pub ingest_event: Arc<dyn RetryHandler>,
    pub campaign_send: Arc<dyn RetryHandler>,
    pub confirmation_send: Arc<dyn RetryHandler>,
}

impl RetryHandlers {
    pub fn for_type(&self, item_type: RetryItemType) -> &Arc<dyn RetryHandler> {
        match item_type {
            RetryItemType::IngestEvent => &self.ingest_event,
            RetryItemType::CampaignSend => &self.campaign_send,
            RetryItemType::ConfirmationSend => &self.confirmation_send,
        }
    }
}

/// Counters for one `process_due` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryStats {
    pub claimed: u32,
    pub succeeded: u32,
    pub rescheduled: u32,
    pub deferred: u32,
    pub dead_lettered: u32,
}

/// The queue drain: claims due entries and runs their handlers.
pub struct ErrorRecoveryQueue {
    store: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
    alerts: Arc<dyn AlertSink>,
    scheduler: RetryScheduler,
    handlers: RetryHandlers,
}

impl ErrorRecoveryQueue {
    pub fn new(
        store: Arc<dyn StorageAdapter>,
        clock: Arc<dyn Clock>,
        alerts: Arc<dyn AlertSink>,
        scheduler: RetryScheduler,
        handlers: RetryHandlers,
    ) -> Self {
        Self {
            store,
            clock,
            alerts,
            scheduler,
            handlers,
        }
    }

    /// See [`RetryScheduler::enqueue`].
    pub async fn enqueue(
        &self,
        item_type: RetryItemType,
        item_ref: &str,
        payload: Option<String>,
        error: &str,
    ) -> Result<i64, CourierError> {
        self.scheduler
            .enqueue(item_type, item_ref, payload, None, error)
            .await
    }

    /// Claims and processes every due entry, up to the batch size.
    pub async fn process_due(&self) -> Result<RetryStats, CourierError> {
        let policy = *self.scheduler.policy();
        let now = self.clock.now();
        let claim_until = add_std(now, policy.claim_ttl);
        let claimed = self
            .store
            .claim_due_retries(now, claim_until, policy.batch_size)
            .await?;

        let mut stats = RetryStats {
            claimed: claimed.len() as u32,
            ..RetryStats::default()
        };

        for entry in &claimed {
            let handler = self.handlers.for_type(entry.item_type);
            let outcome = handler.handle(entry).await;
            let now = self.clock.now();
            match outcome {
                Ok(HandlerOutcome::Done) => {
                    self.store.delete_retry(entry.id).await?;
                    courier_prometheus::record_retry(&entry.item_type.to_string(), "succeeded");
                    info!(retry_id = entry.id, item_type = %entry.item_type, item_ref = %entry.item_ref, attempt = entry.attempt_count + 1, "retry succeeded");
                    stats.succeeded += 1;
                }
                Ok(HandlerOutcome::Deferred) => {
                    let last_error = entry.last_error.as_deref().unwrap_or("deferred");
                    self.store
                        .reschedule_retry(
                            entry.id,
                            entry.attempt_count,
                            add_std(now, policy.base_delay),
                            last_error,
                            now,
                        )
                        .await?;
                    courier_prometheus::record_retry(&entry.item_type.to_string(), "deferred");
                    debug!(retry_id = entry.id, item_ref = %entry.item_ref, "retry deferred");
                    stats.deferred += 1;
                }
                Err(e) => {
                    let attempt = entry.attempt_count + 1;
                    let message = e.to_string();
                    if !e.is_transient() || attempt >= entry.max_attempts {
                        self.dead_letter(entry, attempt, &message, handler.as_ref())
                            .await?;
                        stats.dead_lettered += 1;
                    } else {
                        let next = policy.eligible_at(now, attempt + 1);
                        self.store
                            .reschedule_retry(entry.id, attempt, next, &message, now)
                            .await?;
                        courier_prometheus::record_retry(&entry.item_type.to_string(), "rescheduled");
                        warn!(
                            retry_id = entry.id,
                            item_type = %entry.item_type,
                            item_ref = %entry.item_ref,
                            attempt,
                            next_eligible_at = %next,
                            error = %message,
                            "retry attempt failed"
                        );
                        stats.rescheduled += 1;
                    }
                }
            }
        }

        if stats.claimed > 0 {
            info!(
                claimed = stats.claimed,
                succeeded = stats.succeeded,
                rescheduled = stats.rescheduled,
                deferred = stats.deferred,
                dead_lettered = stats.dead_lettered,
                "retry queue drained"
            );
        }
        Ok(stats)
    }

    async fn dead_letter(
        &self,
        entry: &RetryEntry,
        attempt: u32,
        message: &str,
        handler: &dyn RetryHandler,
    ) -> Result<(), CourierError> {
        let now = self.clock.now();
        self.store
            .dead_letter_retry(entry.id, attempt, message, now)
            .await?;
        courier_prometheus::record_retry(&entry.item_type.to_string(), "dead_lettered");
        error!(
            retry_id = entry.id,
            item_type = %entry.item_type,
            item_ref = %entry.item_ref,
            attempt,
            error = %message,
            "retry entry dead-lettered"
        );

        if let Err(e) = handler.on_dead_letter(entry, message).await {
            error!(retry_id = entry.id, error = %e, "dead-letter follow-up failed");
        }

        let alert = Alert {
            kind: AlertKind::DeadLetter,
            subject: format!("{} {} dead-lettered", entry.item_type, entry.item_ref),
            detail: format!("after {attempt} attempt(s): {message}"),
            raised_at: now,
        };
        if let Err(e) = self.alerts.send_alert(&alert).await {
            error!(retry_id = entry.id, error = %e, "failed to deliver dead-letter alert");
        }
        Ok(())
    }

    /// Dead-lettered entries, newest first.
    pub async fn dead_letters(&self, limit: u32) -> Result<Vec<RetryEntry>, CourierError> {
        let entries = self.store.list_dead_letters(limit).await?;
        courier_prometheus::set_dead_letters(entries.len() as f64);
        Ok(entries)
    }
}

/// Replays a webhook payload through the shared ingestion primitive.
pub struct IngestReplayHandler {
    ingestor: Arc<Ingestor>,
}

impl IngestReplayHandler {
    pub fn new(ingestor: Arc<Ingestor>) -> Self {
        Self { ingestor }
    }
}

#[async_trait]
impl RetryHandler for IngestReplayHandler {
    async fn handle(&self, entry: &RetryEntry) -> Result<HandlerOutcome, CourierError> {
        let payload = entry.payload.as_deref().ok_or_else(|| {
            CourierError::Permanent(format!("ingest retry {} has no payload", entry.id))
        })?;
        self.ingestor.replay(payload).await?;
        Ok(HandlerOutcome::Done)
    }
}

/// Re-sends a campaign member under its campaign lease.
pub struct CampaignSendHandler {
    engine: Arc<CampaignDispatchEngine>,
}

impl CampaignSendHandler {
    pub fn new(engine: Arc<CampaignDispatchEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl RetryHandler for CampaignSendHandler {
    async fn handle(&self, entry: &RetryEntry) -> Result<HandlerOutcome, CourierError> {
        let (campaign_id, sequence) = parse_member_ref(&entry.item_ref)?;
        self.engine.retry_member(campaign_id, sequence).await
    }

    async fn on_dead_letter(&self, entry: &RetryEntry, error: &str) -> Result<(), CourierError> {
        let (campaign_id, sequence) = parse_member_ref(&entry.item_ref)?;
        self.engine.fail_member(campaign_id, sequence, error).await
    }
}

/// Re-sends an opt-out/opt-in confirmation.
pub struct ConfirmationSendHandler {
    gate: Arc<ComplianceGate>,
}

impl ConfirmationSendHandler {
    pub fn new(gate: Arc<ComplianceGate>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl RetryHandler for ConfirmationSendHandler {
    async fn handle(&self, entry: &RetryEntry) -> Result<HandlerOutcome, CourierError> {
        let payload = entry.payload.as_deref().ok_or_else(|| {
            CourierError::Permanent(format!("confirmation retry {} has no payload", entry.id))
        })?;
        self.gate.resend_confirmation(payload).await?;
        Ok(HandlerOutcome::Done)
    }
}

/// Retry key for a campaign member.
pub fn member_ref(campaign_id: &str, sequence: i64) -> String {
    format!("{campaign_id}:{sequence}")
}

fn parse_member_ref(item_ref: &str) -> Result<(&str, i64), CourierError> {
    item_ref
        .rsplit_once(':')
        .and_then(|(id, seq)| seq.parse::<i64>().ok().map(|seq| (id, seq)))
        .ok_or_else(|| CourierError::Permanent(format!("invalid campaign member ref `{item_ref}`")))
}
