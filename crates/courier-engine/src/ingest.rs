// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook ingestion and the shared event upsert primitive.
//!
//! [`Ingestor::apply`] is the single path by which a provider event reaches
//! the store: webhooks, reconciliation and retry replay all go through it,
//! so the three can interleave freely and still produce one activity per
//! external id.

use std::sync::Arc;

use courier_core::types::{
    Activity, ActivityKind, ActivityStatus, Direction, EventType, ExternalEvent, MemberStatus,
    OptOutResult, RemoteActivity, RetryItemType,
};
use courier_core::{Clock, CourierError, ErrorClass, StorageAdapter};
use tracing::{debug, error, info, warn};

use crate::compliance::ComplianceGate;
use crate::identity::contact_key;
use crate::lock::KeyedLock;
use crate::payload::EventEnvelope;
use crate::retry::RetryScheduler;
use crate::signature::WebhookVerifier;

/// Result of ingesting one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First sight: stored and effects applied.
    Processed {
        external_id: String,
        activity_inserted: bool,
    },
    /// Already processed earlier; nothing was changed.
    Duplicate { external_id: String },
}

impl IngestOutcome {
    pub fn external_id(&self) -> &str {
        match self {
            Self::Processed { external_id, .. } | Self::Duplicate { external_id } => external_id,
        }
    }
}

/// How a feed record related to what was already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The activity was missing and has been backfilled.
    Inserted,
    /// The activity existed; its event or status was brought up to date.
    Updated,
    /// Nothing to do.
    Unchanged,
}

/// Verifies, deduplicates and applies provider events.
pub struct Ingestor {
    store: Arc<dyn StorageAdapter>,
    compliance: Arc<ComplianceGate>,
    clock: Arc<dyn Clock>,
    retries: RetryScheduler,
    verifier: Option<WebhookVerifier>,
    locks: KeyedLock,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn StorageAdapter>,
        compliance: Arc<ComplianceGate>,
        clock: Arc<dyn Clock>,
        retries: RetryScheduler,
        verifier: Option<WebhookVerifier>,
    ) -> Self {
        Self {
            store,
            compliance,
            clock,
            retries,
            verifier,
            locks: KeyedLock::new(),
        }
    }

    /// Handles one webhook delivery.
    ///
    /// Validation failures are returned as-is. Any other failure opens an
    /// `ingest_event` retry entry carrying the raw payload and is reported
    /// as [`CourierError::Transient`].
    pub async fn ingest(
        &self,
        raw_payload: &str,
        signature_header: &str,
        timestamp_header: &str,
    ) -> Result<IngestOutcome, CourierError> {
        let Some(verifier) = &self.verifier else {
            courier_prometheus::record_webhook("rejected");
            return Err(CourierError::Config(
                "webhook.secret is not configured; refusing unsigned webhooks".into(),
            ));
        };
        if let Err(e) = verifier.verify(
            raw_payload.as_bytes(),
            signature_header,
            timestamp_header,
            self.clock.now(),
        ) {
            courier_prometheus::record_webhook("rejected");
            warn!(error = %e, "webhook rejected");
            return Err(e);
        }

        let envelope = match EventEnvelope::parse(raw_payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                courier_prometheus::record_webhook("rejected");
                warn!(error = %e, "malformed webhook payload");
                return Err(e);
            }
        };

        match self.apply(&envelope, raw_payload).await {
            Ok(outcome) => {
                let label = match outcome {
                    IngestOutcome::Processed { .. } => "processed",
                    IngestOutcome::Duplicate { .. } => "duplicate",
                };
                courier_prometheus::record_webhook(label);
                Ok(outcome)
            }
            Err(e) if e.class() == ErrorClass::Validation => {
                courier_prometheus::record_webhook("rejected");
                Err(e)
            }
            Err(e) => {
                courier_prometheus::record_webhook("queued");
                let external_id = envelope.external_id();
                self.queue_for_retry(&external_id, raw_payload, &e).await;
                Err(CourierError::Transient(format!(
                    "ingestion of {external_id} deferred: {e}"
                )))
            }
        }
    }

    async fn queue_for_retry(&self, external_id: &str, raw_payload: &str, cause: &CourierError) {
        match self
            .retries
            .enqueue(
                RetryItemType::IngestEvent,
                external_id,
                Some(raw_payload.to_string()),
                None,
                &cause.to_string(),
            )
            .await
        {
            Ok(id) => warn!(external_id, retry_id = id, error = %cause, "ingestion failed, queued for retry"),
            Err(queue_err) => error!(
                external_id,
                error = %cause,
                queue_error = %queue_err,
                payload = raw_payload,
                "ingestion failed and retry entry could not be written; reconciliation will backfill"
            ),
        }
    }

    /// Re-applies a stored raw payload (retry queue path). No signature check.
    pub async fn replay(&self, raw_payload: &str) -> Result<IngestOutcome, CourierError> {
        let envelope = EventEnvelope::parse(raw_payload)
            .map_err(|e| CourierError::Permanent(e.to_string()))?;
        self.apply(&envelope, raw_payload).await
    }

    /// Stores one event and applies its effects, exactly once per external id.
    pub async fn apply(
        &self,
        envelope: &EventEnvelope,
        raw_payload: &str,
    ) -> Result<IngestOutcome, CourierError> {
        let external_id = envelope.external_id();
        let _guard = self.locks.lock(&external_id).await;

        if let Some(existing) = self.store.get_event(&external_id).await? {
            if existing.processed {
                debug!(external_id, "event already processed");
                return Ok(IngestOutcome::Duplicate { external_id });
            }
        }

        let now = self.clock.now();
        let event = ExternalEvent {
            external_id: external_id.clone(),
            event_type: envelope.event_type,
            raw_payload: raw_payload.to_string(),
            received_at: now,
            processed: false,
            error: None,
            processed_at: None,
        };
        let activity = envelope.data.to_activity(now);
        let recorded = self.store.record_event(&event, Some(&activity)).await?;

        if let Err(e) = self
            .apply_effects(envelope, &activity, recorded.activity_inserted)
            .await
        {
            if let Err(mark_err) = self.store.mark_event_failed(&external_id, &e.to_string()).await {
                warn!(external_id, error = %mark_err, "failed to record event error");
            }
            return Err(e);
        }

        self.store.mark_event_processed(&external_id, now).await?;
        debug!(
            external_id,
            event_type = %envelope.event_type,
            activity_inserted = recorded.activity_inserted,
            "event processed"
        );
        Ok(IngestOutcome::Processed {
            external_id,
            activity_inserted: recorded.activity_inserted,
        })
    }

    /// Backfills one feed record through [`Ingestor::apply`], then brings the
    /// status of an already-known activity forward.
    pub async fn apply_remote(
        &self,
        remote: RemoteActivity,
    ) -> Result<ReconcileOutcome, CourierError> {
        let envelope = EventEnvelope::from_remote(remote);
        let raw = envelope.to_json()?;
        match self.apply(&envelope, &raw).await? {
            IngestOutcome::Processed {
                activity_inserted: true,
                ..
            } => Ok(ReconcileOutcome::Inserted),
            IngestOutcome::Processed { .. } => Ok(ReconcileOutcome::Updated),
            IngestOutcome::Duplicate { external_id } => {
                let _guard = self.locks.lock(&external_id).await;
                if self.sync_status(&envelope.data).await? {
                    Ok(ReconcileOutcome::Updated)
                } else {
                    Ok(ReconcileOutcome::Unchanged)
                }
            }
        }
    }

    async fn apply_effects(
        &self,
        envelope: &EventEnvelope,
        activity: &Activity,
        activity_inserted: bool,
    ) -> Result<(), CourierError> {
        if !activity_inserted {
            self.sync_status(&envelope.data).await?;
        } else {
            self.sync_member(&envelope.data).await?;
        }

        let is_inbound_message = envelope.event_type == EventType::MessageReceived
            && activity.direction == Direction::Inbound
            && activity.kind == ActivityKind::Message;
        if is_inbound_message {
            let contact = contact_key(&activity.contact_identity);
            let body = activity.body.as_deref().unwrap_or_default();
            let result = self.compliance.process_inbound_text(&contact, body).await?;
            if result == OptOutResult::NoMatch {
                let responded = self.store.mark_members_responded(&contact).await?;
                if responded > 0 {
                    info!(%contact, members = responded, "campaign members responded");
                }
            }
        }
        Ok(())
    }

    /// Advances a stored activity's status and its campaign member. Returns
    /// whether anything changed.
    async fn sync_status(&self, remote: &RemoteActivity) -> Result<bool, CourierError> {
        let advanced = self
            .store
            .advance_activity_status(&remote.id, remote.status)
            .await?;
        if advanced {
            debug!(external_id = %remote.id, status = %remote.status, "activity status advanced");
        }
        let members = self.sync_member(remote).await?;
        Ok(advanced || members > 0)
    }

    /// Moves the member linked to an outbound message to its delivery outcome.
    async fn sync_member(&self, remote: &RemoteActivity) -> Result<u64, CourierError> {
        if remote.direction != Direction::Outbound {
            return Ok(0);
        }
        let to = match remote.status {
            ActivityStatus::Delivered => MemberStatus::Delivered,
            ActivityStatus::Failed | ActivityStatus::Undelivered => MemberStatus::Failed,
            _ => return Ok(0),
        };
        let changed = self
            .store
            .update_member_by_activity(&remote.id, &[MemberStatus::Sent], to)
            .await?;
        if changed > 0 {
            debug!(external_id = %remote.id, member_status = %to, "campaign member updated from status callback");
        }
        Ok(changed)
    }
}
