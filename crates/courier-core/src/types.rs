// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across adapter traits and engine components.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::hours::BusinessHours;

/// Health status reported by adapter health checks and the synthetic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Operational but experiencing issues.
    Degraded(String),
    /// Not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Storage,
    Alert,
    Observability,
}

/// Direction of a message or call relative to us.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// What kind of provider activity a record describes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Message,
    Call,
}

/// Provider-reported status of a message or call.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Queued,
    Sent,
    Received,
    Delivered,
    Undelivered,
    Failed,
    Completed,
    Missed,
}

impl ActivityStatus {
    /// Terminal statuses are first-writer: once stored they never change.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Queued | Self::Sent | Self::Received)
    }

    /// Whether a stored activity in `self` may be moved to `next`.
    ///
    /// Status only moves forward: queued, then sent/received, then a terminal outcome.
    pub fn can_advance_to(self, next: ActivityStatus) -> bool {
        fn rank(s: ActivityStatus) -> u8 {
            match s {
                ActivityStatus::Queued => 0,
                ActivityStatus::Sent | ActivityStatus::Received => 1,
                _ => 2,
            }
        }
        !self.is_terminal() && rank(next) > rank(self)
    }
}

/// Webhook event types emitted by the provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum EventType {
    #[strum(serialize = "message.received")]
    #[serde(rename = "message.received")]
    MessageReceived,
    #[strum(serialize = "message.sent")]
    #[serde(rename = "message.sent")]
    MessageSent,
    #[strum(serialize = "message.status")]
    #[serde(rename = "message.status")]
    MessageStatus,
    #[strum(serialize = "call.completed")]
    #[serde(rename = "call.completed")]
    CallCompleted,
}

impl EventType {
    /// The event type a freshly discovered activity corresponds to.
    pub fn for_activity(kind: ActivityKind, direction: Direction) -> Self {
        match (kind, direction) {
            (ActivityKind::Call, _) => Self::CallCompleted,
            (ActivityKind::Message, Direction::Inbound) => Self::MessageReceived,
            (ActivityKind::Message, Direction::Outbound) => Self::MessageSent,
        }
    }
}

/// An activity as reported by the provider, in webhooks and in the feed API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteActivity {
    /// Provider external id; the idempotency key for everything derived from it.
    pub id: String,
    /// Inbound or outbound, relative to our numbers.
    pub direction: Direction,
    /// Message or call.
    pub kind: ActivityKind,
    /// Sending party, as the provider formats it.
    pub from: String,
    /// Receiving party, as the provider formats it.
    pub to: String,
    /// Message text. Absent for calls and media-only messages.
    #[serde(default)]
    pub body: Option<String>,
    /// Attached media, in provider order.
    #[serde(default)]
    pub media_urls: Vec<String>,
    /// Latest status the provider reports.
    pub status: ActivityStatus,
    /// When the provider created the activity; orders the feed.
    pub created_at: DateTime<Utc>,
}

impl RemoteActivity {
    /// Convert into a stored activity. The contact is the party that is not us.
    pub fn to_activity(&self, recorded_at: DateTime<Utc>) -> Activity {
        let (contact, counterpart) = match self.direction {
            Direction::Inbound => (self.from.clone(), self.to.clone()),
            Direction::Outbound => (self.to.clone(), self.from.clone()),
        };
        Activity {
            external_id: self.id.clone(),
            direction: self.direction,
            kind: self.kind,
            contact_identity: contact,
            counterpart_identity: counterpart,
            body: self.body.clone(),
            media_urls: self.media_urls.clone(),
            status: self.status,
            created_at: self.created_at,
            recorded_at,
        }
    }
}

/// One page of the provider's activity feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityPage {
    /// Records on this page, oldest first.
    #[serde(default)]
    pub data: Vec<RemoteActivity>,
    /// Opaque cursor for the next page; `None` on the last one.
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// A webhook delivery or reconciled record, keyed by provider external id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalEvent {
    /// Provider external id of the activity the event carries.
    pub external_id: String,
    pub event_type: EventType,
    /// The body exactly as received, kept for replay.
    pub raw_payload: String,
    pub received_at: DateTime<Utc>,
    /// Whether every effect of the event has been applied.
    pub processed: bool,
    /// Last processing error, while unprocessed.
    pub error: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// A stored inbound/outbound message or call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    /// Provider external id; unique across the store.
    pub external_id: String,
    pub direction: Direction,
    pub kind: ActivityKind,
    /// The other party: sender of inbound, recipient of outbound.
    pub contact_identity: String,
    /// Our number on the activity.
    pub counterpart_identity: String,
    pub body: Option<String>,
    pub media_urls: Vec<String>,
    /// Only moves forward; terminal statuses never change.
    pub status: ActivityStatus,
    /// Provider creation time.
    pub created_at: DateTime<Utc>,
    /// When this process first stored it.
    pub recorded_at: DateTime<Utc>,
}

/// Result of the atomic event + activity upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordOutcome {
    /// The event row was new.
    pub event_inserted: bool,
    /// The activity row was new.
    pub activity_inserted: bool,
}

/// Opt-out flag for one contact. Opting back in expires the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactComplianceFlag {
    /// Normalized contact the flag applies to.
    pub contact_identity: String,
    /// Cleared when the flag is expired by an opt-in.
    pub opted_out: bool,
    pub opted_out_at: DateTime<Utc>,
    /// `keyword:<word>` for keyword opt-outs, free text for admin ones.
    pub reason: String,
    /// Set when the contact opted back in; `None` while active.
    pub expired_at: Option<DateTime<Utc>>,
}

/// Which way a compliance keyword points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum KeywordIntent {
    OptOut,
    OptIn,
}

/// Outcome of running an inbound text through the compliance gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptOutResult {
    /// No keyword with clear intent was found.
    NoMatch,
    /// The contact transitioned to opted out.
    OptedOut,
    /// The contact transitioned back to opted in.
    OptedIn,
    /// A keyword matched but the contact was already in that state.
    Unchanged(KeywordIntent),
}

/// Campaign lifecycle states.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// Accepting members; nothing is sent.
    Draft,
    /// Dispatched on every tick.
    Active,
    /// Pointer kept; resumes where it stopped.
    Paused,
    /// Every member settled. Terminal.
    Completed,
}

/// A trickle campaign with its durable resume position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Campaign {
    pub id: String,
    /// Operator-facing label.
    pub name: String,
    /// Message text sent to every member.
    pub body: String,
    pub status: CampaignStatus,
    /// Sends allowed per local calendar day.
    pub daily_cap: u32,
    /// Per-campaign override of `dispatch.batch_size`.
    pub batch_size: Option<u32>,
    /// Sending window; also defines the day `daily_cap` counts over.
    pub business_hours: BusinessHours,
    /// Sequence of the last settled member; 0 before the first send.
    pub last_dispatch_pointer: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-recipient campaign states.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    Responded,
    SkippedCompliance,
    SkippedInvalid,
}

impl MemberStatus {
    /// Statuses that count as a completed send for caps and duplicate checks.
    pub const SENT_LIKE: [MemberStatus; 3] = [Self::Sent, Self::Delivered, Self::Responded];
}

/// One recipient of a campaign at a fixed cursor position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignMember {
    pub campaign_id: String,
    /// 1-based cursor position.
    pub sequence: i64,
    /// Normalized contact; unique within the campaign.
    pub contact_identity: String,
    pub status: MemberStatus,
    /// External id of the outbound activity, once sent.
    pub sent_activity_ref: Option<String>,
    /// When the send was accepted; counted against the daily cap.
    pub sent_at: Option<DateTime<Utc>>,
    /// Failed send attempts so far.
    pub attempt_count: u32,
    pub last_error: Option<String>,
}

/// Final state for one member, applied together with the pointer advance.
#[derive(Debug, Clone)]
pub struct MemberSettlement {
    pub campaign_id: String,
    /// Member to settle; the pointer must sit at `sequence - 1`.
    pub sequence: i64,
    /// Status written while the member is still pending.
    pub status: MemberStatus,
    /// Outbound activity recorded in the same transaction, for `Sent`.
    pub sent_activity: Option<Activity>,
    /// Failure recorded on the member, for `Failed`.
    pub error: Option<String>,
    pub settled_at: DateTime<Utc>,
}

/// Kinds of work the error recovery queue can replay.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RetryItemType {
    IngestEvent,
    CampaignSend,
    ConfirmationSend,
}

/// Retry entry lifecycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    /// Waiting for its next attempt.
    Pending,
    /// Attempts exhausted or failed permanently; kept for operators.
    DeadLetter,
}

/// A recoverable failure awaiting retry, or a dead-lettered one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryEntry {
    pub id: i64,
    /// Selects the handler that replays the entry.
    pub item_type: RetryItemType,
    /// Identifies the work item; at most one pending entry per type and ref.
    pub item_ref: String,
    /// Whatever the handler needs to replay the work, as JSON or raw text.
    pub payload: Option<String>,
    /// Failed attempts so far.
    pub attempt_count: u32,
    /// Attempts before the entry is dead-lettered.
    pub max_attempts: u32,
    /// Earliest time the entry may be claimed.
    pub next_eligible_at: DateTime<Utc>,
    pub last_error: Option<String>,
    /// Set while a worker holds the entry; other workers skip it until then.
    pub claimed_until: Option<DateTime<Utc>>,
    pub status: RetryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for opening a retry entry.
#[derive(Debug, Clone)]
pub struct NewRetryEntry {
    pub item_type: RetryItemType,
    /// Work item key; an open entry with the same key is refreshed instead.
    pub item_ref: String,
    pub payload: Option<String>,
    pub max_attempts: u32,
    /// When the first retry may run.
    pub next_eligible_at: DateTime<Utc>,
    /// The failure that opened the entry.
    pub last_error: String,
    pub created_at: DateTime<Utc>,
}

/// An outbound message handed to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Our sending number.
    pub from: String,
    /// Recipient number.
    pub to: String,
    pub body: String,
    /// Media to attach, if any.
    #[serde(default)]
    pub media_urls: Vec<String>,
}

/// What the provider returns for an accepted send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Provider id of the new outbound activity.
    #[serde(rename = "id")]
    pub external_id: String,
    /// Status at acceptance, usually `queued`.
    pub status: ActivityStatus,
    pub created_at: DateTime<Utc>,
}

/// One synthetic check result, kept for trend analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheckRecord {
    /// Id of the check message, when the send was accepted.
    pub outbound_external_id: Option<String>,
    /// The check's inbound webhook arrived in time.
    pub passed: bool,
    /// Send to inbound storage, for passing checks.
    pub latency_ms: Option<i64>,
    /// Human-readable outcome.
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

/// Counts per status category for the host dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// Campaigns per status.
    pub campaigns: BTreeMap<String, i64>,
    /// Members per status, across all campaigns.
    pub members: BTreeMap<String, i64>,
    /// Retry entries still pending.
    pub retry_pending: i64,
    pub dead_letters: i64,
    /// Events stored but not yet fully applied.
    pub unprocessed_events: i64,
    /// Contacts with an active opt-out.
    pub opted_out_contacts: i64,
    pub failed_health_checks: i64,
}

/// Categories of operator alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HealthCheckFailed,
    ReconciliationFailed,
    DeadLetter,
}

/// A notification sent through the alerting channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    /// One-line summary, used as the email subject.
    pub subject: String,
    /// Full context for the operator.
    pub detail: String,
    pub raised_at: DateTime<Utc>,
}
