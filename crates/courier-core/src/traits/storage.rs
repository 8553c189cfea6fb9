// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the durable store all components coordinate through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CourierError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Activity, ActivityStatus, Campaign, CampaignMember, CampaignStatus, ContactComplianceFlag,
    ExternalEvent, HealthCheckRecord, MemberSettlement, MemberStatus, NewRetryEntry,
    RecordOutcome, RetryEntry, RetryItemType, StatusCounts,
};

/// Adapter for the shared store.
///
/// The store is the only shared mutable resource: pointers, flags, retry
/// claims, leases and checkpoints all live here so any worker can resume any
/// task after a crash. Every compare-and-set style method returns `bool`
/// reporting whether this caller won.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Opens the backend and applies migrations.
    async fn initialize(&self) -> Result<(), CourierError>;

    /// Flushes pending writes and releases connections.
    async fn close(&self) -> Result<(), CourierError>;

    // --- Events and activities ---

    async fn get_event(&self, external_id: &str) -> Result<Option<ExternalEvent>, CourierError>;

    /// Inserts the event and (optionally) its activity in one transaction.
    /// Both inserts are insert-if-absent; existing rows are never overwritten.
    async fn record_event(
        &self,
        event: &ExternalEvent,
        activity: Option<&Activity>,
    ) -> Result<RecordOutcome, CourierError>;

    async fn mark_event_processed(
        &self,
        external_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError>;

    async fn mark_event_failed(&self, external_id: &str, error: &str) -> Result<(), CourierError>;

    /// Moves processed events received before `before` into the archive table.
    async fn archive_events(
        &self,
        before: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<u64, CourierError>;

    async fn get_activity(&self, external_id: &str) -> Result<Option<Activity>, CourierError>;

    async fn activity_count(&self) -> Result<i64, CourierError>;

    /// Changes an activity's status only while its current status is non-terminal.
    async fn advance_activity_status(
        &self,
        external_id: &str,
        status: ActivityStatus,
    ) -> Result<bool, CourierError>;

    /// Finds an inbound message from `contact` with exactly `body` created at or after `since`.
    async fn find_inbound_activity(
        &self,
        contact: &str,
        body: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<Activity>, CourierError>;

    // --- Compliance ---

    async fn get_active_opt_out(
        &self,
        contact: &str,
    ) -> Result<Option<ContactComplianceFlag>, CourierError>;

    /// Inserts an active opt-out unless one already exists.
    ///
    /// When the flag is inserted, `follow_up` is opened as a retry entry in
    /// the same transaction.
    async fn insert_opt_out(
        &self,
        contact: &str,
        reason: &str,
        at: DateTime<Utc>,
        follow_up: Option<&NewRetryEntry>,
    ) -> Result<bool, CourierError>;

    /// Expires the active opt-out, if any, opening `follow_up` in the same
    /// transaction when it does.
    async fn expire_opt_out(
        &self,
        contact: &str,
        at: DateTime<Utc>,
        follow_up: Option<&NewRetryEntry>,
    ) -> Result<bool, CourierError>;

    /// Marks `pending` members of every `active` campaign for `contact` as
    /// `skipped_compliance`.
    async fn skip_pending_members_for_contact(&self, contact: &str) -> Result<u64, CourierError>;

    // --- Campaigns ---

    async fn insert_campaign(&self, campaign: &Campaign) -> Result<(), CourierError>;

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>, CourierError>;

    async fn list_campaigns(
        &self,
        status: Option<CampaignStatus>,
    ) -> Result<Vec<Campaign>, CourierError>;

    /// Compare-and-set on the campaign status.
    async fn transition_campaign(
        &self,
        id: &str,
        from: CampaignStatus,
        to: CampaignStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, CourierError>;

    /// Appends members after the current last sequence. Contacts already in
    /// the campaign are ignored. Returns the number appended.
    async fn append_members(
        &self,
        campaign_id: &str,
        contacts: &[String],
    ) -> Result<u64, CourierError>;

    /// Highest assigned sequence (0 for an empty campaign).
    async fn last_sequence(&self, campaign_id: &str) -> Result<i64, CourierError>;

    async fn get_member(
        &self,
        campaign_id: &str,
        sequence: i64,
    ) -> Result<Option<CampaignMember>, CourierError>;

    /// Members with `sequence > after`, in sequence order.
    async fn members_after(
        &self,
        campaign_id: &str,
        after: i64,
        limit: u32,
    ) -> Result<Vec<CampaignMember>, CourierError>;

    async fn list_members(&self, campaign_id: &str) -> Result<Vec<CampaignMember>, CourierError>;

    /// Settles one member and advances the pointer to its sequence, atomically.
    ///
    /// Succeeds only when the pointer is exactly `sequence - 1`. The member
    /// status is only rewritten while it is still `pending`.
    async fn settle_member(&self, settlement: &MemberSettlement) -> Result<bool, CourierError>;

    /// Records a failed send attempt; returns the new attempt count.
    async fn record_member_attempt(
        &self,
        campaign_id: &str,
        sequence: i64,
        error: &str,
    ) -> Result<u32, CourierError>;

    /// Members sent at or after `since`, for one campaign or all of them.
    async fn sent_count_since(
        &self,
        campaign_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<i64, CourierError>;

    /// Moves the member linked to `activity_ref` from one of `from` to `to`.
    async fn update_member_by_activity(
        &self,
        activity_ref: &str,
        from: &[MemberStatus],
        to: MemberStatus,
    ) -> Result<u64, CourierError>;

    /// Marks sent/delivered members of non-completed campaigns for `contact` as responded.
    async fn mark_members_responded(&self, contact: &str) -> Result<u64, CourierError>;

    // --- Retry queue ---

    /// Opens a retry entry, or refreshes `last_error` on the existing open one.
    async fn upsert_retry(&self, entry: &NewRetryEntry) -> Result<i64, CourierError>;

    async fn find_open_retry(
        &self,
        item_type: RetryItemType,
        item_ref: &str,
    ) -> Result<Option<RetryEntry>, CourierError>;

    /// The most recent dead-lettered entry for the item, if any.
    async fn find_dead_letter(
        &self,
        item_type: RetryItemType,
        item_ref: &str,
    ) -> Result<Option<RetryEntry>, CourierError>;

    /// Atomically claims up to `limit` due, unclaimed pending entries until `claim_until`.
    async fn claim_due_retries(
        &self,
        now: DateTime<Utc>,
        claim_until: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<RetryEntry>, CourierError>;

    async fn reschedule_retry(
        &self,
        id: i64,
        attempt_count: u32,
        next_eligible_at: DateTime<Utc>,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError>;

    async fn dead_letter_retry(
        &self,
        id: i64,
        attempt_count: u32,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError>;

    async fn delete_retry(&self, id: i64) -> Result<(), CourierError>;

    async fn list_dead_letters(&self, limit: u32) -> Result<Vec<RetryEntry>, CourierError>;

    // --- Leases ---

    /// Acquires (or re-acquires an expired) named lease.
    async fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, CourierError>;

    async fn release_lease(&self, name: &str, holder: &str) -> Result<(), CourierError>;

    // --- Checkpoints ---

    async fn get_checkpoint(&self, name: &str) -> Result<Option<DateTime<Utc>>, CourierError>;

    async fn set_checkpoint(
        &self,
        name: &str,
        value: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError>;

    // --- Health checks and dashboard ---

    async fn insert_health_check(&self, record: &HealthCheckRecord) -> Result<i64, CourierError>;

    async fn recent_health_checks(&self, limit: u32)
    -> Result<Vec<HealthCheckRecord>, CourierError>;

    async fn status_counts(&self) -> Result<StatusCounts, CourierError>;
}
