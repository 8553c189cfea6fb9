// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pointer-based, resumable trickle campaign sender.
//!
//! Each campaign keeps one durable cursor, `last_dispatch_pointer`: the
//! sequence of the last settled member. A member is settled together with
//! the pointer advance in a single compare-and-set on `pointer = sequence - 1`,
//! so a crash, a pause or a competing worker can never skip a member or send
//! it twice. Writers of one campaign are serialized by the store lease
//! `campaign:{id}`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_config::model::DispatchConfig;
use courier_core::types::{
    Activity, ActivityKind, Campaign, CampaignMember, CampaignStatus, Direction, MemberSettlement,
    MemberStatus, OutboundMessage, RetryItemType,
};
use courier_core::{BusinessHours, Clock, CourierError, MessagingProvider, StorageAdapter};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::compliance::ComplianceGate;
use crate::identity::{contact_key, normalize_identity};
use crate::retry::{add_std, member_ref, HandlerOutcome, RetryScheduler};
use crate::send::send_with_timeout;

/// Members read from the store per query.
const MEMBER_PAGE: u32 = 100;

/// Store lease name serializing writers of one campaign.
pub fn campaign_lease(campaign_id: &str) -> String {
    format!("campaign:{campaign_id}")
}

/// Input for [`CampaignDispatchEngine::create_campaign`].
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub name: String,
    pub body: String,
    pub daily_cap: u32,
    pub batch_size: Option<u32>,
    /// Falls back to `dispatch.default_business_hours`.
    pub business_hours: Option<BusinessHours>,
}

/// What happened to one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { external_id: String },
    SkippedCompliance,
    SkippedInvalid,
    /// The provider rejected the message for good.
    Failed { error: String },
    /// Transient failure: the member stays pending and the pointer stays put.
    Deferred { error: String },
    /// The member was already settled; only the pointer moved.
    Advanced,
    /// Another writer moved the pointer first.
    Superseded,
}

/// Counters for one dispatch tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub campaigns: u32,
    pub sent: u32,
    pub skipped_compliance: u32,
    pub skipped_invalid: u32,
    pub failed: u32,
    pub deferred: u32,
    pub capped: u32,
    pub outside_hours: u32,
    pub locked: u32,
    pub completed: u32,
    pub errors: u32,
}

/// Owns the campaign state machine and the per-tick send loop.
pub struct CampaignDispatchEngine {
    store: Arc<dyn StorageAdapter>,
    provider: Arc<dyn MessagingProvider>,
    compliance: Arc<ComplianceGate>,
    clock: Arc<dyn Clock>,
    retries: RetryScheduler,
    config: DispatchConfig,
    from_number: Option<String>,
    holder: String,
    lease_ttl: Duration,
}

impl CampaignDispatchEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn StorageAdapter>,
        provider: Arc<dyn MessagingProvider>,
        compliance: Arc<ComplianceGate>,
        clock: Arc<dyn Clock>,
        retries: RetryScheduler,
        config: DispatchConfig,
        from_number: Option<String>,
        holder: String,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            compliance,
            clock,
            retries,
            config,
            from_number,
            holder,
            lease_ttl,
        }
    }

    fn from_number(&self) -> Result<&str, CourierError> {
        self.from_number
            .as_deref()
            .ok_or_else(|| CourierError::Config("provider.from_number is required to send campaigns".into()))
    }

    fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.config.send_timeout_secs)
    }

    // --- State machine ---

    /// Creates a campaign in `draft`.
    pub async fn create_campaign(&self, new: NewCampaign) -> Result<Campaign, CourierError> {
        if new.name.trim().is_empty() {
            return Err(CourierError::InvalidInput("campaign name must not be empty".into()));
        }
        if new.body.trim().is_empty() {
            return Err(CourierError::InvalidInput("campaign body must not be empty".into()));
        }
        if new.daily_cap == 0 {
            return Err(CourierError::InvalidInput("daily_cap must be at least 1".into()));
        }
        if new.batch_size == Some(0) {
            return Err(CourierError::InvalidInput("batch_size must be at least 1".into()));
        }
        let business_hours = new
            .business_hours
            .unwrap_or_else(|| self.config.default_business_hours.clone());
        business_hours
            .tz()
            .map_err(|e| CourierError::InvalidInput(e.to_string()))?;

        let now = self.clock.now();
        let campaign = Campaign {
            id: uuid::Uuid::new_v4().to_string(),
            name: new.name,
            body: new.body,
            status: CampaignStatus::Draft,
            daily_cap: new.daily_cap,
            batch_size: new.batch_size,
            business_hours,
            last_dispatch_pointer: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_campaign(&campaign).await?;
        info!(campaign_id = %campaign.id, name = %campaign.name, daily_cap = campaign.daily_cap, "campaign created");
        Ok(campaign)
    }

    /// Appends recipients in order. Contacts are normalized to E.164 where
    /// possible; duplicates of existing members are ignored. Returns the
    /// number appended.
    pub async fn add_members(&self, campaign_id: &str, contacts: &[String]) -> Result<u64, CourierError> {
        let campaign = self.require_campaign(campaign_id).await?;
        if campaign.status == CampaignStatus::Completed {
            return Err(CourierError::InvalidTransition {
                campaign_id: campaign_id.to_string(),
                from: campaign.status.to_string(),
                to: "add_members".into(),
            });
        }
        let identities: Vec<String> = contacts
            .iter()
            .map(|c| contact_key(c))
            .filter(|c| !c.is_empty())
            .collect();
        let appended = self.store.append_members(campaign_id, &identities).await?;
        info!(campaign_id, requested = contacts.len(), appended, "campaign members added");
        Ok(appended)
    }

    pub async fn activate(&self, campaign_id: &str) -> Result<Campaign, CourierError> {
        self.transition(campaign_id, CampaignStatus::Draft, CampaignStatus::Active)
            .await
    }

    /// Stops sending. The pointer is kept as is.
    pub async fn pause(&self, campaign_id: &str) -> Result<Campaign, CourierError> {
        self.transition(campaign_id, CampaignStatus::Active, CampaignStatus::Paused)
            .await
    }

    /// Continues from the stored pointer.
    pub async fn resume(&self, campaign_id: &str) -> Result<Campaign, CourierError> {
        self.transition(campaign_id, CampaignStatus::Paused, CampaignStatus::Active)
            .await
    }

    async fn transition(
        &self,
        campaign_id: &str,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<Campaign, CourierError> {
        let now = self.clock.now();
        if self
            .store
            .transition_campaign(campaign_id, from, to, now)
            .await?
        {
            info!(campaign_id, %from, %to, "campaign transitioned");
            return self.require_campaign(campaign_id).await;
        }
        let current = self.require_campaign(campaign_id).await?;
        Err(CourierError::InvalidTransition {
            campaign_id: campaign_id.to_string(),
            from: current.status.to_string(),
            to: to.to_string(),
        })
    }

    async fn require_campaign(&self, campaign_id: &str) -> Result<Campaign, CourierError> {
        self.store
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| CourierError::NotFound {
                entity: "campaign",
                id: campaign_id.to_string(),
            })
    }

    // --- Tick ---

    /// Runs one dispatch pass over every active campaign.
    pub async fn tick(&self) -> Result<DispatchStats, CourierError> {
        let from = self.from_number()?.to_string();
        let campaigns = self
            .store
            .list_campaigns(Some(CampaignStatus::Active))
            .await?;
        let mut global_left = self.global_remaining(self.clock.now()).await?;
        let mut stats = DispatchStats::default();

        for campaign in campaigns {
            stats.campaigns += 1;
            if let Err(e) = self
                .dispatch_campaign(&campaign.id, &from, &mut global_left, &mut stats)
                .await
            {
                stats.errors += 1;
                warn!(campaign_id = %campaign.id, error = %e, "campaign dispatch failed");
            }
        }

        if stats.sent > 0 || stats.errors > 0 || stats.completed > 0 {
            info!(
                campaigns = stats.campaigns,
                sent = stats.sent,
                skipped_compliance = stats.skipped_compliance,
                skipped_invalid = stats.skipped_invalid,
                failed = stats.failed,
                deferred = stats.deferred,
                completed = stats.completed,
                errors = stats.errors,
                "dispatch tick finished"
            );
        }
        Ok(stats)
    }

    async fn dispatch_campaign(
        &self,
        campaign_id: &str,
        from: &str,
        global_left: &mut Option<u32>,
        stats: &mut DispatchStats,
    ) -> Result<(), CourierError> {
        let lease = campaign_lease(campaign_id);
        if !self.acquire(&lease).await? {
            stats.locked += 1;
            debug!(campaign_id, "campaign lease held elsewhere, skipping");
            return Ok(());
        }
        let result = self
            .dispatch_locked(campaign_id, from, global_left, stats)
            .await;
        self.release(&lease).await;
        result
    }

    async fn dispatch_locked(
        &self,
        campaign_id: &str,
        from: &str,
        global_left: &mut Option<u32>,
        stats: &mut DispatchStats,
    ) -> Result<(), CourierError> {
        let Some(campaign) = self.store.get_campaign(campaign_id).await? else {
            return Ok(());
        };
        if campaign.status != CampaignStatus::Active {
            return Ok(());
        }

        let now = self.clock.now();
        if !campaign.business_hours.is_open(now)? {
            stats.outside_hours += 1;
            debug!(campaign_id, "outside business hours");
            return Ok(());
        }

        let batch = campaign.batch_size.unwrap_or(self.config.batch_size);
        let cap_left = self.cap_remaining(&campaign, now).await?;
        let budget = batch
            .min(cap_left)
            .min(global_left.unwrap_or(u32::MAX));
        if budget == 0 {
            stats.capped += 1;
            debug!(campaign_id, cap_left, "daily cap reached");
            return Ok(());
        }

        let mut pointer = campaign.last_dispatch_pointer;
        let mut sends = 0u32;
        let mut head = true;

        'members: loop {
            let members = self
                .store
                .members_after(campaign_id, pointer, MEMBER_PAGE)
                .await?;
            if members.is_empty() {
                break;
            }
            for member in members {
                if sends >= budget {
                    break 'members;
                }
                if head {
                    head = false;
                    if member.status == MemberStatus::Pending {
                        let key = member_ref(campaign_id, member.sequence);
                        if self
                            .store
                            .find_open_retry(RetryItemType::CampaignSend, &key)
                            .await?
                            .is_some()
                        {
                            stats.deferred += 1;
                            debug!(campaign_id, sequence = member.sequence, "head member awaiting retry");
                            return Ok(());
                        }
                        // Retries ran out but the failure was never recorded on the member.
                        if let Some(dead) = self
                            .store
                            .find_dead_letter(RetryItemType::CampaignSend, &key)
                            .await?
                        {
                            let error = dead
                                .last_error
                                .unwrap_or_else(|| "send retries exhausted".to_string());
                            match self.fail_locked(&campaign, &member, &error).await? {
                                SendOutcome::Superseded => return Ok(()),
                                _ => stats.failed += 1,
                            }
                            pointer = member.sequence;
                            continue;
                        }
                    }
                } else if !self.still_active(campaign_id).await? {
                    debug!(campaign_id, "campaign left active state mid-tick");
                    return Ok(());
                }

                match self.process_member(&campaign, &member, from).await? {
                    SendOutcome::Sent { .. } => {
                        sends += 1;
                        stats.sent += 1;
                        if let Some(left) = global_left.as_mut() {
                            *left = left.saturating_sub(1);
                        }
                    }
                    SendOutcome::SkippedCompliance => stats.skipped_compliance += 1,
                    SendOutcome::SkippedInvalid => stats.skipped_invalid += 1,
                    SendOutcome::Failed { .. } => stats.failed += 1,
                    SendOutcome::Advanced => {}
                    SendOutcome::Deferred { error } => {
                        self.retries
                            .enqueue(
                                RetryItemType::CampaignSend,
                                &member_ref(campaign_id, member.sequence),
                                None,
                                Some(self.config.max_send_attempts),
                                &error,
                            )
                            .await?;
                        stats.deferred += 1;
                        return Ok(());
                    }
                    SendOutcome::Superseded => {
                        warn!(campaign_id, sequence = member.sequence, "pointer moved by another writer");
                        return Ok(());
                    }
                }
                pointer = member.sequence;
            }
        }

        if pointer >= self.store.last_sequence(campaign_id).await?
            && self
                .store
                .transition_campaign(
                    campaign_id,
                    CampaignStatus::Active,
                    CampaignStatus::Completed,
                    self.clock.now(),
                )
                .await?
        {
            stats.completed += 1;
            info!(campaign_id, pointer, "campaign completed");
        }
        Ok(())
    }

    async fn still_active(&self, campaign_id: &str) -> Result<bool, CourierError> {
        Ok(self
            .store
            .get_campaign(campaign_id)
            .await?
            .is_some_and(|c| c.status == CampaignStatus::Active))
    }

    /// Sends remaining under the campaign cap for the local day of `now`.
    async fn cap_remaining(&self, campaign: &Campaign, now: DateTime<Utc>) -> Result<u32, CourierError> {
        let day_start = campaign.business_hours.day_start(now)?;
        let sent_today = self
            .store
            .sent_count_since(Some(&campaign.id), day_start)
            .await?;
        Ok(remaining(campaign.daily_cap, sent_today))
    }

    /// Sends remaining under the optional provider-wide cap for the UTC day.
    async fn global_remaining(&self, now: DateTime<Utc>) -> Result<Option<u32>, CourierError> {
        let Some(cap) = self.config.global_daily_cap else {
            return Ok(None);
        };
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now);
        let sent = self.store.sent_count_since(None, midnight).await?;
        Ok(Some(remaining(cap, sent)))
    }

    /// Settles one member at the head of the cursor, sending if it is due.
    ///
    /// The caller holds the campaign lease and has checked that `member`
    /// immediately follows the pointer.
    async fn process_member(
        &self,
        campaign: &Campaign,
        member: &CampaignMember,
        from: &str,
    ) -> Result<SendOutcome, CourierError> {
        if member.status != MemberStatus::Pending {
            // Skipped eagerly by the compliance gate, or settled by a crashed writer.
            return self
                .settle(campaign, member, member.status, None, None, SendOutcome::Advanced)
                .await;
        }

        let Some(contact) = normalize_identity(&member.contact_identity) else {
            return self
                .settle(
                    campaign,
                    member,
                    MemberStatus::SkippedInvalid,
                    None,
                    Some(format!("`{}` is not a valid E.164 number", member.contact_identity)),
                    SendOutcome::SkippedInvalid,
                )
                .await;
        };

        if self.compliance.check_opt_out(&contact).await? {
            return self
                .settle(
                    campaign,
                    member,
                    MemberStatus::SkippedCompliance,
                    None,
                    None,
                    SendOutcome::SkippedCompliance,
                )
                .await;
        }

        let message = OutboundMessage {
            from: from.to_string(),
            to: contact.clone(),
            body: campaign.body.clone(),
            media_urls: vec![],
        };
        match send_with_timeout(self.provider.as_ref(), &message, self.send_timeout()).await {
            Ok(receipt) => {
                courier_prometheus::record_send("campaign", "sent");
                let activity = Activity {
                    external_id: receipt.external_id.clone(),
                    direction: Direction::Outbound,
                    kind: ActivityKind::Message,
                    contact_identity: contact,
                    counterpart_identity: from.to_string(),
                    body: Some(campaign.body.clone()),
                    media_urls: vec![],
                    status: receipt.status,
                    created_at: receipt.created_at,
                    recorded_at: self.clock.now(),
                };
                let outcome = self
                    .settle(
                        campaign,
                        member,
                        MemberStatus::Sent,
                        Some(activity),
                        None,
                        SendOutcome::Sent {
                            external_id: receipt.external_id.clone(),
                        },
                    )
                    .await?;
                if outcome == SendOutcome::Superseded {
                    error!(
                        campaign_id = %campaign.id,
                        sequence = member.sequence,
                        external_id = %receipt.external_id,
                        "message sent but member was settled by another writer"
                    );
                } else {
                    debug!(campaign_id = %campaign.id, sequence = member.sequence, external_id = %receipt.external_id, "member sent");
                }
                Ok(outcome)
            }
            Err(e) if e.is_transient() => {
                courier_prometheus::record_send("campaign", "deferred");
                let error = e.to_string();
                let attempts = self
                    .store
                    .record_member_attempt(&campaign.id, member.sequence, &error)
                    .await?;
                warn!(campaign_id = %campaign.id, sequence = member.sequence, attempts, error = %error, "send failed transiently");
                Ok(SendOutcome::Deferred { error })
            }
            Err(e) => {
                courier_prometheus::record_send("campaign", "failed");
                let error = e.to_string();
                warn!(campaign_id = %campaign.id, sequence = member.sequence, error = %error, "send rejected");
                self.settle(
                    campaign,
                    member,
                    MemberStatus::Failed,
                    None,
                    Some(error.clone()),
                    SendOutcome::Failed { error },
                )
                .await
            }
        }
    }

    async fn settle(
        &self,
        campaign: &Campaign,
        member: &CampaignMember,
        status: MemberStatus,
        sent_activity: Option<Activity>,
        error: Option<String>,
        on_success: SendOutcome,
    ) -> Result<SendOutcome, CourierError> {
        let settlement = MemberSettlement {
            campaign_id: campaign.id.clone(),
            sequence: member.sequence,
            status,
            sent_activity,
            error,
            settled_at: self.clock.now(),
        };
        if self.store.settle_member(&settlement).await? {
            Ok(on_success)
        } else {
            Ok(SendOutcome::Superseded)
        }
    }

    // --- Retry queue entry points ---

    /// Re-sends the member behind a `campaign_send` retry entry.
    ///
    /// Returns `Deferred` while the campaign is locked, paused, outside its
    /// window or capped. A transient send failure is returned as an error so
    /// the queue counts the attempt.
    pub async fn retry_member(
        &self,
        campaign_id: &str,
        sequence: i64,
    ) -> Result<HandlerOutcome, CourierError> {
        let from = self.from_number()?.to_string();
        let lease = campaign_lease(campaign_id);
        if !self.acquire(&lease).await? {
            return Ok(HandlerOutcome::Deferred);
        }
        let result = self.retry_member_locked(campaign_id, sequence, &from).await;
        self.release(&lease).await;
        result
    }

    async fn retry_member_locked(
        &self,
        campaign_id: &str,
        sequence: i64,
        from: &str,
    ) -> Result<HandlerOutcome, CourierError> {
        let Some(campaign) = self.store.get_campaign(campaign_id).await? else {
            return Ok(HandlerOutcome::Done);
        };
        match campaign.status {
            CampaignStatus::Completed => return Ok(HandlerOutcome::Done),
            CampaignStatus::Draft | CampaignStatus::Paused => return Ok(HandlerOutcome::Deferred),
            CampaignStatus::Active => {}
        }
        if campaign.last_dispatch_pointer != sequence - 1 {
            return Ok(HandlerOutcome::Done);
        }
        let Some(member) = self.store.get_member(campaign_id, sequence).await? else {
            return Ok(HandlerOutcome::Done);
        };

        let now = self.clock.now();
        if !campaign.business_hours.is_open(now)? || self.cap_remaining(&campaign, now).await? == 0 {
            return Ok(HandlerOutcome::Deferred);
        }
        if self.global_remaining(now).await? == Some(0) {
            return Ok(HandlerOutcome::Deferred);
        }

        match self.process_member(&campaign, &member, from).await? {
            SendOutcome::Deferred { error } => Err(CourierError::Transient(error)),
            outcome => {
                debug!(campaign_id, sequence, ?outcome, "campaign retry settled");
                Ok(HandlerOutcome::Done)
            }
        }
    }

    /// Marks a member whose retries are exhausted as failed and moves the
    /// pointer past it.
    ///
    /// When the campaign is locked the member is left pending; the next tick
    /// finds its dead-lettered entry and fails it then.
    pub async fn fail_member(
        &self,
        campaign_id: &str,
        sequence: i64,
        error: &str,
    ) -> Result<(), CourierError> {
        let lease = campaign_lease(campaign_id);
        if !self.acquire(&lease).await? {
            return Err(CourierError::Transient(format!(
                "campaign {campaign_id} is locked; member {sequence} left pending"
            )));
        }
        let result = async {
            let Some(campaign) = self.store.get_campaign(campaign_id).await? else {
                return Ok(());
            };
            if campaign.last_dispatch_pointer != sequence - 1 {
                return Ok(());
            }
            let Some(member) = self.store.get_member(campaign_id, sequence).await? else {
                return Ok(());
            };
            self.fail_locked(&campaign, &member, error).await.map(|_| ())
        }
        .await;
        self.release(&lease).await;
        result
    }

    /// Settles `member` as failed. The caller holds the campaign lease.
    async fn fail_locked(
        &self,
        campaign: &Campaign,
        member: &CampaignMember,
        error: &str,
    ) -> Result<SendOutcome, CourierError> {
        let outcome = self
            .settle(
                campaign,
                member,
                MemberStatus::Failed,
                None,
                Some(error.to_string()),
                SendOutcome::Failed {
                    error: error.to_string(),
                },
            )
            .await?;
        info!(campaign_id = %campaign.id, sequence = member.sequence, ?outcome, "member failed after exhausting retries");
        Ok(outcome)
    }

    async fn acquire(&self, lease: &str) -> Result<bool, CourierError> {
        let now = self.clock.now();
        self.store
            .try_acquire_lease(lease, &self.holder, now, add_std(now, self.lease_ttl))
            .await
    }

    async fn release(&self, lease: &str) {
        if let Err(e) = self.store.release_lease(lease, &self.holder).await {
            warn!(lease, error = %e, "failed to release lease");
        }
    }
}

fn remaining(cap: u32, sent: i64) -> u32 {
    let sent = u32::try_from(sent.max(0)).unwrap_or(u32::MAX);
    cap.saturating_sub(sent)
}
