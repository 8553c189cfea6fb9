// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use courier_config::model::StorageConfig;
use courier_core::types::{
    Activity, ActivityStatus, Campaign, CampaignMember, CampaignStatus, ContactComplianceFlag,
    ExternalEvent, HealthCheckRecord, MemberSettlement, MemberStatus, NewRetryEntry,
    RecordOutcome, RetryEntry, RetryItemType, StatusCounts,
};
use courier_core::{AdapterType, CourierError, HealthStatus, PluginAdapter, StorageAdapter};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// The database is opened by [`StorageAdapter::initialize`]; every other
/// method fails with a storage error until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, CourierError> {
        self.db
            .get()
            .ok_or_else(|| CourierError::storage("storage not initialized -- call initialize() first"))
    }

    async fn checkpoint_wal(&self, db: &Database) -> Result<(), CourierError> {
        if !self.config.wal_mode {
            return Ok(());
        }
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        self.db()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        match self.db.get() {
            Some(db) => self.checkpoint_wal(db).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), CourierError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db
            .set(db)
            .map_err(|_| CourierError::storage("storage already initialized"))?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), CourierError> {
        self.checkpoint_wal(self.db()?).await
    }

    // --- Events and activities ---

    async fn get_event(&self, external_id: &str) -> Result<Option<ExternalEvent>, CourierError> {
        queries::events::get_event(self.db()?, external_id).await
    }

    async fn record_event(
        &self,
        event: &ExternalEvent,
        activity: Option<&Activity>,
    ) -> Result<RecordOutcome, CourierError> {
        queries::events::record_event(self.db()?, event, activity).await
    }

    async fn mark_event_processed(
        &self,
        external_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        queries::events::mark_event_processed(self.db()?, external_id, at).await
    }

    async fn mark_event_failed(&self, external_id: &str, error: &str) -> Result<(), CourierError> {
        queries::events::mark_event_failed(self.db()?, external_id, error).await
    }

    async fn archive_events(
        &self,
        before: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<u64, CourierError> {
        queries::events::archive_events(self.db()?, before, at).await
    }

    async fn get_activity(&self, external_id: &str) -> Result<Option<Activity>, CourierError> {
        queries::activities::get_activity(self.db()?, external_id).await
    }

    async fn activity_count(&self) -> Result<i64, CourierError> {
        queries::activities::activity_count(self.db()?).await
    }

    async fn advance_activity_status(
        &self,
        external_id: &str,
        status: ActivityStatus,
    ) -> Result<bool, CourierError> {
        queries::activities::advance_activity_status(self.db()?, external_id, status).await
    }

    async fn find_inbound_activity(
        &self,
        contact: &str,
        body: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<Activity>, CourierError> {
        queries::activities::find_inbound_activity(self.db()?, contact, body, since).await
    }

    // --- Compliance ---

    async fn get_active_opt_out(
        &self,
        contact: &str,
    ) -> Result<Option<ContactComplianceFlag>, CourierError> {
        queries::compliance::get_active_opt_out(self.db()?, contact).await
    }

    async fn insert_opt_out(
        &self,
        contact: &str,
        reason: &str,
        at: DateTime<Utc>,
        follow_up: Option<&NewRetryEntry>,
    ) -> Result<bool, CourierError> {
        queries::compliance::insert_opt_out(self.db()?, contact, reason, at, follow_up).await
    }

    async fn expire_opt_out(
        &self,
        contact: &str,
        at: DateTime<Utc>,
        follow_up: Option<&NewRetryEntry>,
    ) -> Result<bool, CourierError> {
        queries::compliance::expire_opt_out(self.db()?, contact, at, follow_up).await
    }

    async fn skip_pending_members_for_contact(&self, contact: &str) -> Result<u64, CourierError> {
        queries::compliance::skip_pending_members_for_contact(self.db()?, contact).await
    }

    // --- Campaigns ---

    async fn insert_campaign(&self, campaign: &Campaign) -> Result<(), CourierError> {
        queries::campaigns::insert_campaign(self.db()?, campaign).await
    }

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>, CourierError> {
        queries::campaigns::get_campaign(self.db()?, id).await
    }

    async fn list_campaigns(
        &self,
        status: Option<CampaignStatus>,
    ) -> Result<Vec<Campaign>, CourierError> {
        queries::campaigns::list_campaigns(self.db()?, status).await
    }

    async fn transition_campaign(
        &self,
        id: &str,
        from: CampaignStatus,
        to: CampaignStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, CourierError> {
        queries::campaigns::transition_campaign(self.db()?, id, from, to, at).await
    }

    async fn append_members(
        &self,
        campaign_id: &str,
        contacts: &[String],
    ) -> Result<u64, CourierError> {
        queries::members::append_members(self.db()?, campaign_id, contacts).await
    }

    async fn last_sequence(&self, campaign_id: &str) -> Result<i64, CourierError> {
        queries::members::last_sequence(self.db()?, campaign_id).await
    }

    async fn get_member(
        &self,
        campaign_id: &str,
        sequence: i64,
    ) -> Result<Option<CampaignMember>, CourierError> {
        queries::members::get_member(self.db()?, campaign_id, sequence).await
    }

    async fn members_after(
        &self,
        campaign_id: &str,
        after: i64,
        limit: u32,
    ) -> Result<Vec<CampaignMember>, CourierError> {
        queries::members::members_after(self.db()?, campaign_id, after, limit).await
    }

    async fn list_members(&self, campaign_id: &str) -> Result<Vec<CampaignMember>, CourierError> {
        queries::members::list_members(self.db()?, campaign_id).await
    }

    async fn settle_member(&self, settlement: &MemberSettlement) -> Result<bool, CourierError> {
        queries::members::settle_member(self.db()?, settlement).await
    }

    async fn record_member_attempt(
        &self,
        campaign_id: &str,
        sequence: i64,
        error: &str,
    ) -> Result<u32, CourierError> {
        queries::members::record_member_attempt(self.db()?, campaign_id, sequence, error).await
    }

    async fn sent_count_since(
        &self,
        campaign_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<i64, CourierError> {
        queries::members::sent_count_since(self.db()?, campaign_id, since).await
    }

    async fn update_member_by_activity(
        &self,
        activity_ref: &str,
        from: &[MemberStatus],
        to: MemberStatus,
    ) -> Result<u64, CourierError> {
        queries::members::update_member_by_activity(self.db()?, activity_ref, from, to).await
    }

    async fn mark_members_responded(&self, contact: &str) -> Result<u64, CourierError> {
        queries::members::mark_members_responded(self.db()?, contact).await
    }

    // --- Retry queue ---

    async fn upsert_retry(&self, entry: &NewRetryEntry) -> Result<i64, CourierError> {
        queries::retry::upsert_retry(self.db()?, entry).await
    }

    async fn find_open_retry(
        &self,
        item_type: RetryItemType,
        item_ref: &str,
    ) -> Result<Option<RetryEntry>, CourierError> {
        queries::retry::find_open_retry(self.db()?, item_type, item_ref).await
    }

    async fn find_dead_letter(
        &self,
        item_type: RetryItemType,
        item_ref: &str,
    ) -> Result<Option<RetryEntry>, CourierError> {
        queries::retry::find_dead_letter(self.db()?, item_type, item_ref).await
    }

    async fn claim_due_retries(
        &self,
        now: DateTime<Utc>,
        claim_until: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<RetryEntry>, CourierError> {
        queries::retry::claim_due_retries(self.db()?, now, claim_until, limit).await
    }

    async fn reschedule_retry(
        &self,
        id: i64,
        attempt_count: u32,
        next_eligible_at: DateTime<Utc>,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        queries::retry::reschedule_retry(self.db()?, id, attempt_count, next_eligible_at, error, at)
            .await
    }

    async fn dead_letter_retry(
        &self,
        id: i64,
        attempt_count: u32,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        queries::retry::dead_letter_retry(self.db()?, id, attempt_count, error, at).await
    }

    async fn delete_retry(&self, id: i64) -> Result<(), CourierError> {
        queries::retry::delete_retry(self.db()?, id).await
    }

    async fn list_dead_letters(&self, limit: u32) -> Result<Vec<RetryEntry>, CourierError> {
        queries::retry::list_dead_letters(self.db()?, limit).await
    }

    // --- Leases ---

    async fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, CourierError> {
        queries::leases::try_acquire_lease(self.db()?, name, holder, now, expires_at).await
    }

    async fn release_lease(&self, name: &str, holder: &str) -> Result<(), CourierError> {
        queries::leases::release_lease(self.db()?, name, holder).await
    }

    // --- Checkpoints ---

    async fn get_checkpoint(&self, name: &str) -> Result<Option<DateTime<Utc>>, CourierError> {
        queries::checkpoints::get_checkpoint(self.db()?, name).await
    }

    async fn set_checkpoint(
        &self,
        name: &str,
        value: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        queries::checkpoints::set_checkpoint(self.db()?, name, value, at).await
    }

    // --- Health checks and dashboard ---

    async fn insert_health_check(&self, record: &HealthCheckRecord) -> Result<i64, CourierError> {
        queries::health::insert_health_check(self.db()?, record).await
    }

    async fn recent_health_checks(
        &self,
        limit: u32,
    ) -> Result<Vec<HealthCheckRecord>, CourierError> {
        queries::health::recent_health_checks(self.db()?, limit).await
    }

    async fn status_counts(&self) -> Result<StatusCounts, CourierError> {
        queries::status::status_counts(self.db()?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::parse_ts;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn sqlite_storage_implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::new(make_config(dir.path().join("a.db").to_str().unwrap()));
        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn calls_before_initialize_fail() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::new(make_config(dir.path().join("b.db").to_str().unwrap()));
        assert!(storage.health_check().await.is_err());
        assert!(storage.get_event("x").await.is_err());
        // Shutdown without a database is a no-op.
        storage.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::new(make_config(dir.path().join("c.db").to_str().unwrap()));
        storage.initialize().await.unwrap();
        assert!(storage.initialize().await.is_err());
    }

    #[tokio::test]
    async fn status_counts_cover_every_category() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::new(make_config(dir.path().join("d.db").to_str().unwrap()));
        storage.initialize().await.unwrap();
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);

        let at = parse_ts("2026-03-02T10:00:00.000Z").unwrap();
        storage.insert_opt_out("+15550001111", "keyword:STOP", at, None).await.unwrap();
        storage
            .insert_health_check(&HealthCheckRecord {
                outbound_external_id: None,
                passed: false,
                latency_ms: None,
                detail: "send failed".into(),
                created_at: at,
            })
            .await
            .unwrap();

        let counts = storage.status_counts().await.unwrap();
        assert_eq!(counts.opted_out_contacts, 1);
        assert_eq!(counts.failed_health_checks, 1);
        assert_eq!(counts.retry_pending, 0);
        assert!(counts.campaigns.is_empty());

        let recent = storage.recent_health_checks(5).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert!(!recent[0].passed);

        storage.close().await.unwrap();
    }
}
