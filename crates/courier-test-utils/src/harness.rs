// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TestHarness builder for integration testing.
//!
//! Wires the full engine service graph with a mock provider, a manual clock,
//! a recording alert sink and a temp-file SQLite database.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use courier_config::CourierConfig;
use courier_config::model::StorageConfig;
use courier_core::types::{
    ActivityKind, ActivityStatus, Direction, EventType, RemoteActivity,
};
use courier_core::{CourierError, StorageAdapter};
use courier_engine::{Adapters, EventEnvelope, Services, WebhookVerifier};
use courier_storage::SqliteStorage;

use crate::clock::ManualClock;
use crate::mock_alerts::RecordingAlertSink;
use crate::mock_provider::MockProvider;

/// Sender number used for every outbound message in tests.
pub const TEST_FROM: &str = "+15550009999";
/// Webhook signing secret configured in tests.
pub const TEST_SECRET: &str = "test-webhook-secret";
/// Monday 2026-03-02 15:00 UTC, inside the default business window.
pub const TEST_START: &str = "2026-03-02T15:00:00Z";

/// Builder for constructing a [`TestHarness`].
pub struct TestHarnessBuilder {
    config: CourierConfig,
    start: String,
    holder: String,
}

impl Default for TestHarnessBuilder {
    fn default() -> Self {
        let mut config = CourierConfig::default();
        config.provider.from_number = Some(TEST_FROM.into());
        config.provider.api_key = Some("test-key".into());
        config.webhook.secret = Some(TEST_SECRET.into());
        config.reconciliation.page_delay_ms = 0;
        config.health.check_from = Some("+15550007777".into());
        config.health.check_to = Some("+15550008888".into());
        config.health.timeout_secs = 1;
        config.health.poll_interval_ms = 10;
        Self {
            config,
            start: TEST_START.into(),
            holder: "test-holder".into(),
        }
    }
}

impl TestHarnessBuilder {
    /// Adjusts the configuration before the services are built.
    pub fn with_config(mut self, f: impl FnOnce(&mut CourierConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Sets the initial clock reading (RFC 3339).
    pub fn with_start(mut self, rfc3339: &str) -> Self {
        self.start = rfc3339.into();
        self
    }

    /// Sets the lease holder id of this harness's services.
    pub fn with_holder(mut self, holder: &str) -> Self {
        self.holder = holder.into();
        self
    }

    /// Build the test harness.
    pub async fn build(self) -> Result<TestHarness, CourierError> {
        let temp_dir = tempfile::tempdir()
            .map_err(|e| CourierError::Internal(format!("failed to create temp dir: {e}")))?;
        let db_path = temp_dir.path().join("courier-test.db");
        let database_path = db_path.to_string_lossy().to_string();

        let mut config = self.config;
        config.storage.database_path = database_path.clone();

        let storage = Arc::new(SqliteStorage::new(StorageConfig {
            database_path,
            wal_mode: true,
        }));
        storage.initialize().await?;

        let provider = Arc::new(MockProvider::new());
        let clock = Arc::new(ManualClock::at(&self.start));
        let alerts = Arc::new(RecordingAlertSink::new());

        let adapters = Adapters {
            store: storage.clone(),
            provider: provider.clone(),
            alerts: alerts.clone(),
            clock: clock.clone(),
        };
        let services = Services::build(&config, adapters, &self.holder);

        Ok(TestHarness {
            services,
            storage,
            provider,
            clock,
            alerts,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A fully wired engine on a temporary database.
pub struct TestHarness {
    pub services: Services,
    pub storage: Arc<SqliteStorage>,
    pub provider: Arc<MockProvider>,
    pub clock: Arc<ManualClock>,
    pub alerts: Arc<RecordingAlertSink>,
    pub config: CourierConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::default()
    }

    /// A second service graph sharing this harness's store, provider, clock
    /// and alerts, as a competing process would.
    pub fn peer(&self, holder: &str) -> Services {
        Services::build(&self.config, self.services.adapters.clone(), holder)
    }

    pub fn now(&self) -> DateTime<Utc> {
        courier_core::Clock::now(self.clock.as_ref())
    }

    /// Signs `raw` the way the provider does, stamped with the current clock.
    pub fn sign(&self, raw: &str) -> (String, String) {
        let secret = self.config.webhook.secret.as_deref().unwrap_or(TEST_SECRET);
        let verifier = WebhookVerifier::new(secret.as_bytes(), self.config.webhook.freshness_window_secs);
        (
            verifier.sign(raw.as_bytes()),
            self.now().timestamp().to_string(),
        )
    }

    /// Delivers a signed webhook for `activity`.
    pub async fn deliver(
        &self,
        event_type: EventType,
        activity: RemoteActivity,
    ) -> Result<courier_engine::IngestOutcome, CourierError> {
        let raw = webhook_body(event_type, activity);
        let (signature, timestamp) = self.sign(&raw);
        self.services
            .ingestor
            .ingest(&raw, &signature, &timestamp)
            .await
    }
}

/// Serialized webhook body.
pub fn webhook_body(event_type: EventType, activity: RemoteActivity) -> String {
    let mut envelope = EventEnvelope::from_remote(activity);
    envelope.event_type = event_type;
    envelope
        .to_json()
        .unwrap_or_else(|e| panic!("test payload must serialize: {e}"))
}

/// An inbound text from `from` to the test sender number.
pub fn inbound_text(id: &str, from: &str, body: &str, created_at: DateTime<Utc>) -> RemoteActivity {
    RemoteActivity {
        id: id.into(),
        direction: Direction::Inbound,
        kind: ActivityKind::Message,
        from: from.into(),
        to: TEST_FROM.into(),
        body: Some(body.into()),
        media_urls: vec![],
        status: ActivityStatus::Received,
        created_at,
    }
}

/// An outbound message record as the provider reports it.
pub fn outbound_text(
    id: &str,
    to: &str,
    body: &str,
    status: ActivityStatus,
    created_at: DateTime<Utc>,
) -> RemoteActivity {
    RemoteActivity {
        id: id.into(),
        direction: Direction::Outbound,
        kind: ActivityKind::Message,
        from: TEST_FROM.into(),
        to: to.into(),
        body: Some(body.into()),
        media_urls: vec![],
        status,
        created_at,
    }
}
