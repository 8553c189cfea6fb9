// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Courier messaging engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use courier_core::BusinessHours;
use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Messaging provider API settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Inbound webhook verification settings.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// HTTP gateway (webhook endpoint and admin API).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Opt-out confirmation texts.
    #[serde(default)]
    pub compliance: ComplianceConfig,

    /// Campaign dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Error recovery queue settings.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Provider reconciliation settings.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,

    /// Synthetic health check settings.
    #[serde(default)]
    pub health: HealthConfig,

    /// Event archival settings.
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Alert delivery settings.
    #[serde(default)]
    pub alert: AlertConfig,

    /// Prometheus metrics settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name used in logs and alert subjects.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Lease holder identity. Generated per process when unset.
    #[serde(default)]
    pub instance_id: Option<String>,

    /// Time-to-live of scheduler task leases, in seconds.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            instance_id: None,
            lease_ttl_secs: default_lease_ttl_secs(),
        }
    }
}

fn default_service_name() -> String {
    "courier".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_lease_ttl_secs() -> u64 {
    900
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("courier").join("courier.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("courier.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Messaging provider API configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL of the provider REST API.
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// API key sent as a bearer token. Required by every command that calls the provider.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Default sender number for campaign and confirmation messages.
    #[serde(default)]
    pub from_number: Option<String>,

    /// Per-request timeout, in seconds.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,

    /// Client-side token bucket refill rate.
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Client-side token bucket capacity.
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Records requested per activity feed page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("from_number", &self.from_number)
            .field("timeout_secs", &self.timeout_secs)
            .field("requests_per_second", &self.requests_per_second)
            .field("burst", &self.burst)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            api_key: None,
            from_number: None,
            timeout_secs: default_provider_timeout_secs(),
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
            page_size: default_page_size(),
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_provider_base_url() -> String {
    "https://api.messaging-provider.example/v1".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    10
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_burst() -> u32 {
    10
}

fn default_page_size() -> u32 {
    100
}

/// Inbound webhook verification configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Shared HMAC-SHA256 secret. `None` rejects every webhook (fail-closed).
    #[serde(default)]
    pub secret: Option<String>,

    /// Maximum allowed |now - timestamp header|, in seconds.
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("secret", &self.secret.as_ref().map(|_| "[redacted]"))
            .field("freshness_window_secs", &self.freshness_window_secs)
            .finish()
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            freshness_window_secs: default_freshness_window_secs(),
        }
    }
}

fn default_freshness_window_secs() -> u64 {
    300
}

/// HTTP gateway configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Enable the HTTP gateway in `courier serve`.
    #[serde(default = "default_gateway_enabled")]
    pub enabled: bool,

    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token for the admin API. `None` rejects admin requests.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: default_gateway_enabled(),
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

fn default_gateway_enabled() -> bool {
    true
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3000
}

/// Compliance confirmation texts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ComplianceConfig {
    /// Sent once when a contact opts out.
    #[serde(default = "default_opt_out_confirmation")]
    pub opt_out_confirmation: String,

    /// Sent once when a contact opts back in.
    #[serde(default = "default_opt_in_confirmation")]
    pub opt_in_confirmation: String,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            opt_out_confirmation: default_opt_out_confirmation(),
            opt_in_confirmation: default_opt_in_confirmation(),
        }
    }
}

fn default_opt_out_confirmation() -> String {
    "You have been unsubscribed and will not receive further messages. Reply START to resubscribe."
        .to_string()
}

fn default_opt_in_confirmation() -> String {
    "You have been resubscribed. Reply STOP to unsubscribe.".to_string()
}

/// Campaign dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Seconds between dispatch ticks.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Maximum sends per campaign per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Send attempts per member before it is marked failed.
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,

    /// Upper bound on one provider send call, in seconds.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Optional cap on sends per UTC day summed across all campaigns.
    #[serde(default)]
    pub global_daily_cap: Option<u32>,

    /// Window applied to campaigns created without an explicit one.
    #[serde(default)]
    pub default_business_hours: BusinessHours,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            batch_size: default_batch_size(),
            max_send_attempts: default_max_send_attempts(),
            send_timeout_secs: default_send_timeout_secs(),
            global_daily_cap: None,
            default_business_hours: BusinessHours::default(),
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    60
}

fn default_batch_size() -> u32 {
    50
}

fn default_max_send_attempts() -> u32 {
    3
}

fn default_send_timeout_secs() -> u64 {
    15
}

/// Error recovery queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Seconds between queue drains.
    #[serde(default = "default_retry_interval_secs")]
    pub interval_secs: u64,

    /// Backoff base; attempt n waits `base * 2^(n-1)`.
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    /// Attempts before an entry is dead-lettered.
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,

    /// How long a claim shields an entry from other workers, in seconds.
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,

    /// Entries claimed per drain.
    #[serde(default = "default_retry_batch_size")]
    pub batch_size: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_retry_interval_secs(),
            base_delay_secs: default_base_delay_secs(),
            max_attempts: default_retry_max_attempts(),
            claim_ttl_secs: default_claim_ttl_secs(),
            batch_size: default_retry_batch_size(),
        }
    }
}

fn default_retry_interval_secs() -> u64 {
    300
}

fn default_base_delay_secs() -> u64 {
    60
}

fn default_retry_max_attempts() -> u32 {
    5
}

fn default_claim_ttl_secs() -> u64 {
    120
}

fn default_retry_batch_size() -> u32 {
    50
}

/// Provider reconciliation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconciliationConfig {
    /// Seconds between scheduled runs.
    #[serde(default = "default_reconciliation_interval_secs")]
    pub interval_secs: u64,

    /// Overlap subtracted from the checkpoint, in seconds.
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: u64,

    /// Window covered by the very first run, in seconds.
    #[serde(default = "default_initial_lookback_secs")]
    pub initial_lookback_secs: u64,

    /// Pause between feed pages, in milliseconds.
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reconciliation_interval_secs(),
            lookback_secs: default_lookback_secs(),
            initial_lookback_secs: default_initial_lookback_secs(),
            page_delay_ms: default_page_delay_ms(),
        }
    }
}

fn default_reconciliation_interval_secs() -> u64 {
    86_400
}

fn default_lookback_secs() -> u64 {
    3_600
}

fn default_initial_lookback_secs() -> u64 {
    7 * 86_400
}

fn default_page_delay_ms() -> u64 {
    250
}

/// Synthetic health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    /// Enable the scheduled check.
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between checks.
    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,

    /// Dedicated number the check is sent from.
    #[serde(default)]
    pub check_from: Option<String>,

    /// Dedicated number the check is sent to; its inbound webhook closes the loop.
    #[serde(default)]
    pub check_to: Option<String>,

    /// How long to wait for the inbound webhook, in seconds.
    #[serde(default = "default_health_timeout_secs")]
    pub timeout_secs: u64,

    /// Store polling interval while waiting, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_health_interval_secs(),
            check_from: None,
            check_to: None,
            timeout_secs: default_health_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_health_interval_secs() -> u64 {
    3_600
}

fn default_health_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

/// Event archival configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Seconds between archival runs.
    #[serde(default = "default_archive_interval_secs")]
    pub interval_secs: u64,

    /// Processed events older than this many days are archived.
    #[serde(default = "default_retain_days")]
    pub retain_days: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_archive_interval_secs(),
            retain_days: default_retain_days(),
        }
    }
}

fn default_archive_interval_secs() -> u64 {
    86_400
}

fn default_retain_days() -> u32 {
    90
}

/// Alert delivery configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AlertConfig {
    /// SMTP delivery. Alerts are only logged when unset.
    #[serde(default)]
    pub email: Option<EmailAlertConfig>,
}

/// SMTP alert delivery configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmailAlertConfig {
    /// SMTP relay host.
    pub smtp_host: String,

    /// SMTP submission port.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// SMTP username.
    #[serde(default)]
    pub username: Option<String>,

    /// SMTP password.
    #[serde(default)]
    pub password: Option<String>,

    /// Sender mailbox, e.g. `Courier <alerts@example.com>`.
    pub from: String,

    /// Recipient mailboxes.
    pub to: Vec<String>,

    /// Prefix prepended to every subject line.
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

impl std::fmt::Debug for EmailAlertConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailAlertConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("from", &self.from)
            .field("to", &self.to)
            .field("subject_prefix", &self.subject_prefix)
            .finish()
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_subject_prefix() -> String {
    "[courier]".to_string()
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Install the Prometheus recorder and serve `/metrics`.
    #[serde(default = "default_prometheus_enabled")]
    pub enabled: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: default_prometheus_enabled(),
        }
    }
}

fn default_prometheus_enabled() -> bool {
    true
}
