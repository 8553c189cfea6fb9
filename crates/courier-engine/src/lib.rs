// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier engine services.
//!
//! Every service is built once at process start from `Arc<dyn Trait>`
//! dependencies (store, provider, alert sink, clock) and holds no state of
//! its own beyond in-process locks: pointers, flags, claims, leases and
//! checkpoints all live in the store.

pub mod alert;
pub mod archive;
pub mod compliance;
pub mod dispatch;
pub mod health;
pub mod identity;
pub mod ingest;
pub mod lock;
pub mod payload;
pub mod reconcile;
pub mod retry;
pub mod send;
pub mod services;
pub mod signature;

pub use alert::TracingAlertSink;
pub use archive::EventArchiver;
pub use compliance::{classify_keyword, ComplianceGate};
pub use dispatch::{CampaignDispatchEngine, DispatchStats, NewCampaign, SendOutcome};
pub use health::HealthCheckService;
pub use identity::{contact_key, normalize_identity};
pub use ingest::{IngestOutcome, Ingestor, ReconcileOutcome};
pub use payload::EventEnvelope;
pub use reconcile::{ReconciliationService, ReconciliationStats};
pub use retry::{
    backoff_delay, CampaignSendHandler, ConfirmationSendHandler, ErrorRecoveryQueue,
    HandlerOutcome, IngestReplayHandler, RetryHandler, RetryHandlers, RetryPolicy, RetryScheduler,
    RetryStats,
};
pub use services::{Adapters, Services};
pub use signature::WebhookVerifier;
