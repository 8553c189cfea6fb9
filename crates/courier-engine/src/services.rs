// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Explicit wiring of every engine service.

use std::sync::Arc;
use std::time::Duration;

use courier_config::CourierConfig;
use courier_core::{AlertSink, Clock, MessagingProvider, StorageAdapter};

use crate::archive::EventArchiver;
use crate::compliance::ComplianceGate;
use crate::dispatch::CampaignDispatchEngine;
use crate::health::HealthCheckService;
use crate::ingest::Ingestor;
use crate::reconcile::ReconciliationService;
use crate::retry::{
    CampaignSendHandler, ConfirmationSendHandler, ErrorRecoveryQueue, IngestReplayHandler,
    RetryHandlers, RetryPolicy, RetryScheduler,
};
use crate::signature::WebhookVerifier;

/// Adapters the services are built on.
#[derive(Clone)]
pub struct Adapters {
    pub store: Arc<dyn StorageAdapter>,
    pub provider: Arc<dyn MessagingProvider>,
    pub alerts: Arc<dyn AlertSink>,
    pub clock: Arc<dyn Clock>,
}

/// Every engine service, built once at process start.
#[derive(Clone)]
pub struct Services {
    pub adapters: Adapters,
    pub compliance: Arc<ComplianceGate>,
    pub ingestor: Arc<Ingestor>,
    pub dispatch: Arc<CampaignDispatchEngine>,
    pub retry_queue: Arc<ErrorRecoveryQueue>,
    pub reconciliation: Arc<ReconciliationService>,
    pub health: Arc<HealthCheckService>,
    pub archiver: Arc<EventArchiver>,
}

impl Services {
    /// Builds the service graph. `holder` identifies this process in leases.
    pub fn build(config: &CourierConfig, adapters: Adapters, holder: &str) -> Self {
        let Adapters {
            store,
            provider,
            alerts,
            clock,
        } = adapters.clone();

        let scheduler = RetryScheduler::new(
            store.clone(),
            clock.clone(),
            RetryPolicy::from_config(&config.retry),
        );
        let send_timeout = Duration::from_secs(config.dispatch.send_timeout_secs);

        let compliance = Arc::new(ComplianceGate::new(
            store.clone(),
            provider.clone(),
            clock.clone(),
            alerts.clone(),
            scheduler.clone(),
            config.compliance.clone(),
            config.provider.from_number.clone(),
            send_timeout,
        ));

        let verifier = config
            .webhook
            .secret
            .as_ref()
            .map(|secret| WebhookVerifier::new(secret.as_bytes(), config.webhook.freshness_window_secs));
        let ingestor = Arc::new(Ingestor::new(
            store.clone(),
            compliance.clone(),
            clock.clone(),
            scheduler.clone(),
            verifier,
        ));

        let dispatch = Arc::new(CampaignDispatchEngine::new(
            store.clone(),
            provider.clone(),
            compliance.clone(),
            clock.clone(),
            scheduler.clone(),
            config.dispatch.clone(),
            config.provider.from_number.clone(),
            holder.to_string(),
            Duration::from_secs(config.service.lease_ttl_secs),
        ));

        let handlers = RetryHandlers {
            ingest_event: Arc::new(IngestReplayHandler::new(ingestor.clone())),
            campaign_send: Arc::new(CampaignSendHandler::new(dispatch.clone())),
            confirmation_send: Arc::new(ConfirmationSendHandler::new(compliance.clone())),
        };
        let retry_queue = Arc::new(ErrorRecoveryQueue::new(
            store.clone(),
            clock.clone(),
            alerts.clone(),
            scheduler,
            handlers,
        ));

        let reconciliation = Arc::new(ReconciliationService::new(
            store.clone(),
            provider.clone(),
            ingestor.clone(),
            clock.clone(),
            alerts.clone(),
            config.reconciliation.clone(),
        ));

        let health = Arc::new(HealthCheckService::new(
            store.clone(),
            provider,
            clock.clone(),
            alerts,
            config.health.clone(),
            send_timeout,
        ));

        let archiver = Arc::new(EventArchiver::new(store, clock, config.archive.clone()));

        Self {
            adapters,
            compliance,
            ingestor,
            dispatch,
            retry_queue,
            reconciliation,
            health,
            archiver,
        }
    }
}
