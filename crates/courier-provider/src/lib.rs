// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging provider adapter for Courier.
//!
//! This crate implements [`MessagingProvider`] over the provider's REST API:
//! sending messages and paging the activity feed, behind a client-side
//! token bucket.

pub mod client;
pub mod rate_limit;
pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_config::model::ProviderConfig;
use courier_core::types::{ActivityPage, AdapterType, HealthStatus, OutboundMessage, SendReceipt};
use courier_core::{CourierError, MessagingProvider, PluginAdapter};
use tracing::info;

use crate::client::ProviderClient;

/// REST provider implementing [`MessagingProvider`].
#[derive(Debug)]
pub struct HttpProvider {
    client: ProviderClient,
}

impl HttpProvider {
    /// Creates the provider from configuration. Fails when no API key is set.
    pub fn new(config: &ProviderConfig) -> Result<Self, CourierError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                CourierError::Config(
                    "provider.api_key is required (or set COURIER_PROVIDER_API_KEY)".into(),
                )
            })?;

        let client = ProviderClient::new(
            &config.base_url,
            api_key,
            config.timeout(),
            config.requests_per_second,
            config.burst,
            config.page_size,
        )?;

        info!(
            base_url = %config.base_url,
            requests_per_second = config.requests_per_second,
            "messaging provider initialized"
        );
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: ProviderClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PluginAdapter for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        // End-to-end liveness is the synthetic check's job.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        Ok(())
    }
}

#[async_trait]
impl MessagingProvider for HttpProvider {
    async fn send_message(&self, message: &OutboundMessage) -> Result<SendReceipt, CourierError> {
        self.client.send_message(message).await
    }

    async fn list_activities(
        &self,
        since: DateTime<Utc>,
        cursor: Option<&str>,
    ) -> Result<ActivityPage, CourierError> {
        self.client.list_activities(since, cursor).await
    }
}
