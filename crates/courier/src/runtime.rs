// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter construction shared by `serve` and the one-shot commands.

use std::sync::Arc;

use courier_config::CourierConfig;
use courier_core::{AlertSink, CourierError, StorageAdapter, SystemClock};
use courier_engine::{Adapters, Services, TracingAlertSink};
use courier_provider::HttpProvider;
use courier_storage::SqliteStorage;
use tracing::info;

/// Everything a command needs: the service graph plus the concrete store
/// so it can be closed cleanly.
pub struct Runtime {
    pub services: Services,
    pub storage: Arc<SqliteStorage>,
    pub holder: String,
}

impl Runtime {
    /// Opens storage (running migrations), builds the provider and alert
    /// sink, and wires the services.
    pub async fn open(config: &CourierConfig) -> Result<Self, CourierError> {
        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        let storage = Arc::new(storage);

        let provider = Arc::new(HttpProvider::new(&config.provider)?);
        let alerts = alert_sink(config)?;
        let holder = holder_id(config);

        let services = Services::build(
            config,
            Adapters {
                store: storage.clone(),
                provider,
                alerts,
                clock: Arc::new(SystemClock),
            },
            &holder,
        );
        Ok(Self {
            services,
            storage,
            holder,
        })
    }

    /// Flushes the WAL and closes the store.
    pub async fn close(self) -> Result<(), CourierError> {
        self.storage.close().await
    }
}

/// Lease holder identity: configured, or unique per process.
pub fn holder_id(config: &CourierConfig) -> String {
    config
        .service
        .instance_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("{}-{}", config.service.name, uuid::Uuid::new_v4()))
}

#[cfg(feature = "email")]
fn alert_sink(config: &CourierConfig) -> Result<Arc<dyn AlertSink>, CourierError> {
    match &config.alert.email {
        Some(email) => {
            let sink = courier_email::EmailAlertSink::new(email)?;
            info!(relay = %email.smtp_host, "email alerts enabled");
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(TracingAlertSink)),
    }
}

#[cfg(not(feature = "email"))]
fn alert_sink(config: &CourierConfig) -> Result<Arc<dyn AlertSink>, CourierError> {
    if config.alert.email.is_some() {
        info!("alert.email is set but email support is not compiled in; alerts go to the log");
    }
    Ok(Arc::new(TracingAlertSink))
}
