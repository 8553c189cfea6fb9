// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier serve` command implementation.
//!
//! Opens storage, installs the metrics recorder, starts the scheduler tasks
//! and (when enabled) the HTTP gateway, then waits for a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use courier_config::CourierConfig;
use courier_core::CourierError;
use courier_cron::Scheduler;
use tracing::{debug, error, info, warn};

use crate::runtime::Runtime;
use crate::shutdown;

/// How long scheduler tasks get to finish an in-flight run after cancellation.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the `courier serve` command.
pub async fn run_serve(config: CourierConfig) -> Result<(), CourierError> {
    init_tracing(&config.service.log_level);

    info!(name = %config.service.name, "starting courier serve");

    let prometheus_adapter = if config.prometheus.enabled {
        match courier_prometheus::PrometheusAdapter::new() {
            Ok(adapter) => {
                info!("prometheus metrics enabled");
                Some(Arc::new(adapter))
            }
            Err(e) => {
                warn!(error = %e, "prometheus initialization failed, continuing without metrics");
                None
            }
        }
    } else {
        debug!("prometheus metrics disabled by configuration");
        None
    };

    let runtime = Runtime::open(&config).await?;
    info!(holder = %runtime.holder, "services initialized");

    let cancel = shutdown::install_signal_handler();

    let scheduler = Scheduler::for_services(&config, &runtime.services, &runtime.holder);
    info!(tasks = ?scheduler.task_names(), "scheduler configured");
    let task_handles = scheduler.spawn(cancel.clone());

    #[cfg(feature = "gateway")]
    let gateway_handle = if config.gateway.enabled {
        let prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>> =
            prometheus_adapter.clone().map(|adapter| {
                Arc::new(move || adapter.render()) as Arc<dyn Fn() -> String + Send + Sync>
            });
        let state = courier_gateway::GatewayState {
            services: runtime.services.clone(),
            auth: courier_gateway::AuthConfig {
                bearer_token: config.gateway.bearer_token.clone(),
            },
            health: courier_gateway::HealthState {
                start_time: std::time::Instant::now(),
                prometheus_render,
            },
        };
        let server_config = courier_gateway::ServerConfig::from(&config.gateway);
        let gateway_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) =
                courier_gateway::start_server(&server_config, state, gateway_cancel.clone()).await
            {
                error!(error = %e, "gateway failed");
                gateway_cancel.cancel();
            }
        }))
    } else {
        info!("gateway disabled by configuration");
        None
    };

    #[cfg(not(feature = "gateway"))]
    let gateway_handle: Option<tokio::task::JoinHandle<()>> = {
        let _ = &prometheus_adapter;
        if config.gateway.enabled {
            warn!("gateway.enabled is set but the gateway is not compiled in");
        }
        None
    };

    cancel.cancelled().await;
    info!("shutdown requested, draining scheduled tasks");

    let drain = async {
        for handle in task_handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "scheduler task ended abnormally");
            }
        }
        if let Some(handle) = gateway_handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "gateway task ended abnormally");
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        warn!(timeout_secs = DRAIN_TIMEOUT.as_secs(), "drain timed out, exiting anyway");
    }

    runtime.close().await?;
    info!("courier stopped");
    Ok(())
}

const COURIER_TARGETS: &[&str] = &[
    "courier",
    "courier_engine",
    "courier_cron",
    "courier_gateway",
    "courier_provider",
    "courier_storage",
    "courier_email",
];

/// Initializes the tracing subscriber with an env filter. Logs go to stderr
/// so command output on stdout stays machine-readable.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives: Vec<String> = COURIER_TARGETS
            .iter()
            .map(|target| format!("{target}={log_level}"))
            .chain(std::iter::once("warn".to_string()))
            .collect();
        EnvFilter::new(directives.join(","))
    });

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init();
}
