// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot administrative commands. Each opens the shared database, runs a
//! single engine operation, and prints the result as JSON on stdout.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use courier_config::CourierConfig;
use courier_core::types::{Campaign, OptOutResult};
use courier_core::{CourierError, HealthStatus};
use courier_engine::NewCampaign;
use serde::Serialize;
use serde_json::json;

use crate::runtime::Runtime;
use crate::serve::init_tracing;

/// Campaign lifecycle commands.
#[derive(Debug, Clone, Copy)]
pub enum Transition {
    Activate,
    Pause,
    Resume,
}

async fn open(config: &CourierConfig) -> Result<Runtime, CourierError> {
    init_tracing(&config.service.log_level);
    Runtime::open(config).await
}

fn print_json(value: &impl Serialize) -> Result<(), CourierError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| CourierError::Internal(format!("failed to render output: {e}")))?;
    println!("{rendered}");
    Ok(())
}

fn campaign_json(campaign: &Campaign) -> serde_json::Value {
    json!({
        "id": campaign.id,
        "name": campaign.name,
        "status": campaign.status.to_string(),
        "daily_cap": campaign.daily_cap,
        "batch_size": campaign.batch_size,
        "last_dispatch_pointer": campaign.last_dispatch_pointer,
    })
}

pub async fn reconcile(config: CourierConfig, lookback_secs: Option<u64>) -> Result<(), CourierError> {
    let runtime = open(&config).await?;
    let service = &runtime.services.reconciliation;
    let lookback = lookback_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| service.default_lookback());
    let stats = service.run(lookback).await;
    runtime.close().await?;
    print_json(&stats?)
}

pub async fn create_campaign(
    config: CourierConfig,
    name: String,
    body: String,
    daily_cap: u32,
    batch_size: Option<u32>,
) -> Result<(), CourierError> {
    let runtime = open(&config).await?;
    let created = runtime
        .services
        .dispatch
        .create_campaign(NewCampaign {
            name,
            body,
            daily_cap,
            batch_size,
            business_hours: None,
        })
        .await;
    runtime.close().await?;
    print_json(&campaign_json(&created?))
}

pub async fn add_members(
    config: CourierConfig,
    campaign_id: &str,
    file: &Path,
) -> Result<(), CourierError> {
    let contacts = read_contacts(file)?;
    let runtime = open(&config).await?;
    let added = runtime.services.dispatch.add_members(campaign_id, &contacts).await;
    runtime.close().await?;
    print_json(&json!({ "campaign_id": campaign_id, "added": added? }))
}

/// One contact per line; blank lines and `#` comments are ignored.
fn read_contacts(file: &Path) -> Result<Vec<String>, CourierError> {
    let mut raw = String::new();
    if file == Path::new("-") {
        std::io::stdin()
            .read_to_string(&mut raw)
            .map_err(|e| CourierError::InvalidInput(format!("failed to read stdin: {e}")))?;
    } else {
        raw = std::fs::read_to_string(file).map_err(|e| {
            CourierError::InvalidInput(format!("failed to read {}: {e}", file.display()))
        })?;
    }
    Ok(parse_contacts(&raw))
}

fn parse_contacts(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub async fn transition(
    config: CourierConfig,
    campaign_id: &str,
    transition: Transition,
) -> Result<(), CourierError> {
    let runtime = open(&config).await?;
    let dispatch = &runtime.services.dispatch;
    let result = match transition {
        Transition::Activate => dispatch.activate(campaign_id).await,
        Transition::Pause => dispatch.pause(campaign_id).await,
        Transition::Resume => dispatch.resume(campaign_id).await,
    };
    runtime.close().await?;
    print_json(&campaign_json(&result?))
}

pub async fn status(config: CourierConfig) -> Result<(), CourierError> {
    let runtime = open(&config).await?;
    let counts = runtime.services.adapters.store.status_counts().await;
    runtime.close().await?;
    print_json(&counts?)
}

pub async fn health_check(config: CourierConfig) -> Result<(), CourierError> {
    let runtime = open(&config).await?;
    let result = runtime.services.health.run_check().await;
    runtime.close().await?;
    let (status, detail) = match result? {
        HealthStatus::Healthy => ("healthy", None),
        HealthStatus::Degraded(detail) => ("degraded", Some(detail)),
        HealthStatus::Unhealthy(detail) => ("unhealthy", Some(detail)),
    };
    print_json(&json!({ "status": status, "detail": detail }))?;
    if status == "unhealthy" {
        return Err(CourierError::Pipeline {
            component: "health",
            message: "synthetic check failed".into(),
        });
    }
    Ok(())
}

pub async fn dead_letters(config: CourierConfig, limit: u32) -> Result<(), CourierError> {
    let runtime = open(&config).await?;
    let entries = runtime.services.retry_queue.dead_letters(limit).await;
    runtime.close().await?;
    print_json(&entries?)
}

pub async fn opt_out(config: CourierConfig, contact: &str, reason: &str) -> Result<(), CourierError> {
    let runtime = open(&config).await?;
    let result = runtime.services.compliance.opt_out(contact, reason).await;
    runtime.close().await?;
    print_json(&json!({ "contact": contact, "result": describe(result?) }))
}

pub async fn opt_in(config: CourierConfig, contact: &str) -> Result<(), CourierError> {
    let runtime = open(&config).await?;
    let result = runtime.services.compliance.opt_in(contact).await;
    runtime.close().await?;
    print_json(&json!({ "contact": contact, "result": describe(result?) }))
}

fn describe(result: OptOutResult) -> &'static str {
    match result {
        OptOutResult::NoMatch => "no_match",
        OptOutResult::OptedOut => "opted_out",
        OptOutResult::OptedIn => "opted_in",
        OptOutResult::Unchanged(_) => "unchanged",
    }
}
