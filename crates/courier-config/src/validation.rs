// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks run after deserialization.
//!
//! All problems are collected so operators see every mistake in one pass.

use crate::diagnostic::ConfigError;
use crate::model::CourierConfig;

/// Validate a deserialized configuration.
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation("storage.database_path must not be empty"));
    }

    if http_url_rest(&config.provider.base_url).is_none() {
        errors.push(ConfigError::validation(format!(
            "provider.base_url `{}` must be an http(s) URL",
            config.provider.base_url
        )));
    }

    let host = config.gateway.host.trim();
    if host.is_empty()
        || (host.parse::<std::net::IpAddr>().is_err()
            && !host.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '-'))
    {
        errors.push(ConfigError::validation(format!(
            "gateway.host `{host}` is not a valid IP address or hostname"
        )));
    }

    for (key, value) in [
        ("provider.requests_per_second", config.provider.requests_per_second),
        ("provider.burst", config.provider.burst),
        ("provider.page_size", config.provider.page_size),
        ("dispatch.batch_size", config.dispatch.batch_size),
        ("dispatch.max_send_attempts", config.dispatch.max_send_attempts),
        ("retry.max_attempts", config.retry.max_attempts),
        ("retry.batch_size", config.retry.batch_size),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!("{key} must be at least 1")));
        }
    }

    for (key, value) in [
        ("dispatch.tick_interval_secs", config.dispatch.tick_interval_secs),
        ("retry.interval_secs", config.retry.interval_secs),
        ("retry.base_delay_secs", config.retry.base_delay_secs),
        ("reconciliation.interval_secs", config.reconciliation.interval_secs),
        ("health.interval_secs", config.health.interval_secs),
        ("archive.interval_secs", config.archive.interval_secs),
        ("service.lease_ttl_secs", config.service.lease_ttl_secs),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!("{key} must be positive")));
        }
    }

    if config.webhook.freshness_window_secs == 0 {
        errors.push(ConfigError::validation(
            "webhook.freshness_window_secs must be positive",
        ));
    }

    if let Err(e) = config.dispatch.default_business_hours.tz() {
        errors.push(ConfigError::validation(format!(
            "dispatch.default_business_hours: {e}"
        )));
    }

    if config.health.enabled
        && (config.health.check_from.is_none() || config.health.check_to.is_none())
    {
        errors.push(ConfigError::validation(
            "health.enabled requires both health.check_from and health.check_to",
        ));
    }

    if let Some(email) = &config.alert.email
        && email.to.is_empty()
    {
        errors.push(ConfigError::validation(
            "alert.email.to must list at least one recipient",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn http_url_rest(raw: &str) -> Option<&str> {
    raw.strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"))
        .filter(|rest| !rest.is_empty())
}
