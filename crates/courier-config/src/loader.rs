// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading.
//!
//! Lookup order: `/etc/courier/courier.toml`, then `~/.config/courier/courier.toml`,
//! then `./courier.toml`, then `COURIER_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CourierConfig;

/// Section names recognised in `COURIER_<SECTION>_<KEY>` variables.
///
/// `alert_email` must precede `alert` so the nested table wins.
const ENV_SECTIONS: &[&str] = &[
    "service",
    "storage",
    "provider",
    "webhook",
    "gateway",
    "compliance",
    "dispatch",
    "retry",
    "reconciliation",
    "health",
    "archive",
    "alert_email",
    "alert",
    "prometheus",
];

pub(crate) const SYSTEM_CONFIG_PATH: &str = "/etc/courier/courier.toml";
pub(crate) const LOCAL_CONFIG_PATH: &str = "courier.toml";

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("courier").join("courier.toml"))
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<CourierConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from an inline TOML document (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from an explicit file, still honouring env overrides.
pub fn load_config_from_path(path: &Path) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The un-extracted figment used by [`load_config`].
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Environment provider mapping `COURIER_DISPATCH_BATCH_SIZE` to `dispatch.batch_size`.
///
/// Only the section prefix is split; key names keep their underscores.
fn env_provider() -> Env {
    Env::prefixed("COURIER_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{}.{rest}", section.replace('_', "."));
        }
    }
    key.to_string()
}
