// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Moves old processed events into the archive table.

use std::sync::Arc;

use courier_config::model::ArchiveConfig;
use courier_core::{Clock, CourierError, StorageAdapter};
use tracing::info;

pub struct EventArchiver {
    store: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
    config: ArchiveConfig,
}

impl EventArchiver {
    pub fn new(store: Arc<dyn StorageAdapter>, clock: Arc<dyn Clock>, config: ArchiveConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Archives processed events older than `archive.retain_days`.
    pub async fn run(&self) -> Result<u64, CourierError> {
        let now = self.clock.now();
        let before = now - chrono::Duration::days(i64::from(self.config.retain_days));
        let moved = self.store.archive_events(before, now).await?;
        if moved > 0 {
            info!(moved, %before, "processed events archived");
        }
        Ok(moved)
    }
}
