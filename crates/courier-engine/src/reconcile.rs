// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backfill from the provider's activity feed.
//!
//! Webhooks are best-effort; the feed is the source of truth. Every record
//! goes through [`Ingestor::apply_remote`], so a record seen both ways is
//! stored once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_config::model::ReconciliationConfig;
use courier_core::types::{Alert, AlertKind, RemoteActivity};
use courier_core::{AlertSink, Clock, CourierError, MessagingProvider, StorageAdapter};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::ingest::{Ingestor, ReconcileOutcome};
use crate::retry::add_std;

/// Checkpoint row holding the newest fully reconciled instant.
pub const RECONCILIATION_CHECKPOINT: &str = "reconciliation";

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationStats {
    pub since: Option<DateTime<Utc>>,
    pub pages: u32,
    pub fetched: u64,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
}

pub struct ReconciliationService {
    store: Arc<dyn StorageAdapter>,
    provider: Arc<dyn MessagingProvider>,
    ingestor: Arc<Ingestor>,
    clock: Arc<dyn Clock>,
    alerts: Arc<dyn AlertSink>,
    config: ReconciliationConfig,
}

impl ReconciliationService {
    pub fn new(
        store: Arc<dyn StorageAdapter>,
        provider: Arc<dyn MessagingProvider>,
        ingestor: Arc<Ingestor>,
        clock: Arc<dyn Clock>,
        alerts: Arc<dyn AlertSink>,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            store,
            provider,
            ingestor,
            clock,
            alerts,
            config,
        }
    }

    /// The configured overlap.
    pub fn default_lookback(&self) -> Duration {
        Duration::from_secs(self.config.lookback_secs)
    }

    /// Pages the feed from `checkpoint - lookback` (or the initial window on
    /// the first run) and applies every record.
    ///
    /// The feed is requested oldest first, and the checkpoint advances after
    /// each fully processed page. A page that breaks that order (a record
    /// older than one already seen) rewinds the checkpoint to where this run
    /// started and holds it there until the feed is exhausted.
    ///
    /// A failing page stops the run, leaves the checkpoint at the last fully
    /// processed page and raises a pipeline alert.
    pub async fn run(&self, lookback: Duration) -> Result<ReconciliationStats, CourierError> {
        let started = self.clock.now();
        let checkpoint = self.store.get_checkpoint(RECONCILIATION_CHECKPOINT).await?;
        let since = match checkpoint {
            Some(cp) => sub_std(cp, lookback),
            None => sub_std(started, Duration::from_secs(self.config.initial_lookback_secs)),
        };
        // Where the next run must start to re-cover this whole window.
        let floor = checkpoint.unwrap_or_else(|| add_std(since, lookback));
        info!(%since, checkpoint = ?checkpoint, "reconciliation started");

        let mut stats = ReconciliationStats {
            since: Some(since),
            ..ReconciliationStats::default()
        };
        let mut high_water = checkpoint;
        let mut newest_seen: Option<DateTime<Utc>> = None;
        let mut ordered = true;
        let mut cursor: Option<String> = None;

        loop {
            let page = match self.provider.list_activities(since, cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => return Err(self.fail(&stats, "fetching feed page", e).await),
            };
            stats.pages += 1;

            if ordered && !is_chronological(&page.data, newest_seen) {
                ordered = false;
                warn!(page = stats.pages, "activity feed is not oldest-first, holding checkpoint for this run");
                if high_water != checkpoint {
                    let rewound = high_water.map_or(floor, |hw| hw.min(floor));
                    self.store
                        .set_checkpoint(RECONCILIATION_CHECKPOINT, rewound, self.clock.now())
                        .await?;
                    high_water = Some(rewound);
                }
            }

            let newest = page.data.iter().map(|a| a.created_at).max();
            for record in page.data {
                stats.fetched += 1;
                let external_id = record.id.clone();
                match self.ingestor.apply_remote(record).await {
                    Ok(ReconcileOutcome::Inserted) => stats.inserted += 1,
                    Ok(ReconcileOutcome::Updated) => stats.updated += 1,
                    Ok(ReconcileOutcome::Unchanged) => stats.unchanged += 1,
                    Err(e) => {
                        let context = format!("applying {external_id}");
                        return Err(self.fail(&stats, &context, e).await);
                    }
                }
            }

            if let Some(newest) = newest {
                newest_seen = Some(newest_seen.map_or(newest, |seen| seen.max(newest)));
                let next = high_water.map_or(newest, |hw| hw.max(newest));
                if ordered && Some(next) != high_water {
                    self.store
                        .set_checkpoint(RECONCILIATION_CHECKPOINT, next, self.clock.now())
                        .await?;
                    high_water = Some(next);
                }
            }
            debug!(page = stats.pages, fetched = stats.fetched, "feed page reconciled");

            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
            let delay = Duration::from_millis(self.config.page_delay_ms);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        let final_checkpoint = high_water.map_or(started, |hw| hw.max(started));
        self.store
            .set_checkpoint(RECONCILIATION_CHECKPOINT, final_checkpoint, self.clock.now())
            .await?;

        courier_prometheus::record_reconciled("inserted", stats.inserted);
        courier_prometheus::record_reconciled("updated", stats.updated);
        courier_prometheus::record_reconciled("unchanged", stats.unchanged);
        info!(
            pages = stats.pages,
            fetched = stats.fetched,
            inserted = stats.inserted,
            updated = stats.updated,
            checkpoint = %final_checkpoint,
            "reconciliation finished"
        );
        Ok(stats)
    }

    async fn fail(
        &self,
        stats: &ReconciliationStats,
        context: &str,
        cause: CourierError,
    ) -> CourierError {
        error!(page = stats.pages + 1, error = %cause, "reconciliation failed while {context}");
        let alert = Alert {
            kind: AlertKind::ReconciliationFailed,
            subject: "reconciliation failed".into(),
            detail: format!(
                "{context} after {} page(s), {} record(s): {cause}",
                stats.pages, stats.fetched
            ),
            raised_at: self.clock.now(),
        };
        if let Err(e) = self.alerts.send_alert(&alert).await {
            error!(error = %e, "failed to deliver reconciliation alert");
        }
        cause
    }
}

/// Whether `records` are oldest first and none predates `newest_seen`.
fn is_chronological(records: &[RemoteActivity], newest_seen: Option<DateTime<Utc>>) -> bool {
    let mut previous = newest_seen;
    for record in records {
        if previous.is_some_and(|p| record.created_at < p) {
            return false;
        }
        previous = Some(record.created_at);
    }
    true
}

fn sub_std(at: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|d| at.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::types::{ActivityKind, ActivityStatus, Direction};

    fn at(minute: u32) -> RemoteActivity {
        RemoteActivity {
            id: format!("msg_{minute}"),
            direction: Direction::Inbound,
            kind: ActivityKind::Message,
            from: "+15550001111".into(),
            to: "+15550009999".into(),
            body: Some("hi".into()),
            media_urls: vec![],
            status: ActivityStatus::Received,
            created_at: format!("2026-03-02T10:{minute:02}:00Z").parse().unwrap(),
        }
    }

    #[test]
    fn oldest_first_pages_are_chronological() {
        assert!(is_chronological(&[], None));
        assert!(is_chronological(&[at(1), at(1), at(5)], None));
        assert!(is_chronological(&[at(5), at(6)], Some(at(5).created_at)));
    }

    #[test]
    fn newer_first_or_older_than_seen_is_not() {
        assert!(!is_chronological(&[at(5), at(1)], None));
        assert!(!is_chronological(&[at(4)], Some(at(5).created_at)));
    }
}
