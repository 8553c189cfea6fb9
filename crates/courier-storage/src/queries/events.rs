// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! External event log: dedup keys for webhook and reconciliation intake.

use chrono::{DateTime, Utc};
use courier_core::types::{Activity, ExternalEvent, RecordOutcome};
use courier_core::{CourierError, format_ts};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{enum_col, opt_ts_col, ts_col};
use crate::queries::activities::insert_activity_on;

pub async fn get_event(db: &Database, external_id: &str) -> Result<Option<ExternalEvent>, CourierError> {
    let external_id = external_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT external_id, event_type, raw_payload, received_at, processed, error, processed_at
                 FROM external_events WHERE external_id = ?1",
                params![external_id],
                |row| {
                    Ok(ExternalEvent {
                        external_id: row.get(0)?,
                        event_type: enum_col(row, 1)?,
                        raw_payload: row.get(2)?,
                        received_at: ts_col(row, 3)?,
                        processed: row.get(4)?,
                        error: row.get(5)?,
                        processed_at: opt_ts_col(row, 6)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert the event and its activity in one transaction, ignoring rows that exist.
pub async fn record_event(
    db: &Database,
    event: &ExternalEvent,
    activity: Option<&Activity>,
) -> Result<RecordOutcome, CourierError> {
    let event = event.clone();
    let activity = activity.cloned();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let event_inserted = tx.execute(
                "INSERT OR IGNORE INTO external_events
                     (external_id, event_type, raw_payload, received_at, processed, error, processed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.external_id,
                    event.event_type.to_string(),
                    event.raw_payload,
                    format_ts(event.received_at),
                    event.processed,
                    event.error,
                    event.processed_at.map(format_ts),
                ],
            )? == 1;
            let activity_inserted = match &activity {
                Some(a) => insert_activity_on(&tx, a)?,
                None => false,
            };
            tx.commit()?;
            Ok(RecordOutcome {
                event_inserted,
                activity_inserted,
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn mark_event_processed(
    db: &Database,
    external_id: &str,
    at: DateTime<Utc>,
) -> Result<(), CourierError> {
    let external_id = external_id.to_string();
    let at = format_ts(at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE external_events SET processed = 1, processed_at = ?1, error = NULL
                 WHERE external_id = ?2",
                params![at, external_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record why processing failed. Processed events are left alone.
pub async fn mark_event_failed(
    db: &Database,
    external_id: &str,
    error: &str,
) -> Result<(), CourierError> {
    let external_id = external_id.to_string();
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE external_events SET error = ?1 WHERE external_id = ?2 AND processed = 0",
                params![error, external_id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Move processed events received before `before` into `external_events_archive`.
pub async fn archive_events(
    db: &Database,
    before: DateTime<Utc>,
    at: DateTime<Utc>,
) -> Result<u64, CourierError> {
    let before = format_ts(before);
    let archived_at = format_ts(at);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO external_events_archive
                     (external_id, event_type, raw_payload, received_at, processed, error,
                      processed_at, archived_at)
                 SELECT external_id, event_type, raw_payload, received_at, processed, error,
                        processed_at, ?2
                 FROM external_events WHERE processed = 1 AND received_at < ?1",
                params![before, archived_at],
            )?;
            let moved = tx.execute(
                "DELETE FROM external_events WHERE processed = 1 AND received_at < ?1",
                params![before],
            )?;
            tx.commit()?;
            Ok(moved as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::parse_ts;
    use courier_core::types::EventType;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn event(id: &str, received_at: &str) -> ExternalEvent {
        ExternalEvent {
            external_id: id.into(),
            event_type: EventType::MessageReceived,
            raw_payload: r#"{"type":"message.received"}"#.into(),
            received_at: parse_ts(received_at).unwrap(),
            processed: false,
            error: None,
            processed_at: None,
        }
    }

    #[tokio::test]
    async fn second_record_is_ignored() {
        let (db, _dir) = setup_db().await;
        let e = event("msg_1", "2026-03-02T10:00:00.000Z");
        let first = record_event(&db, &e, None).await.unwrap();
        let second = record_event(&db, &e, None).await.unwrap();
        assert!(first.event_inserted);
        assert!(!second.event_inserted);
    }

    #[tokio::test]
    async fn processed_flag_clears_error() {
        let (db, _dir) = setup_db().await;
        let e = event("msg_2", "2026-03-02T10:00:00.000Z");
        record_event(&db, &e, None).await.unwrap();

        mark_event_failed(&db, "msg_2", "database is locked").await.unwrap();
        let failed = get_event(&db, "msg_2").await.unwrap().unwrap();
        assert_eq!(failed.error.as_deref(), Some("database is locked"));
        assert!(!failed.processed);

        let at = parse_ts("2026-03-02T10:05:00.000Z").unwrap();
        mark_event_processed(&db, "msg_2", at).await.unwrap();
        let done = get_event(&db, "msg_2").await.unwrap().unwrap();
        assert!(done.processed);
        assert!(done.error.is_none());
        assert_eq!(done.processed_at, Some(at));
    }

    #[tokio::test]
    async fn archive_moves_only_old_processed_events() {
        let (db, _dir) = setup_db().await;
        for (id, at) in [
            ("old_done", "2026-01-01T00:00:00.000Z"),
            ("old_open", "2026-01-01T00:00:00.000Z"),
            ("new_done", "2026-03-01T00:00:00.000Z"),
        ] {
            record_event(&db, &event(id, at), None).await.unwrap();
        }
        let at = parse_ts("2026-03-01T00:00:00.000Z").unwrap();
        mark_event_processed(&db, "old_done", at).await.unwrap();
        mark_event_processed(&db, "new_done", at).await.unwrap();

        let cutoff = parse_ts("2026-02-01T00:00:00.000Z").unwrap();
        assert_eq!(archive_events(&db, cutoff, at).await.unwrap(), 1);
        assert!(get_event(&db, "old_done").await.unwrap().is_none());
        assert!(get_event(&db, "old_open").await.unwrap().is_some());
        assert!(get_event(&db, "new_done").await.unwrap().is_some());
    }
}
