// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable retry queue with atomic claims and dead-lettering.

use chrono::{DateTime, Utc};
use courier_core::types::{NewRetryEntry, RetryEntry, RetryItemType};
use courier_core::{CourierError, format_ts};
use rusqlite::{OptionalExtension, Row, Transaction, params};

use crate::database::Database;
use crate::models::{enum_col, opt_ts_col, ts_col, u32_col};

const RETRY_COLUMNS: &str = "id, item_type, item_ref, payload, attempt_count, max_attempts, \
     next_eligible_at, last_error, claimed_until, status, created_at, updated_at";

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<RetryEntry> {
    Ok(RetryEntry {
        id: row.get(0)?,
        item_type: enum_col(row, 1)?,
        item_ref: row.get(2)?,
        payload: row.get(3)?,
        attempt_count: u32_col(row, 4)?,
        max_attempts: u32_col(row, 5)?,
        next_eligible_at: ts_col(row, 6)?,
        last_error: row.get(7)?,
        claimed_until: opt_ts_col(row, 8)?,
        status: enum_col(row, 9)?,
        created_at: ts_col(row, 10)?,
        updated_at: ts_col(row, 11)?,
    })
}

/// Open an entry, or refresh the error on the entry already open for the same item.
pub async fn upsert_retry(db: &Database, entry: &NewRetryEntry) -> Result<i64, CourierError> {
    let e = entry.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let id = upsert_retry_tx(&tx, &e)?;
            tx.commit()?;
            Ok(id)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// [`upsert_retry`] inside a caller's transaction.
pub(crate) fn upsert_retry_tx(tx: &Transaction<'_>, e: &NewRetryEntry) -> rusqlite::Result<i64> {
    let item_type = e.item_type.to_string();
    let created_at = format_ts(e.created_at);
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM retry_queue
             WHERE item_type = ?1 AND item_ref = ?2 AND status = 'pending'",
            params![item_type, e.item_ref],
            |row| row.get(0),
        )
        .optional()?;
    match existing {
        Some(id) => {
            tx.execute(
                "UPDATE retry_queue SET last_error = ?1, updated_at = ?2 WHERE id = ?3",
                params![e.last_error, created_at, id],
            )?;
            Ok(id)
        }
        None => {
            tx.execute(
                "INSERT INTO retry_queue (item_type, item_ref, payload, attempt_count,
                     max_attempts, next_eligible_at, last_error, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, 'pending', ?7, ?7)",
                params![
                    item_type,
                    e.item_ref,
                    e.payload,
                    e.max_attempts,
                    format_ts(e.next_eligible_at),
                    e.last_error,
                    created_at,
                ],
            )?;
            Ok(tx.last_insert_rowid())
        }
    }
}

pub async fn find_open_retry(
    db: &Database,
    item_type: RetryItemType,
    item_ref: &str,
) -> Result<Option<RetryEntry>, CourierError> {
    let item_ref = item_ref.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {RETRY_COLUMNS} FROM retry_queue
                     WHERE item_type = ?1 AND item_ref = ?2 AND status = 'pending'"
                ),
                params![item_type.to_string(), item_ref],
                row_to_entry,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn find_dead_letter(
    db: &Database,
    item_type: RetryItemType,
    item_ref: &str,
) -> Result<Option<RetryEntry>, CourierError> {
    let item_ref = item_ref.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {RETRY_COLUMNS} FROM retry_queue
                     WHERE item_type = ?1 AND item_ref = ?2 AND status = 'dead_letter'
                     ORDER BY id DESC LIMIT 1"
                ),
                params![item_type.to_string(), item_ref],
                row_to_entry,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Claim up to `limit` due entries until `claim_until`.
///
/// Each claim is a conditional update that only succeeds while the entry is
/// unclaimed or its previous claim has lapsed; entries whose update changes
/// no row belong to another worker and are not returned.
pub async fn claim_due_retries(
    db: &Database,
    now: DateTime<Utc>,
    claim_until: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<RetryEntry>, CourierError> {
    let now = format_ts(now);
    let claim_until = format_ts(claim_until);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let candidates: Vec<i64> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM retry_queue
                     WHERE status = 'pending' AND next_eligible_at <= ?1
                       AND (claimed_until IS NULL OR claimed_until <= ?1)
                     ORDER BY next_eligible_at ASC, id ASC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![now, limit], |row| row.get(0))?;
                rows.collect::<Result<_, _>>()?
            };

            let mut claimed = Vec::with_capacity(candidates.len());
            for id in candidates {
                let won = tx.execute(
                    "UPDATE retry_queue SET claimed_until = ?1
                     WHERE id = ?2 AND status = 'pending'
                       AND (claimed_until IS NULL OR claimed_until <= ?3)",
                    params![claim_until, id, now],
                )? == 1;
                if won {
                    claimed.push(tx.query_row(
                        &format!("SELECT {RETRY_COLUMNS} FROM retry_queue WHERE id = ?1"),
                        params![id],
                        row_to_entry,
                    )?);
                }
            }
            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Release the claim and schedule the next attempt.
pub async fn reschedule_retry(
    db: &Database,
    id: i64,
    attempt_count: u32,
    next_eligible_at: DateTime<Utc>,
    error: &str,
    at: DateTime<Utc>,
) -> Result<(), CourierError> {
    let error = error.to_string();
    let next = format_ts(next_eligible_at);
    let at = format_ts(at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE retry_queue
                 SET attempt_count = ?1, next_eligible_at = ?2, last_error = ?3,
                     claimed_until = NULL, updated_at = ?4
                 WHERE id = ?5",
                params![attempt_count, next, error, at, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Park the entry in `dead_letter`. It is kept for operators, never retried.
pub async fn dead_letter_retry(
    db: &Database,
    id: i64,
    attempt_count: u32,
    error: &str,
    at: DateTime<Utc>,
) -> Result<(), CourierError> {
    let error = error.to_string();
    let at = format_ts(at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE retry_queue
                 SET status = 'dead_letter', attempt_count = ?1, last_error = ?2,
                     claimed_until = NULL, updated_at = ?3
                 WHERE id = ?4",
                params![attempt_count, error, at, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn delete_retry(db: &Database, id: i64) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM retry_queue WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Most recently dead-lettered entries first.
pub async fn list_dead_letters(db: &Database, limit: u32) -> Result<Vec<RetryEntry>, CourierError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RETRY_COLUMNS} FROM retry_queue
                 WHERE status = 'dead_letter'
                 ORDER BY updated_at DESC, id DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], row_to_entry)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::parse_ts;
    use courier_core::types::RetryStatus;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn new_entry(item_ref: &str, eligible: &str) -> NewRetryEntry {
        NewRetryEntry {
            item_type: RetryItemType::IngestEvent,
            item_ref: item_ref.into(),
            payload: Some("{}".into()),
            max_attempts: 5,
            next_eligible_at: parse_ts(eligible).unwrap(),
            last_error: "database is locked".into(),
            created_at: parse_ts("2026-03-02T10:00:00.000Z").unwrap(),
        }
    }

    #[tokio::test]
    async fn at_most_one_open_entry_per_item() {
        let (db, _dir) = setup_db().await;
        let a = upsert_retry(&db, &new_entry("msg_1", "2026-03-02T10:01:00.000Z")).await.unwrap();
        let mut again = new_entry("msg_1", "2026-03-02T10:01:00.000Z");
        again.last_error = "disk full".into();
        let b = upsert_retry(&db, &again).await.unwrap();
        assert_eq!(a, b);

        let open = find_open_retry(&db, RetryItemType::IngestEvent, "msg_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(open.last_error.as_deref(), Some("disk full"));
        assert_eq!(open.attempt_count, 0);
        assert!(
            find_open_retry(&db, RetryItemType::CampaignSend, "msg_1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn claims_are_exclusive_until_they_lapse() {
        let (db, _dir) = setup_db().await;
        upsert_retry(&db, &new_entry("msg_1", "2026-03-02T10:01:00.000Z")).await.unwrap();
        upsert_retry(&db, &new_entry("msg_2", "2026-03-02T11:00:00.000Z")).await.unwrap();

        let now = parse_ts("2026-03-02T10:02:00.000Z").unwrap();
        let until = parse_ts("2026-03-02T10:04:00.000Z").unwrap();
        let first = claim_due_retries(&db, now, until, 10).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].item_ref, "msg_1");
        assert_eq!(first[0].claimed_until, Some(until));

        let second = claim_due_retries(&db, now, until, 10).await.unwrap();
        assert!(second.is_empty());

        let later = parse_ts("2026-03-02T10:05:00.000Z").unwrap();
        let third = claim_due_retries(&db, later, later, 10).await.unwrap();
        assert_eq!(third.len(), 1);
    }

    #[tokio::test]
    async fn reschedule_and_dead_letter() {
        let (db, _dir) = setup_db().await;
        let id = upsert_retry(&db, &new_entry("msg_1", "2026-03-02T10:01:00.000Z")).await.unwrap();
        let at = parse_ts("2026-03-02T10:02:00.000Z").unwrap();
        let next = parse_ts("2026-03-02T10:04:00.000Z").unwrap();

        reschedule_retry(&db, id, 1, next, "still locked", at).await.unwrap();
        let open = find_open_retry(&db, RetryItemType::IngestEvent, "msg_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(open.attempt_count, 1);
        assert_eq!(open.next_eligible_at, next);
        assert!(open.claimed_until.is_none());

        assert!(
            find_dead_letter(&db, RetryItemType::IngestEvent, "msg_1")
                .await
                .unwrap()
                .is_none()
        );
        dead_letter_retry(&db, id, 5, "gave up", at).await.unwrap();
        assert!(
            find_open_retry(&db, RetryItemType::IngestEvent, "msg_1")
                .await
                .unwrap()
                .is_none()
        );
        let parked = find_dead_letter(&db, RetryItemType::IngestEvent, "msg_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(parked.id, id);
        assert_eq!(parked.last_error.as_deref(), Some("gave up"));
        let dead = list_dead_letters(&db, 10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].status, RetryStatus::DeadLetter);

        // A new failure for the same item opens a fresh entry beside the dead letter.
        let fresh = upsert_retry(&db, &new_entry("msg_1", "2026-03-02T10:01:00.000Z")).await.unwrap();
        assert_ne!(fresh, id);

        delete_retry(&db, fresh).await.unwrap();
        assert!(
            find_open_retry(&db, RetryItemType::IngestEvent, "msg_1")
                .await
                .unwrap()
                .is_none()
        );
    }
}
