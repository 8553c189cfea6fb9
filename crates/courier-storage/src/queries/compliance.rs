// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opt-out flags with an insert/expire lifecycle.

use chrono::{DateTime, Utc};
use courier_core::types::{ContactComplianceFlag, NewRetryEntry};
use courier_core::{CourierError, format_ts};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{opt_ts_col, ts_col};
use crate::queries::retry::upsert_retry_tx;

/// The active (unexpired) opt-out for `contact`, if any.
pub async fn get_active_opt_out(
    db: &Database,
    contact: &str,
) -> Result<Option<ContactComplianceFlag>, CourierError> {
    let contact = contact.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT contact_identity, opted_out, opted_out_at, reason, expired_at
                 FROM compliance_flags
                 WHERE contact_identity = ?1 AND expired_at IS NULL",
                params![contact],
                |row| {
                    Ok(ContactComplianceFlag {
                        contact_identity: row.get(0)?,
                        opted_out: row.get(1)?,
                        opted_out_at: ts_col(row, 2)?,
                        reason: row.get(3)?,
                        expired_at: opt_ts_col(row, 4)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert an active opt-out. Returns `false` if one is already active.
///
/// `follow_up` is opened in the same transaction, and only when the flag was
/// actually inserted.
pub async fn insert_opt_out(
    db: &Database,
    contact: &str,
    reason: &str,
    at: DateTime<Utc>,
    follow_up: Option<&NewRetryEntry>,
) -> Result<bool, CourierError> {
    let contact = contact.to_string();
    let reason = reason.to_string();
    let at = format_ts(at);
    let follow_up = follow_up.cloned();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO compliance_flags
                     (contact_identity, opted_out, opted_out_at, reason)
                 VALUES (?1, 1, ?2, ?3)",
                params![contact, at, reason],
            )? == 1;
            if inserted && let Some(entry) = &follow_up {
                upsert_retry_tx(&tx, entry)?;
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Expire the active opt-out. Returns `false` if there was none.
///
/// `follow_up` is opened in the same transaction, and only when a flag was
/// actually expired.
pub async fn expire_opt_out(
    db: &Database,
    contact: &str,
    at: DateTime<Utc>,
    follow_up: Option<&NewRetryEntry>,
) -> Result<bool, CourierError> {
    let contact = contact.to_string();
    let at = format_ts(at);
    let follow_up = follow_up.cloned();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let expired = tx.execute(
                "UPDATE compliance_flags SET opted_out = 0, expired_at = ?1
                 WHERE contact_identity = ?2 AND expired_at IS NULL",
                params![at, contact],
            )? == 1;
            if expired && let Some(entry) = &follow_up {
                upsert_retry_tx(&tx, entry)?;
            }
            tx.commit()?;
            Ok(expired)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark `pending` members of active campaigns for `contact` as skipped.
/// Members already sent are never touched.
pub async fn skip_pending_members_for_contact(
    db: &Database,
    contact: &str,
) -> Result<u64, CourierError> {
    let contact = contact.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE campaign_members SET status = 'skipped_compliance'
                 WHERE contact_identity = ?1 AND status = 'pending'
                   AND campaign_id IN (SELECT id FROM campaigns WHERE status = 'active')",
                params![contact],
            )?;
            Ok(changed as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::retry::find_open_retry;
    use courier_core::parse_ts;
    use courier_core::types::RetryItemType;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn opt_out_lifecycle() {
        let (db, _dir) = setup_db().await;
        let contact = "+15550001111";
        let t1 = parse_ts("2026-03-02T10:00:00.000Z").unwrap();
        let t2 = parse_ts("2026-03-03T10:00:00.000Z").unwrap();

        assert!(get_active_opt_out(&db, contact).await.unwrap().is_none());
        assert!(insert_opt_out(&db, contact, "keyword:STOP", t1, None).await.unwrap());
        assert!(!insert_opt_out(&db, contact, "keyword:STOP", t2, None).await.unwrap());

        let flag = get_active_opt_out(&db, contact).await.unwrap().unwrap();
        assert!(flag.opted_out);
        assert_eq!(flag.opted_out_at, t1);

        assert!(expire_opt_out(&db, contact, t2, None).await.unwrap());
        assert!(!expire_opt_out(&db, contact, t2, None).await.unwrap());
        assert!(get_active_opt_out(&db, contact).await.unwrap().is_none());

        // A fresh opt-out after expiry opens a new row.
        assert!(insert_opt_out(&db, contact, "admin", t2, None).await.unwrap());
    }

    fn confirmation(item_ref: &str, at: DateTime<Utc>) -> NewRetryEntry {
        NewRetryEntry {
            item_type: RetryItemType::ConfirmationSend,
            item_ref: item_ref.into(),
            payload: Some("{}".into()),
            max_attempts: 5,
            next_eligible_at: at,
            last_error: "awaiting first send".into(),
            created_at: at,
        }
    }

    async fn is_open(db: &Database, item_ref: &str) -> bool {
        find_open_retry(db, RetryItemType::ConfirmationSend, item_ref)
            .await
            .unwrap()
            .is_some()
    }

    #[tokio::test]
    async fn follow_up_is_written_only_with_a_transition() {
        let (db, _dir) = setup_db().await;
        let contact = "+15550001111";
        let t1 = parse_ts("2026-03-02T10:00:00.000Z").unwrap();
        let t2 = parse_ts("2026-03-03T10:00:00.000Z").unwrap();

        let first = confirmation("out:1", t1);
        assert!(insert_opt_out(&db, contact, "keyword:STOP", t1, Some(&first)).await.unwrap());
        let repeat = confirmation("out:2", t2);
        assert!(!insert_opt_out(&db, contact, "keyword:STOP", t2, Some(&repeat)).await.unwrap());

        assert!(is_open(&db, "out:1").await);
        assert!(!is_open(&db, "out:2").await);

        let back_in = confirmation("in:1", t2);
        assert!(expire_opt_out(&db, contact, t2, Some(&back_in)).await.unwrap());
        let again = confirmation("in:2", t2);
        assert!(!expire_opt_out(&db, contact, t2, Some(&again)).await.unwrap());
        assert!(is_open(&db, "in:1").await);
        assert!(!is_open(&db, "in:2").await);
    }
}
