// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Activity records: insert-if-absent plus forward-only status changes.

use chrono::{DateTime, Utc};
use courier_core::types::{Activity, ActivityStatus};
use courier_core::{CourierError, format_ts};
use rusqlite::{OptionalExtension, Row, params};

use crate::database::Database;
use crate::models::{enum_col, json_col, to_json, ts_col};

pub(crate) const ACTIVITY_COLUMNS: &str = "external_id, direction, kind, contact_identity, \
     counterpart_identity, body, media_urls, status, created_at, recorded_at";

pub(crate) fn row_to_activity(row: &Row<'_>) -> rusqlite::Result<Activity> {
    Ok(Activity {
        external_id: row.get(0)?,
        direction: enum_col(row, 1)?,
        kind: enum_col(row, 2)?,
        contact_identity: row.get(3)?,
        counterpart_identity: row.get(4)?,
        body: row.get(5)?,
        media_urls: json_col(row, 6)?,
        status: enum_col(row, 7)?,
        created_at: ts_col(row, 8)?,
        recorded_at: ts_col(row, 9)?,
    })
}

/// Insert an activity unless one with the same external id exists.
///
/// Runs on the caller's connection so it can join an open transaction.
pub(crate) fn insert_activity_on(
    conn: &rusqlite::Connection,
    activity: &Activity,
) -> rusqlite::Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO activities (external_id, direction, kind, contact_identity,
             counterpart_identity, body, media_urls, status, created_at, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            activity.external_id,
            activity.direction.to_string(),
            activity.kind.to_string(),
            activity.contact_identity,
            activity.counterpart_identity,
            activity.body,
            to_json(&activity.media_urls)?,
            activity.status.to_string(),
            format_ts(activity.created_at),
            format_ts(activity.recorded_at),
        ],
    )?;
    Ok(inserted == 1)
}

/// Fetch one activity by provider id.
pub async fn get_activity(db: &Database, external_id: &str) -> Result<Option<Activity>, CourierError> {
    let external_id = external_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE external_id = ?1"),
                params![external_id],
                row_to_activity,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn activity_count(db: &Database) -> Result<i64, CourierError> {
    db.connection()
        .call(|conn| conn.query_row("SELECT COUNT(*) FROM activities", [], |row| row.get(0)))
        .await
        .map_err(crate::database::map_tr_err)
}

/// Move an activity forward to `status`. Returns `false` when the stored
/// status is terminal, already at or past `status`, or the row is missing.
pub async fn advance_activity_status(
    db: &Database,
    external_id: &str,
    status: ActivityStatus,
) -> Result<bool, CourierError> {
    let external_id = external_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let current: Option<String> = tx
                .query_row(
                    "SELECT status FROM activities WHERE external_id = ?1",
                    params![external_id],
                    |row| row.get(0),
                )
                .optional()?;
            let allowed = current
                .and_then(|s| s.parse::<ActivityStatus>().ok())
                .is_some_and(|cur| cur.can_advance_to(status));
            if !allowed {
                return Ok(false);
            }
            tx.execute(
                "UPDATE activities SET status = ?1 WHERE external_id = ?2",
                params![status.to_string(), external_id],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// First inbound message from `contact` with exactly `body`, recorded at or after `since`.
pub async fn find_inbound_activity(
    db: &Database,
    contact: &str,
    body: &str,
    since: DateTime<Utc>,
) -> Result<Option<Activity>, CourierError> {
    let contact = contact.to_string();
    let body = body.to_string();
    let since = format_ts(since);
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {ACTIVITY_COLUMNS} FROM activities
                     WHERE direction = 'inbound' AND kind = 'message'
                       AND contact_identity = ?1 AND body = ?2 AND recorded_at >= ?3
                     ORDER BY recorded_at ASC LIMIT 1"
                ),
                params![contact, body, since],
                row_to_activity,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::parse_ts;
    use courier_core::types::{ActivityKind, Direction};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn outbound(id: &str, status: ActivityStatus) -> Activity {
        let at = parse_ts("2026-03-02T10:00:00.000Z").unwrap();
        Activity {
            external_id: id.into(),
            direction: Direction::Outbound,
            kind: ActivityKind::Message,
            contact_identity: "+15550001111".into(),
            counterpart_identity: "+15559990000".into(),
            body: Some("Spring promo".into()),
            media_urls: vec!["https://cdn.example/a.png".into()],
            status,
            created_at: at,
            recorded_at: at,
        }
    }

    async fn insert(db: &Database, activity: Activity) -> bool {
        db.connection()
            .call(move |conn| insert_activity_on(conn, &activity))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn insert_is_first_writer_wins() {
        let (db, _dir) = setup_db().await;
        assert!(insert(&db, outbound("msg_1", ActivityStatus::Sent)).await);

        let mut changed = outbound("msg_1", ActivityStatus::Failed);
        changed.body = Some("different".into());
        assert!(!insert(&db, changed).await);

        let stored = get_activity(&db, "msg_1").await.unwrap().unwrap();
        assert_eq!(stored.status, ActivityStatus::Sent);
        assert_eq!(stored.body.as_deref(), Some("Spring promo"));
        assert_eq!(stored.media_urls.len(), 1);
        assert_eq!(activity_count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn status_advances_once_then_sticks() {
        let (db, _dir) = setup_db().await;
        insert(&db, outbound("msg_2", ActivityStatus::Sent)).await;

        assert!(advance_activity_status(&db, "msg_2", ActivityStatus::Delivered).await.unwrap());
        assert!(!advance_activity_status(&db, "msg_2", ActivityStatus::Failed).await.unwrap());
        assert!(!advance_activity_status(&db, "missing", ActivityStatus::Delivered).await.unwrap());

        let stored = get_activity(&db, "msg_2").await.unwrap().unwrap();
        assert_eq!(stored.status, ActivityStatus::Delivered);
    }

    #[tokio::test]
    async fn finds_inbound_check_by_body() {
        let (db, _dir) = setup_db().await;
        let mut inbound = outbound("in_1", ActivityStatus::Received);
        inbound.direction = Direction::Inbound;
        inbound.body = Some("courier health check abc".into());
        insert(&db, inbound).await;

        let since = parse_ts("2026-03-02T09:59:00.000Z").unwrap();
        let found = find_inbound_activity(&db, "+15550001111", "courier health check abc", since)
            .await
            .unwrap();
        assert_eq!(found.unwrap().external_id, "in_1");

        let later = parse_ts("2026-03-02T10:01:00.000Z").unwrap();
        let missing = find_inbound_activity(&db, "+15550001111", "courier health check abc", later)
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
