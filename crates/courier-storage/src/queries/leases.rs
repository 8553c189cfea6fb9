// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named leases used as cross-process mutexes for tasks and campaigns.

use chrono::{DateTime, Utc};
use courier_core::{CourierError, format_ts};
use rusqlite::params;

use crate::database::Database;

/// Take `name` for `holder` until `expires_at`.
///
/// Succeeds when the lease is free or the previous holder's lease expired at
/// or before `now`. A live lease is never stolen, even by the same holder.
pub async fn try_acquire_lease(
    db: &Database,
    name: &str,
    holder: &str,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<bool, CourierError> {
    let name = name.to_string();
    let holder = holder.to_string();
    let now = format_ts(now);
    let expires_at = format_ts(expires_at);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "INSERT INTO task_leases (name, holder, acquired_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name) DO UPDATE
                   SET holder = excluded.holder,
                       acquired_at = excluded.acquired_at,
                       expires_at = excluded.expires_at
                   WHERE task_leases.expires_at <= excluded.acquired_at",
                params![name, holder, now, expires_at],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Release `name` if `holder` still owns it.
pub async fn release_lease(db: &Database, name: &str, holder: &str) -> Result<(), CourierError> {
    let name = name.to_string();
    let holder = holder.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM task_leases WHERE name = ?1 AND holder = ?2",
                params![name, holder],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::parse_ts;
    use tempfile::tempdir;

    #[tokio::test]
    async fn lease_excludes_until_expiry_or_release() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        let t0 = parse_ts("2026-03-02T10:00:00.000Z").unwrap();
        let t1 = parse_ts("2026-03-02T10:15:00.000Z").unwrap();
        let t2 = parse_ts("2026-03-02T10:20:00.000Z").unwrap();

        assert!(try_acquire_lease(&db, "task:dispatch", "a", t0, t1).await.unwrap());
        assert!(!try_acquire_lease(&db, "task:dispatch", "b", t0, t1).await.unwrap());
        assert!(!try_acquire_lease(&db, "task:dispatch", "a", t0, t1).await.unwrap());

        // Expired: anyone may take it.
        assert!(try_acquire_lease(&db, "task:dispatch", "b", t1, t2).await.unwrap());

        // Release by a non-holder is a no-op.
        release_lease(&db, "task:dispatch", "a").await.unwrap();
        assert!(!try_acquire_lease(&db, "task:dispatch", "a", t1, t2).await.unwrap());
        release_lease(&db, "task:dispatch", "b").await.unwrap();
        assert!(try_acquire_lease(&db, "task:dispatch", "a", t1, t2).await.unwrap());
    }
}
