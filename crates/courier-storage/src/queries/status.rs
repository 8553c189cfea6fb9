// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregate counts per status category for the admin dashboard.

use std::collections::BTreeMap;

use courier_core::CourierError;
use courier_core::types::StatusCounts;

use crate::database::Database;

fn grouped(conn: &rusqlite::Connection, sql: &str) -> rusqlite::Result<BTreeMap<String, i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

fn scalar(conn: &rusqlite::Connection, sql: &str) -> rusqlite::Result<i64> {
    conn.query_row(sql, [], |row| row.get(0))
}

pub async fn status_counts(db: &Database) -> Result<StatusCounts, CourierError> {
    db.connection()
        .call(|conn| {
            Ok(StatusCounts {
                campaigns: grouped(conn, "SELECT status, COUNT(*) FROM campaigns GROUP BY status")?,
                members: grouped(
                    conn,
                    "SELECT status, COUNT(*) FROM campaign_members GROUP BY status",
                )?,
                retry_pending: scalar(
                    conn,
                    "SELECT COUNT(*) FROM retry_queue WHERE status = 'pending'",
                )?,
                dead_letters: scalar(
                    conn,
                    "SELECT COUNT(*) FROM retry_queue WHERE status = 'dead_letter'",
                )?,
                unprocessed_events: scalar(
                    conn,
                    "SELECT COUNT(*) FROM external_events WHERE processed = 0",
                )?,
                opted_out_contacts: scalar(
                    conn,
                    "SELECT COUNT(*) FROM compliance_flags WHERE expired_at IS NULL",
                )?,
                failed_health_checks: scalar(
                    conn,
                    "SELECT COUNT(*) FROM health_checks WHERE passed = 0",
                )?,
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}
