// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synthetic check results.

use courier_core::types::HealthCheckRecord;
use courier_core::{CourierError, format_ts};
use rusqlite::params;

use crate::database::Database;
use crate::models::ts_col;

pub async fn insert_health_check(db: &Database, record: &HealthCheckRecord) -> Result<i64, CourierError> {
    let r = record.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO health_checks (outbound_external_id, passed, latency_ms, detail, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    r.outbound_external_id,
                    r.passed,
                    r.latency_ms,
                    r.detail,
                    format_ts(r.created_at)
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Newest first.
pub async fn recent_health_checks(
    db: &Database,
    limit: u32,
) -> Result<Vec<HealthCheckRecord>, CourierError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT outbound_external_id, passed, latency_ms, detail, created_at
                 FROM health_checks ORDER BY created_at DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(HealthCheckRecord {
                    outbound_external_id: row.get(0)?,
                    passed: row.get(1)?,
                    latency_ms: row.get(2)?,
                    detail: row.get(3)?,
                    created_at: ts_col(row, 4)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
