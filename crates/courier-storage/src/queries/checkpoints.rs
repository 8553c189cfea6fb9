// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named timestamp checkpoints (reconciliation progress).

use chrono::{DateTime, Utc};
use courier_core::{CourierError, format_ts};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::ts_col;

pub async fn get_checkpoint(db: &Database, name: &str) -> Result<Option<DateTime<Utc>>, CourierError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT value FROM checkpoints WHERE name = ?1",
                params![name],
                |row| ts_col(row, 0),
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn set_checkpoint(
    db: &Database,
    name: &str,
    value: DateTime<Utc>,
    at: DateTime<Utc>,
) -> Result<(), CourierError> {
    let name = name.to_string();
    let value = format_ts(value);
    let at = format_ts(at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO checkpoints (name, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![name, value, at],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
