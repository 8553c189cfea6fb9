// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign rows and compare-and-set status transitions.

use chrono::{DateTime, Utc};
use courier_core::types::{Campaign, CampaignStatus};
use courier_core::{CourierError, format_ts};
use rusqlite::{OptionalExtension, Row, params};

use crate::database::Database;
use crate::models::{enum_col, json_col, to_json, ts_col};

const CAMPAIGN_COLUMNS: &str = "id, name, body, status, daily_cap, batch_size, business_hours, \
     last_dispatch_pointer, created_at, updated_at";

fn row_to_campaign(row: &Row<'_>) -> rusqlite::Result<Campaign> {
    let batch_size: Option<i64> = row.get(5)?;
    Ok(Campaign {
        id: row.get(0)?,
        name: row.get(1)?,
        body: row.get(2)?,
        status: enum_col(row, 3)?,
        daily_cap: crate::models::u32_col(row, 4)?,
        batch_size: batch_size.map(|b| b.max(0) as u32),
        business_hours: json_col(row, 6)?,
        last_dispatch_pointer: row.get(7)?,
        created_at: ts_col(row, 8)?,
        updated_at: ts_col(row, 9)?,
    })
}

pub async fn insert_campaign(db: &Database, campaign: &Campaign) -> Result<(), CourierError> {
    let c = campaign.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO campaigns (id, name, body, status, daily_cap, batch_size,
                     business_hours, last_dispatch_pointer, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    c.id,
                    c.name,
                    c.body,
                    c.status.to_string(),
                    c.daily_cap,
                    c.batch_size,
                    to_json(&c.business_hours)?,
                    c.last_dispatch_pointer,
                    format_ts(c.created_at),
                    format_ts(c.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_campaign(db: &Database, id: &str) -> Result<Option<Campaign>, CourierError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
                params![id],
                row_to_campaign,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All campaigns, optionally filtered by status, oldest first.
pub async fn list_campaigns(
    db: &Database,
    status: Option<CampaignStatus>,
) -> Result<Vec<Campaign>, CourierError> {
    let status = status.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM campaigns
                 WHERE ?1 IS NULL OR status = ?1
                 ORDER BY created_at ASC, id ASC"
            ))?;
            let rows = stmt.query_map(params![status], row_to_campaign)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Move `id` from `from` to `to`. Returns `false` if the stored status was not `from`.
pub async fn transition_campaign(
    db: &Database,
    id: &str,
    from: CampaignStatus,
    to: CampaignStatus,
    at: DateTime<Utc>,
) -> Result<bool, CourierError> {
    let id = id.to_string();
    let at = format_ts(at);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE campaigns SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                params![to.to_string(), at, id, from.to_string()],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::BusinessHours;
    use courier_core::parse_ts;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn campaign(id: &str) -> Campaign {
        let at = parse_ts("2026-03-01T00:00:00.000Z").unwrap();
        Campaign {
            id: id.into(),
            name: "Spring promo".into(),
            body: "20% off this week".into(),
            status: CampaignStatus::Draft,
            daily_cap: 3,
            batch_size: Some(3),
            business_hours: BusinessHours {
                timezone: "America/Chicago".into(),
                ..BusinessHours::default()
            },
            last_dispatch_pointer: 0,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn campaign_round_trips_business_hours() {
        let (db, _dir) = setup_db().await;
        insert_campaign(&db, &campaign("c1")).await.unwrap();
        let stored = get_campaign(&db, "c1").await.unwrap().unwrap();
        assert_eq!(stored, campaign("c1"));
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let (db, _dir) = setup_db().await;
        insert_campaign(&db, &campaign("c1")).await.unwrap();
        let at = parse_ts("2026-03-02T00:00:00.000Z").unwrap();

        assert!(
            transition_campaign(&db, "c1", CampaignStatus::Draft, CampaignStatus::Active, at)
                .await
                .unwrap()
        );
        assert!(
            !transition_campaign(&db, "c1", CampaignStatus::Draft, CampaignStatus::Active, at)
                .await
                .unwrap()
        );

        let active = list_campaigns(&db, Some(CampaignStatus::Active)).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].updated_at, at);
        assert!(list_campaigns(&db, Some(CampaignStatus::Draft)).await.unwrap().is_empty());
        assert_eq!(list_campaigns(&db, None).await.unwrap().len(), 1);
    }
}
