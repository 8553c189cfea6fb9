// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign members and the pointer-advancing settlement.

use chrono::{DateTime, Utc};
use courier_core::types::{CampaignMember, MemberSettlement, MemberStatus};
use courier_core::{CourierError, format_ts};
use rusqlite::{OptionalExtension, Row, params, params_from_iter};

use crate::database::Database;
use crate::models::{enum_col, opt_ts_col, u32_col};
use crate::queries::activities::insert_activity_on;

const MEMBER_COLUMNS: &str = "campaign_id, sequence, contact_identity, status, \
     sent_activity_ref, sent_at, attempt_count, last_error";

fn row_to_member(row: &Row<'_>) -> rusqlite::Result<CampaignMember> {
    Ok(CampaignMember {
        campaign_id: row.get(0)?,
        sequence: row.get(1)?,
        contact_identity: row.get(2)?,
        status: enum_col(row, 3)?,
        sent_activity_ref: row.get(4)?,
        sent_at: opt_ts_col(row, 5)?,
        attempt_count: u32_col(row, 6)?,
        last_error: row.get(7)?,
    })
}

/// Append contacts after the current last sequence, skipping ones already present.
pub async fn append_members(
    db: &Database,
    campaign_id: &str,
    contacts: &[String],
) -> Result<u64, CourierError> {
    let campaign_id = campaign_id.to_string();
    let contacts = contacts.to_vec();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut next: i64 = tx.query_row(
                "SELECT COALESCE(MAX(sequence), 0) + 1 FROM campaign_members WHERE campaign_id = ?1",
                params![campaign_id],
                |row| row.get(0),
            )?;
            let mut appended = 0u64;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO campaign_members (campaign_id, sequence, contact_identity)
                     VALUES (?1, ?2, ?3)",
                )?;
                for contact in &contacts {
                    if stmt.execute(params![campaign_id, next, contact])? == 1 {
                        next += 1;
                        appended += 1;
                    }
                }
            }
            tx.commit()?;
            Ok(appended)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn last_sequence(db: &Database, campaign_id: &str) -> Result<i64, CourierError> {
    let campaign_id = campaign_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COALESCE(MAX(sequence), 0) FROM campaign_members WHERE campaign_id = ?1",
                params![campaign_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_member(
    db: &Database,
    campaign_id: &str,
    sequence: i64,
) -> Result<Option<CampaignMember>, CourierError> {
    let campaign_id = campaign_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {MEMBER_COLUMNS} FROM campaign_members
                     WHERE campaign_id = ?1 AND sequence = ?2"
                ),
                params![campaign_id, sequence],
                row_to_member,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Members strictly after `after`, in cursor order.
pub async fn members_after(
    db: &Database,
    campaign_id: &str,
    after: i64,
    limit: u32,
) -> Result<Vec<CampaignMember>, CourierError> {
    let campaign_id = campaign_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMBER_COLUMNS} FROM campaign_members
                 WHERE campaign_id = ?1 AND sequence > ?2
                 ORDER BY sequence ASC LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![campaign_id, after, limit], row_to_member)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn list_members(db: &Database, campaign_id: &str) -> Result<Vec<CampaignMember>, CourierError> {
    members_after(db, campaign_id, 0, u32::MAX).await
}

/// Apply a member's final state and move the pointer onto it, atomically.
///
/// The pointer must currently sit at `sequence - 1`; otherwise nothing is
/// written and `false` is returned. A `sent` settlement also records the
/// outbound activity and may overwrite a concurrent compliance skip, since
/// the message did go out.
pub async fn settle_member(
    db: &Database,
    settlement: &MemberSettlement,
) -> Result<bool, CourierError> {
    let s = settlement.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let settled_at = format_ts(s.settled_at);
            let advanced = tx.execute(
                "UPDATE campaigns SET last_dispatch_pointer = ?1, updated_at = ?2
                 WHERE id = ?3 AND last_dispatch_pointer = ?4",
                params![s.sequence, settled_at, s.campaign_id, s.sequence - 1],
            )?;
            if advanced != 1 {
                return Ok(false);
            }

            if let Some(activity) = &s.sent_activity {
                insert_activity_on(&tx, activity)?;
            }
            let sent_ref = s.sent_activity.as_ref().map(|a| a.external_id.clone());
            let sent_at = sent_ref.as_ref().map(|_| settled_at.clone());
            let overwritable = if s.status == MemberStatus::Sent {
                "('pending', 'skipped_compliance')"
            } else {
                "('pending')"
            };
            tx.execute(
                &format!(
                    "UPDATE campaign_members
                     SET status = ?1,
                         sent_activity_ref = COALESCE(?2, sent_activity_ref),
                         sent_at = COALESCE(?3, sent_at),
                         last_error = COALESCE(?4, last_error)
                     WHERE campaign_id = ?5 AND sequence = ?6 AND status IN {overwritable}"
                ),
                params![
                    s.status.to_string(),
                    sent_ref,
                    sent_at,
                    s.error,
                    s.campaign_id,
                    s.sequence
                ],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Count a failed attempt against a still-pending member. Returns the new count.
pub async fn record_member_attempt(
    db: &Database,
    campaign_id: &str,
    sequence: i64,
    error: &str,
) -> Result<u32, CourierError> {
    let campaign_id = campaign_id.to_string();
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "UPDATE campaign_members
                 SET attempt_count = attempt_count + 1, last_error = ?1
                 WHERE campaign_id = ?2 AND sequence = ?3
                 RETURNING attempt_count",
                params![error, campaign_id, sequence],
                |row| u32_col(row, 0),
            )
            .optional()
            .map(|count| count.unwrap_or(0))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Sends recorded at or after `since`, for one campaign or across all campaigns.
pub async fn sent_count_since(
    db: &Database,
    campaign_id: Option<&str>,
    since: DateTime<Utc>,
) -> Result<i64, CourierError> {
    let campaign_id = campaign_id.map(str::to_string);
    let since = format_ts(since);
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM campaign_members
                 WHERE sent_at IS NOT NULL AND sent_at >= ?1
                   AND (?2 IS NULL OR campaign_id = ?2)",
                params![since, campaign_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Move the member whose send produced `activity_ref` from any of `from` to `to`.
pub async fn update_member_by_activity(
    db: &Database,
    activity_ref: &str,
    from: &[MemberStatus],
    to: MemberStatus,
) -> Result<u64, CourierError> {
    if from.is_empty() {
        return Ok(0);
    }
    let mut values = vec![to.to_string(), activity_ref.to_string()];
    values.extend(from.iter().map(|s| s.to_string()));
    let placeholders = (3..=values.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE campaign_members SET status = ?1
                     WHERE sent_activity_ref = ?2 AND status IN ({placeholders})"
                ),
                params_from_iter(values.iter()),
            )?;
            Ok(changed as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark sent/delivered members of running campaigns for `contact` as responded.
pub async fn mark_members_responded(db: &Database, contact: &str) -> Result<u64, CourierError> {
    let contact = contact.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE campaign_members SET status = 'responded'
                 WHERE contact_identity = ?1 AND status IN ('sent', 'delivered')
                   AND campaign_id IN
                       (SELECT id FROM campaigns WHERE status IN ('active', 'paused'))",
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
    use crate::queries::campaigns::{get_campaign, insert_campaign};
    use courier_core::BusinessHours;
    use courier_core::parse_ts;
    use courier_core::types::{
        Activity, ActivityKind, ActivityStatus, Campaign, CampaignStatus, Direction,
    };
    use tempfile::tempdir;

    async fn setup() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let at = parse_ts("2026-03-01T00:00:00.000Z").unwrap();
        insert_campaign(
            &db,
            &Campaign {
                id: "c1".into(),
                name: "promo".into(),
                body: "hello".into(),
                status: CampaignStatus::Active,
                daily_cap: 10,
                batch_size: None,
                business_hours: BusinessHours::always("UTC"),
                last_dispatch_pointer: 0,
                created_at: at,
                updated_at: at,
            },
        )
        .await
        .unwrap();
        (db, dir)
    }

    fn contacts(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("+1555000{i:04}")).collect()
    }

    fn sent(sequence: i64, activity_id: &str, at: &str) -> MemberSettlement {
        let at = parse_ts(at).unwrap();
        MemberSettlement {
            campaign_id: "c1".into(),
            sequence,
            status: MemberStatus::Sent,
            sent_activity: Some(Activity {
                external_id: activity_id.into(),
                direction: Direction::Outbound,
                kind: ActivityKind::Message,
                contact_identity: format!("+1555000{sequence:04}"),
                counterpart_identity: "+15559990000".into(),
                body: Some("hello".into()),
                media_urls: vec![],
                status: ActivityStatus::Sent,
                created_at: at,
                recorded_at: at,
            }),
            error: None,
            settled_at: at,
        }
    }

    #[tokio::test]
    async fn append_assigns_dense_sequences_and_skips_duplicates() {
        let (db, _dir) = setup().await;
        assert_eq!(append_members(&db, "c1", &contacts(3)).await.unwrap(), 3);

        let mut more = contacts(2);
        more.push("+15550009999".into());
        assert_eq!(append_members(&db, "c1", &more).await.unwrap(), 1);

        let members = list_members(&db, "c1").await.unwrap();
        let seqs: Vec<i64> = members.iter().map(|m| m.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        assert_eq!(members[3].contact_identity, "+15550009999");
        assert_eq!(last_sequence(&db, "c1").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn settle_requires_pointer_at_previous_sequence() {
        let (db, _dir) = setup().await;
        append_members(&db, "c1", &contacts(3)).await.unwrap();

        // Out of order: pointer is 0, so sequence 2 cannot settle.
        assert!(!settle_member(&db, &sent(2, "m2", "2026-03-02T10:00:00.000Z")).await.unwrap());
        assert!(settle_member(&db, &sent(1, "m1", "2026-03-02T10:00:00.000Z")).await.unwrap());
        // Replaying the same settlement loses the compare-and-set.
        assert!(!settle_member(&db, &sent(1, "m1", "2026-03-02T10:00:00.000Z")).await.unwrap());

        let campaign = get_campaign(&db, "c1").await.unwrap().unwrap();
        assert_eq!(campaign.last_dispatch_pointer, 1);
        let member = get_member(&db, "c1", 1).await.unwrap().unwrap();
        assert_eq!(member.status, MemberStatus::Sent);
        assert_eq!(member.sent_activity_ref.as_deref(), Some("m1"));
        assert!(member.sent_at.is_some());
    }

    #[tokio::test]
    async fn skip_settlement_keeps_existing_status() {
        let (db, _dir) = setup().await;
        append_members(&db, "c1", &contacts(2)).await.unwrap();
        crate::queries::compliance::skip_pending_members_for_contact(&db, "+15550000001")
            .await
            .unwrap();

        let settlement = MemberSettlement {
            campaign_id: "c1".into(),
            sequence: 1,
            status: MemberStatus::Failed,
            sent_activity: None,
            error: Some("invalid".into()),
            settled_at: parse_ts("2026-03-02T10:00:00.000Z").unwrap(),
        };
        assert!(settle_member(&db, &settlement).await.unwrap());
        let member = get_member(&db, "c1", 1).await.unwrap().unwrap();
        assert_eq!(member.status, MemberStatus::SkippedCompliance);
    }

    #[tokio::test]
    async fn sent_count_respects_window_and_campaign() {
        let (db, _dir) = setup().await;
        append_members(&db, "c1", &contacts(3)).await.unwrap();
        settle_member(&db, &sent(1, "m1", "2026-03-01T23:00:00.000Z")).await.unwrap();
        settle_member(&db, &sent(2, "m2", "2026-03-02T09:00:00.000Z")).await.unwrap();
        settle_member(&db, &sent(3, "m3", "2026-03-02T10:00:00.000Z")).await.unwrap();

        let day = parse_ts("2026-03-02T00:00:00.000Z").unwrap();
        assert_eq!(sent_count_since(&db, Some("c1"), day).await.unwrap(), 2);
        assert_eq!(sent_count_since(&db, None, day).await.unwrap(), 2);
        assert_eq!(sent_count_since(&db, Some("other"), day).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delivery_and_reply_transitions() {
        let (db, _dir) = setup().await;
        append_members(&db, "c1", &contacts(1)).await.unwrap();
        settle_member(&db, &sent(1, "m1", "2026-03-02T10:00:00.000Z")).await.unwrap();

        let moved = update_member_by_activity(&db, "m1", &[MemberStatus::Sent], MemberStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(moved, 1);
        // A late failure callback no longer matches.
        let moved = update_member_by_activity(&db, "m1", &[MemberStatus::Sent], MemberStatus::Failed)
            .await
            .unwrap();
        assert_eq!(moved, 0);

        assert_eq!(mark_members_responded(&db, "+15550000001").await.unwrap(), 1);
        let member = get_member(&db, "c1", 1).await.unwrap().unwrap();
        assert_eq!(member.status, MemberStatus::Responded);
    }

    #[tokio::test]
    async fn attempts_accumulate() {
        let (db, _dir) = setup().await;
        append_members(&db, "c1", &contacts(1)).await.unwrap();
        assert_eq!(record_member_attempt(&db, "c1", 1, "timeout").await.unwrap(), 1);
        assert_eq!(record_member_attempt(&db, "c1", 1, "503").await.unwrap(), 2);
        let member = get_member(&db, "c1", 1).await.unwrap().unwrap();
        assert_eq!(member.last_error.as_deref(), Some("503"));
        assert_eq!(record_member_attempt(&db, "c1", 9, "x").await.unwrap(), 0);
    }
}
