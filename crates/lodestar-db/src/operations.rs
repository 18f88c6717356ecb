//! Append-only extraction attempt log.

use crate::codec::{parse_timestamp, timestamp};
use crate::error::{DatabaseError, Result};
use lodestar_core::{CampaignId, OperationOutcome, OperationRecord, TargetRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

/// Append one attempt to the log.
pub async fn insert_operation(pool: &Pool<Sqlite>, op: &OperationRecord) -> Result<()> {
    sqlx::query(
        "INSERT INTO operations (campaign_id, target, attempt, egress_id, session_id, outcome,
                                 detail, risk_after, started_at, finished_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(op.campaign_id.as_str())
    .bind(op.target.as_str())
    .bind(i64::from(op.attempt))
    .bind(op.egress_id.as_deref())
    .bind(op.session_id.as_deref())
    .bind(op.outcome.to_string())
    .bind(op.detail.as_deref())
    .bind(op.risk_after)
    .bind(timestamp(&op.started_at))
    .bind(timestamp(&op.finished_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Operation log of a campaign in insertion order.
pub async fn get_operations(
    pool: &Pool<Sqlite>,
    campaign_id: &CampaignId,
) -> Result<Vec<OperationRecord>> {
    let rows = sqlx::query(
        "SELECT campaign_id, target, attempt, egress_id, session_id, outcome, detail,
                risk_after, started_at, finished_at
         FROM operations
         WHERE campaign_id = ?
         ORDER BY id",
    )
    .bind(campaign_id.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(operation_from_row).collect()
}

/// Attempt counts per outcome for a campaign.
pub async fn count_by_outcome(
    pool: &Pool<Sqlite>,
    campaign_id: &CampaignId,
) -> Result<Vec<(OperationOutcome, i64)>> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT outcome, COUNT(*) FROM operations
         WHERE campaign_id = ?
         GROUP BY outcome
         ORDER BY outcome",
    )
    .bind(campaign_id.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(outcome, count)| Ok((parse_outcome(&outcome)?, count)))
        .collect()
}

fn parse_outcome(outcome: &str) -> Result<OperationOutcome> {
    serde_json::from_str(&format!("\"{outcome}\""))
        .map_err(|e| DatabaseError::decode("outcome", format!("invalid outcome '{outcome}': {e}")))
}

fn operation_from_row(row: &SqliteRow) -> Result<OperationRecord> {
    let campaign_id: String = row.try_get("campaign_id")?;
    let target: String = row.try_get("target")?;
    let attempt: i64 = row.try_get("attempt")?;
    let outcome: String = row.try_get("outcome")?;
    let started_at: String = row.try_get("started_at")?;
    let finished_at: String = row.try_get("finished_at")?;

    Ok(OperationRecord {
        campaign_id: CampaignId::new(campaign_id)
            .map_err(|e| DatabaseError::decode("campaign_id", e))?,
        target: TargetRef::new(target).map_err(|e| DatabaseError::decode("target", e))?,
        attempt: u32::try_from(attempt).map_err(|e| DatabaseError::decode("attempt", e))?,
        egress_id: row.try_get("egress_id")?,
        session_id: row.try_get("session_id")?,
        outcome: parse_outcome(&outcome)?,
        detail: row.try_get("detail")?,
        risk_after: row.try_get("risk_after")?,
        started_at: parse_timestamp("started_at", &started_at)?,
        finished_at: parse_timestamp("finished_at", &finished_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaigns::upsert_campaign;
    use crate::test_support::{campaign, setup_test_db};
    use chrono::Utc;

    fn op(campaign_id: &CampaignId, target: &str, attempt: u32, outcome: OperationOutcome) -> OperationRecord {
        OperationRecord {
            campaign_id: campaign_id.clone(),
            target: TargetRef::new(target).expect("target"),
            attempt,
            egress_id: Some("direct".to_string()),
            session_id: None,
            outcome,
            detail: (outcome != OperationOutcome::Success).then(|| "timeout".to_string()),
            risk_after: 0.25,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_operations_round_trip_in_order() {
        let db = setup_test_db().await;
        let c = campaign(&["a"]);
        upsert_campaign(db.pool(), &c).await.expect("campaign");

        let first = op(&c.id, "a", 1, OperationOutcome::Transient);
        let second = op(&c.id, "a", 2, OperationOutcome::Success);
        insert_operation(db.pool(), &first).await.expect("first");
        insert_operation(db.pool(), &second).await.expect("second");

        let ops = get_operations(db.pool(), &c.id).await.expect("ops");
        assert_eq!(ops, vec![first, second]);
    }

    #[tokio::test]
    async fn test_count_by_outcome() {
        let db = setup_test_db().await;
        let c = campaign(&["a", "b"]);
        upsert_campaign(db.pool(), &c).await.expect("campaign");

        for (target, attempt, outcome) in [
            ("a", 1, OperationOutcome::Transient),
            ("a", 2, OperationOutcome::Success),
            ("b", 1, OperationOutcome::Detected),
            ("b", 2, OperationOutcome::Transient),
        ] {
            insert_operation(db.pool(), &op(&c.id, target, attempt, outcome))
                .await
                .expect("insert");
        }

        let counts = count_by_outcome(db.pool(), &c.id).await.expect("counts");
        assert_eq!(
            counts,
            vec![
                (OperationOutcome::Detected, 1),
                (OperationOutcome::Success, 1),
                (OperationOutcome::Transient, 2),
            ]
        );
    }
}
