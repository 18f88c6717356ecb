//! Extracted and scored records.
//!
//! Raw records are upserted per (campaign, target). Scored records form an
//! append-only history; the newest row for a target is the current one.

use crate::campaigns::campaign_targets;
use crate::codec::{from_json, parse_timestamp, timestamp, to_json};
use crate::error::{DatabaseError, Result};
use lodestar_core::{CampaignId, RawRecord, ScoreSet, ScoredRecord, Tier};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;

/// Insert or replace the extracted record for (campaign, target).
pub async fn upsert_raw_record(
    pool: &Pool<Sqlite>,
    campaign_id: &CampaignId,
    record: &RawRecord,
) -> Result<()> {
    let data = to_json("data", record)?;

    sqlx::query(
        "INSERT INTO raw_records (campaign_id, target, data, extracted_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(campaign_id, target) DO UPDATE SET
             data = excluded.data,
             extracted_at = excluded.extracted_at",
    )
    .bind(campaign_id.as_str())
    .bind(record.target.as_str())
    .bind(&data)
    .bind(timestamp(&record.meta.extracted_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Extracted records of a campaign, in the campaign's target order.
pub async fn get_raw_records(
    pool: &Pool<Sqlite>,
    campaign_id: &CampaignId,
) -> Result<Vec<RawRecord>> {
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT data FROM raw_records WHERE campaign_id = ? ORDER BY rowid",
    )
    .bind(campaign_id.as_str())
    .fetch_all(pool)
    .await?;

    let mut records = rows
        .iter()
        .map(|data| from_json::<RawRecord>("data", data))
        .collect::<Result<Vec<_>>>()?;

    if let Some(targets) = campaign_targets(pool, campaign_id).await? {
        let position: HashMap<_, _> = targets.iter().enumerate().map(|(i, t)| (t, i)).collect();
        // Stable sort keeps records for unlisted targets in insertion order, last.
        records.sort_by_key(|r| position.get(&r.target).copied().unwrap_or(usize::MAX));
    }

    Ok(records)
}

/// Append a scored record.
pub async fn insert_scored_record(pool: &Pool<Sqlite>, record: &ScoredRecord) -> Result<()> {
    let data = to_json("record", &record.record)?;

    sqlx::query(
        "INSERT INTO scored_records (campaign_id, target, tier, quality, propensity, engagement,
                                     conversion, model_version, record, scored_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.campaign_id.as_str())
    .bind(record.record.target.as_str())
    .bind(record.tier.to_string())
    .bind(record.scores.quality)
    .bind(record.scores.propensity)
    .bind(record.scores.engagement)
    .bind(record.scores.conversion)
    .bind(&record.model_version)
    .bind(&data)
    .bind(timestamp(&record.scored_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Newest scored record per target for a campaign.
pub async fn get_current_scored_records(
    pool: &Pool<Sqlite>,
    campaign_id: &CampaignId,
) -> Result<Vec<ScoredRecord>> {
    let rows = sqlx::query(
        "SELECT campaign_id, tier, quality, propensity, engagement, conversion,
                model_version, record, scored_at
         FROM scored_records
         WHERE id IN (SELECT MAX(id) FROM scored_records WHERE campaign_id = ? GROUP BY target)
         ORDER BY id",
    )
    .bind(campaign_id.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(scored_from_row).collect()
}

/// Every scored row for a campaign, oldest first.
pub async fn get_scored_history(
    pool: &Pool<Sqlite>,
    campaign_id: &CampaignId,
) -> Result<Vec<ScoredRecord>> {
    let rows = sqlx::query(
        "SELECT campaign_id, tier, quality, propensity, engagement, conversion,
                model_version, record, scored_at
         FROM scored_records
         WHERE campaign_id = ?
         ORDER BY id",
    )
    .bind(campaign_id.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(scored_from_row).collect()
}

fn scored_from_row(row: &SqliteRow) -> Result<ScoredRecord> {
    let campaign_id: String = row.try_get("campaign_id")?;
    let tier: String = row.try_get("tier")?;
    let record: String = row.try_get("record")?;
    let scored_at: String = row.try_get("scored_at")?;

    let scores = ScoreSet::new(
        row.try_get("quality")?,
        row.try_get("propensity")?,
        row.try_get("engagement")?,
        row.try_get("conversion")?,
    )
    .map_err(|e| DatabaseError::decode("scores", e))?;

    Ok(ScoredRecord {
        campaign_id: CampaignId::new(campaign_id)
            .map_err(|e| DatabaseError::decode("campaign_id", e))?,
        record: from_json("record", &record)?,
        scores,
        tier: Tier::parse(&tier).map_err(|e| DatabaseError::decode("tier", e))?,
        model_version: row.try_get("model_version")?,
        scored_at: parse_timestamp("scored_at", &scored_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaigns::upsert_campaign;
    use crate::test_support::{campaign, raw, setup_test_db};

    #[tokio::test]
    async fn test_raw_records_upsert_in_target_order() {
        let db = setup_test_db().await;
        let c = campaign(&["a", "b", "c"]);
        upsert_campaign(db.pool(), &c).await.expect("campaign");

        upsert_raw_record(db.pool(), &c.id, &raw("c", "Cara")).await.expect("c");
        upsert_raw_record(db.pool(), &c.id, &raw("a", "Ada")).await.expect("a");
        upsert_raw_record(db.pool(), &c.id, &raw("c", "Cara Updated"))
            .await
            .expect("c again");

        let records = get_raw_records(db.pool(), &c.id).await.expect("records");
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Ada", "Cara Updated"]);
    }

    #[tokio::test]
    async fn test_raw_records_for_unlisted_targets_sort_last() {
        let db = setup_test_db().await;
        let c = campaign(&["a", "b", "c"]);
        upsert_campaign(db.pool(), &c).await.expect("campaign");

        upsert_raw_record(db.pool(), &c.id, &raw("zed", "Zed")).await.expect("zed");
        upsert_raw_record(db.pool(), &c.id, &raw("c", "Cara")).await.expect("c");
        upsert_raw_record(db.pool(), &c.id, &raw("yan", "Yan")).await.expect("yan");
        upsert_raw_record(db.pool(), &c.id, &raw("b", "Bo")).await.expect("b");

        let records = get_raw_records(db.pool(), &c.id).await.expect("records");
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Bo", "Cara", "Zed", "Yan"]);
    }

    #[tokio::test]
    async fn test_raw_record_requires_campaign() {
        let db = setup_test_db().await;
        let orphan = CampaignId::generate();

        let result = upsert_raw_record(db.pool(), &orphan, &raw("a", "Ada")).await;
        assert!(matches!(result, Err(DatabaseError::Sqlx(_))));
    }

    #[tokio::test]
    async fn test_current_scored_record_is_newest() {
        let db = setup_test_db().await;
        let c = campaign(&["a", "b"]);
        upsert_campaign(db.pool(), &c).await.expect("campaign");

        let low = ScoreSet::new(0.3, 0.3, 0.3, 0.3).expect("scores");
        let high = ScoreSet::new(0.95, 0.8, 0.7, 0.6).expect("scores");
        let first = ScoredRecord::new(c.id.clone(), raw("a", "Ada"), low, "v1");
        let other = ScoredRecord::new(c.id.clone(), raw("b", "Bo"), low, "v1");
        let rescored = ScoredRecord::new(c.id.clone(), raw("a", "Ada"), high, "v2");

        insert_scored_record(db.pool(), &first).await.expect("first");
        insert_scored_record(db.pool(), &other).await.expect("other");
        insert_scored_record(db.pool(), &rescored).await.expect("rescored");

        let current = get_current_scored_records(db.pool(), &c.id)
            .await
            .expect("current");
        assert_eq!(current.len(), 2);
        let ada = current
            .iter()
            .find(|r| r.record.target.as_str() == "a")
            .expect("ada");
        assert_eq!(ada.model_version, "v2");
        assert_eq!(ada.tier, Tier::Platinum);
        assert_eq!(ada.scores, high);

        let history = get_scored_history(db.pool(), &c.id).await.expect("history");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].model_version, "v1");
    }
}
