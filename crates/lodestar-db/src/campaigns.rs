//! Campaign rows.
//!
//! Scalar campaign fields get their own columns so status and progress can be
//! queried directly; the target list and final metrics are JSON documents.

use crate::codec::{from_json, parse_optional_timestamp, parse_timestamp, timestamp, to_json};
use crate::error::{DatabaseError, Result};
use lodestar_core::{
    Campaign, CampaignCounters, CampaignId, CampaignMetrics, CampaignStatus, StealthLevel,
    TargetRef,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

const CAMPAIGN_COLUMNS: &str = "id, name, status, stealth_level, qualification_threshold, targets,
     processed, succeeded, qualified, high_value, cursor,
     created_at, started_at, completed_at, pause_reason, error_message, metrics";

/// Insert a campaign or overwrite every field of the existing row.
pub async fn upsert_campaign(pool: &Pool<Sqlite>, campaign: &Campaign) -> Result<()> {
    let targets = to_json("targets", &campaign.targets)?;
    let metrics = campaign
        .metrics
        .as_ref()
        .map(|m| to_json("metrics", m))
        .transpose()?;
    let cursor = i64::try_from(campaign.cursor)
        .map_err(|e| DatabaseError::Encode(format!("cursor: {e}")))?;

    sqlx::query(
        "INSERT INTO campaigns (id, name, status, stealth_level, qualification_threshold, targets,
                                processed, succeeded, qualified, high_value, cursor,
                                created_at, started_at, completed_at, pause_reason, error_message, metrics)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             status = excluded.status,
             stealth_level = excluded.stealth_level,
             qualification_threshold = excluded.qualification_threshold,
             targets = excluded.targets,
             processed = excluded.processed,
             succeeded = excluded.succeeded,
             qualified = excluded.qualified,
             high_value = excluded.high_value,
             cursor = excluded.cursor,
             started_at = excluded.started_at,
             completed_at = excluded.completed_at,
             pause_reason = excluded.pause_reason,
             error_message = excluded.error_message,
             metrics = excluded.metrics",
    )
    .bind(campaign.id.as_str())
    .bind(&campaign.name)
    .bind(campaign.status.to_string())
    .bind(i64::from(campaign.stealth_level.get()))
    .bind(campaign.qualification_threshold)
    .bind(&targets)
    .bind(i64::from(campaign.counters.processed))
    .bind(i64::from(campaign.counters.succeeded))
    .bind(i64::from(campaign.counters.qualified))
    .bind(i64::from(campaign.counters.high_value))
    .bind(cursor)
    .bind(timestamp(&campaign.created_at))
    .bind(campaign.started_at.as_ref().map(timestamp))
    .bind(campaign.completed_at.as_ref().map(timestamp))
    .bind(campaign.pause_reason.as_deref())
    .bind(campaign.error_message.as_deref())
    .bind(metrics)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a campaign by id.
pub async fn get_campaign(pool: &Pool<Sqlite>, id: &CampaignId) -> Result<Option<Campaign>> {
    let row = sqlx::query(&format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?"
    ))
    .bind(id.as_str())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(campaign_from_row).transpose()
}

/// All campaigns, newest first.
pub async fn list_campaigns(pool: &Pool<Sqlite>) -> Result<Vec<Campaign>> {
    let rows = sqlx::query(&format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(campaign_from_row).collect()
}

/// Campaigns currently in `status`, oldest first.
pub async fn list_by_status(pool: &Pool<Sqlite>, status: CampaignStatus) -> Result<Vec<Campaign>> {
    let rows = sqlx::query(&format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE status = ? ORDER BY created_at ASC"
    ))
    .bind(status.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(campaign_from_row).collect()
}

/// Target list of a campaign, if the campaign exists.
pub(crate) async fn campaign_targets(
    pool: &Pool<Sqlite>,
    id: &CampaignId,
) -> Result<Option<Vec<TargetRef>>> {
    let targets: Option<String> = sqlx::query_scalar("SELECT targets FROM campaigns WHERE id = ?")
        .bind(id.as_str())
        .fetch_optional(pool)
        .await?;

    targets.map(|t| from_json("targets", &t)).transpose()
}

fn campaign_from_row(row: &SqliteRow) -> Result<Campaign> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let stealth_level: i64 = row.try_get("stealth_level")?;
    let targets: String = row.try_get("targets")?;
    let cursor: i64 = row.try_get("cursor")?;
    let created_at: String = row.try_get("created_at")?;
    let started_at: Option<String> = row.try_get("started_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;
    let metrics: Option<String> = row.try_get("metrics")?;

    let stealth_level = u8::try_from(stealth_level)
        .map_err(|e| DatabaseError::decode("stealth_level", e))
        .and_then(|l| StealthLevel::new(l).map_err(|e| DatabaseError::decode("stealth_level", e)))?;

    Ok(Campaign {
        id: CampaignId::new(id).map_err(|e| DatabaseError::decode("id", e))?,
        name: row.try_get("name")?,
        targets: from_json("targets", &targets)?,
        stealth_level,
        qualification_threshold: row.try_get("qualification_threshold")?,
        status: CampaignStatus::parse(&status).map_err(|e| DatabaseError::decode("status", e))?,
        counters: CampaignCounters {
            processed: counter(row, "processed")?,
            succeeded: counter(row, "succeeded")?,
            qualified: counter(row, "qualified")?,
            high_value: counter(row, "high_value")?,
        },
        cursor: usize::try_from(cursor).map_err(|e| DatabaseError::decode("cursor", e))?,
        created_at: parse_timestamp("created_at", &created_at)?,
        started_at: parse_optional_timestamp("started_at", started_at.as_deref())?,
        completed_at: parse_optional_timestamp("completed_at", completed_at.as_deref())?,
        pause_reason: row.try_get("pause_reason")?,
        error_message: row.try_get("error_message")?,
        metrics: metrics
            .map(|m| from_json::<CampaignMetrics>("metrics", &m))
            .transpose()?,
    })
}

fn counter(row: &SqliteRow, column: &str) -> Result<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(|e| DatabaseError::decode(column, e))
}
