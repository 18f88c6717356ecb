//! Lead intelligence rows.

use crate::codec::{from_json, timestamp, to_json};
use crate::error::Result;
use lodestar_core::{CampaignId, LeadIntelligence, Tier};
use sqlx::{Pool, Sqlite};

/// Insert or replace the lead for (campaign, target).
pub async fn upsert_lead(pool: &Pool<Sqlite>, lead: &LeadIntelligence) -> Result<()> {
    let data = to_json("data", lead)?;

    sqlx::query(
        "INSERT INTO lead_intelligence (lead_id, campaign_id, target, tier, priority_score, data, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(campaign_id, target) DO UPDATE SET
             lead_id = excluded.lead_id,
             tier = excluded.tier,
             priority_score = excluded.priority_score,
             data = excluded.data,
             created_at = excluded.created_at",
    )
    .bind(&lead.lead_id)
    .bind(lead.campaign_id.as_str())
    .bind(lead.target.as_str())
    .bind(lead.tier.to_string())
    .bind(lead.priority_score)
    .bind(&data)
    .bind(timestamp(&lead.created_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Leads of a campaign, highest priority first.
pub async fn get_leads(pool: &Pool<Sqlite>, campaign_id: &CampaignId) -> Result<Vec<LeadIntelligence>> {
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT data FROM lead_intelligence
         WHERE campaign_id = ?
         ORDER BY priority_score DESC, lead_id ASC",
    )
    .bind(campaign_id.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(|data| from_json("data", data)).collect()
}

/// Leads of a campaign in one tier, highest priority first.
pub async fn get_leads_by_tier(
    pool: &Pool<Sqlite>,
    campaign_id: &CampaignId,
    tier: Tier,
) -> Result<Vec<LeadIntelligence>> {
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT data FROM lead_intelligence
         WHERE campaign_id = ? AND tier = ?
         ORDER BY priority_score DESC, lead_id ASC",
    )
    .bind(campaign_id.as_str())
    .bind(tier.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(|data| from_json("data", data)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaigns::upsert_campaign;
    use crate::test_support::{campaign, lead, setup_test_db};

    #[tokio::test]
    async fn test_leads_ordered_by_priority() {
        let db = setup_test_db().await;
        let c = campaign(&["a", "b", "c"]);
        upsert_campaign(db.pool(), &c).await.expect("campaign");

        upsert_lead(db.pool(), &lead(&c.id, "a", Tier::Silver, 0.55)).await.expect("a");
        upsert_lead(db.pool(), &lead(&c.id, "b", Tier::Platinum, 0.91)).await.expect("b");
        upsert_lead(db.pool(), &lead(&c.id, "c", Tier::Gold, 0.78)).await.expect("c");

        let leads = get_leads(db.pool(), &c.id).await.expect("leads");
        let targets: Vec<&str> = leads.iter().map(|l| l.target.as_str()).collect();
        assert_eq!(targets, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_lead() {
        let db = setup_test_db().await;
        let c = campaign(&["a"]);
        upsert_campaign(db.pool(), &c).await.expect("campaign");

        upsert_lead(db.pool(), &lead(&c.id, "a", Tier::Silver, 0.55)).await.expect("first");
        upsert_lead(db.pool(), &lead(&c.id, "a", Tier::Gold, 0.8)).await.expect("second");

        let leads = get_leads(db.pool(), &c.id).await.expect("leads");
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].tier, Tier::Gold);
    }

    #[tokio::test]
    async fn test_filter_by_tier() {
        let db = setup_test_db().await;
        let c = campaign(&["a", "b"]);
        upsert_campaign(db.pool(), &c).await.expect("campaign");

        upsert_lead(db.pool(), &lead(&c.id, "a", Tier::Gold, 0.8)).await.expect("a");
        upsert_lead(db.pool(), &lead(&c.id, "b", Tier::Silver, 0.6)).await.expect("b");

        let gold = get_leads_by_tier(db.pool(), &c.id, Tier::Gold)
            .await
            .expect("gold");
        assert_eq!(gold.len(), 1);
        assert_eq!(gold[0].target.as_str(), "a");
    }
}
