//! [`CampaignStore`] backed by the `SQLite` tables in this crate.

use crate::{campaigns, intelligence, operations, records};
use async_trait::async_trait;
use lodestar_core::{
    Campaign, CampaignId, CampaignStore, LeadIntelligence, OperationRecord, RawRecord,
    ScoredRecord, StoreResult,
};
use sqlx::{Pool, Sqlite};

/// Campaign store over a `SQLx` pool. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct SqliteCampaignStore {
    pool: Pool<Sqlite>,
}

impl SqliteCampaignStore {
    /// Wrap an already migrated pool.
    #[must_use]
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Underlying pool, for queries outside the store contract.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl CampaignStore for SqliteCampaignStore {
    async fn save_campaign(&self, campaign: &Campaign) -> StoreResult<()> {
        Ok(campaigns::upsert_campaign(&self.pool, campaign).await?)
    }

    async fn load_campaign(&self, id: &CampaignId) -> StoreResult<Option<Campaign>> {
        Ok(campaigns::get_campaign(&self.pool, id).await?)
    }

    async fn list_campaigns(&self) -> StoreResult<Vec<Campaign>> {
        Ok(campaigns::list_campaigns(&self.pool).await?)
    }

    async fn save_raw_record(
        &self,
        campaign_id: &CampaignId,
        record: &RawRecord,
    ) -> StoreResult<()> {
        Ok(records::upsert_raw_record(&self.pool, campaign_id, record).await?)
    }

    async fn raw_records(&self, campaign_id: &CampaignId) -> StoreResult<Vec<RawRecord>> {
        Ok(records::get_raw_records(&self.pool, campaign_id).await?)
    }

    async fn save_record(&self, record: &ScoredRecord) -> StoreResult<()> {
        Ok(records::insert_scored_record(&self.pool, record).await?)
    }

    async fn scored_records(&self, campaign_id: &CampaignId) -> StoreResult<Vec<ScoredRecord>> {
        Ok(records::get_current_scored_records(&self.pool, campaign_id).await?)
    }

    async fn save_intelligence(&self, lead: &LeadIntelligence) -> StoreResult<()> {
        Ok(intelligence::upsert_lead(&self.pool, lead).await?)
    }

    async fn intelligence(&self, campaign_id: &CampaignId) -> StoreResult<Vec<LeadIntelligence>> {
        Ok(intelligence::get_leads(&self.pool, campaign_id).await?)
    }

    async fn record_operation(&self, operation: &OperationRecord) -> StoreResult<()> {
        Ok(operations::insert_operation(&self.pool, operation).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{campaign, raw, setup_test_db};
    use lodestar_core::{ScoreSet, StoreError};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_store_through_trait_object() {
        let db = setup_test_db().await;
        let store: Arc<dyn CampaignStore> = Arc::new(db.store());
        let c = campaign(&["a", "b"]);

        store.save_campaign(&c).await.expect("save");
        store
            .save_raw_record(&c.id, &raw("b", "Bo"))
            .await
            .expect("raw");
        let scores = ScoreSet::new(0.8, 0.5, 0.5, 0.5).expect("scores");
        store
            .save_record(&ScoredRecord::new(c.id.clone(), raw("b", "Bo"), scores, "v1"))
            .await
            .expect("scored");

        assert_eq!(store.list_campaigns().await.expect("list").len(), 1);
        assert_eq!(store.raw_records(&c.id).await.expect("raw").len(), 1);
        assert_eq!(store.scored_records(&c.id).await.expect("scored").len(), 1);
        assert!(store.intelligence(&c.id).await.expect("leads").is_empty());
    }

    #[tokio::test]
    async fn test_constraint_violation_is_backend_error() {
        let db = setup_test_db().await;
        let store = db.store();

        let err = store
            .save_raw_record(&CampaignId::generate(), &raw("a", "Ada"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
