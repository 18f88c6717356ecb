//! Persistence contract for campaign state.
//!
//! The orchestrator only talks to storage through [`CampaignStore`]. Every
//! `save_*` method is an upsert keyed as documented, except
//! [`CampaignStore::save_record`] (append-only history) and
//! [`CampaignStore::record_operation`] (append-only log).

use crate::error::StoreResult;
use crate::types::{
    Campaign, CampaignId, LeadIntelligence, OperationRecord, RawRecord, ScoredRecord,
};
use async_trait::async_trait;

/// Storage backend for campaigns, records and leads.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Upsert a campaign keyed by its id.
    async fn save_campaign(&self, campaign: &Campaign) -> StoreResult<()>;

    /// Load a campaign by id.
    async fn load_campaign(&self, id: &CampaignId) -> StoreResult<Option<Campaign>>;

    /// All campaigns, newest first.
    async fn list_campaigns(&self) -> StoreResult<Vec<Campaign>>;

    /// Upsert an extracted record keyed by (campaign, target).
    async fn save_raw_record(&self, campaign_id: &CampaignId, record: &RawRecord)
        -> StoreResult<()>;

    /// Extracted records of a campaign in target order.
    async fn raw_records(&self, campaign_id: &CampaignId) -> StoreResult<Vec<RawRecord>>;

    /// Append a scored record to the history of its (campaign, target).
    async fn save_record(&self, record: &ScoredRecord) -> StoreResult<()>;

    /// Newest scored record per target for a campaign.
    async fn scored_records(&self, campaign_id: &CampaignId) -> StoreResult<Vec<ScoredRecord>>;

    /// Upsert lead intelligence keyed by (campaign, target).
    async fn save_intelligence(&self, lead: &LeadIntelligence) -> StoreResult<()>;

    /// Leads of a campaign, highest priority first.
    async fn intelligence(&self, campaign_id: &CampaignId) -> StoreResult<Vec<LeadIntelligence>>;

    /// Append an extraction attempt to the operation log.
    async fn record_operation(&self, operation: &OperationRecord) -> StoreResult<()>;
}
