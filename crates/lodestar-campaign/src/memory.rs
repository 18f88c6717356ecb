//! In-process [`CampaignStore`] for tests and dry runs.

use async_trait::async_trait;
use lodestar_core::{
    Campaign, CampaignId, CampaignStore, LeadIntelligence, OperationRecord, RawRecord,
    ScoredRecord, StoreResult, TargetRef,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    campaigns: HashMap<CampaignId, Campaign>,
    raw: HashMap<CampaignId, Vec<RawRecord>>,
    scored: Vec<ScoredRecord>,
    leads: HashMap<(CampaignId, TargetRef), LeadIntelligence>,
    operations: Vec<OperationRecord>,
}

/// Store that keeps everything in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every scored row for a campaign, including superseded ones.
    pub async fn scored_history(&self, campaign_id: &CampaignId) -> Vec<ScoredRecord> {
        let tables = self.tables.read().await;
        tables
            .scored
            .iter()
            .filter(|r| &r.campaign_id == campaign_id)
            .cloned()
            .collect()
    }

    /// Operation log for a campaign, in insertion order.
    pub async fn operations(&self, campaign_id: &CampaignId) -> Vec<OperationRecord> {
        let tables = self.tables.read().await;
        tables
            .operations
            .iter()
            .filter(|o| &o.campaign_id == campaign_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn save_campaign(&self, campaign: &Campaign) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .campaigns
            .insert(campaign.id.clone(), campaign.clone());
        Ok(())
    }

    async fn load_campaign(&self, id: &CampaignId) -> StoreResult<Option<Campaign>> {
        Ok(self.tables.read().await.campaigns.get(id).cloned())
    }

    async fn list_campaigns(&self) -> StoreResult<Vec<Campaign>> {
        let tables = self.tables.read().await;
        let mut campaigns: Vec<Campaign> = tables.campaigns.values().cloned().collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(campaigns)
    }

    async fn save_raw_record(
        &self,
        campaign_id: &CampaignId,
        record: &RawRecord,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let records = tables.raw.entry(campaign_id.clone()).or_default();
        match records.iter_mut().find(|r| r.target == record.target) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }

    async fn raw_records(&self, campaign_id: &CampaignId) -> StoreResult<Vec<RawRecord>> {
        let tables = self.tables.read().await;
        let mut records = tables.raw.get(campaign_id).cloned().unwrap_or_default();

        // Campaign target order, not insertion order.
        if let Some(campaign) = tables.campaigns.get(campaign_id) {
            let position: HashMap<_, _> = campaign
                .targets
                .iter()
                .enumerate()
                .map(|(i, t)| (t, i))
                .collect();
            records.sort_by_key(|r| position.get(&r.target).copied().unwrap_or(usize::MAX));
        }
        Ok(records)
    }

    async fn save_record(&self, record: &ScoredRecord) -> StoreResult<()> {
        self.tables.write().await.scored.push(record.clone());
        Ok(())
    }

    async fn scored_records(&self, campaign_id: &CampaignId) -> StoreResult<Vec<ScoredRecord>> {
        let tables = self.tables.read().await;
        let mut newest: Vec<ScoredRecord> = Vec::new();
        for record in tables.scored.iter().filter(|r| &r.campaign_id == campaign_id) {
            match newest
                .iter_mut()
                .find(|r| r.record.target == record.record.target)
            {
                Some(existing) => *existing = record.clone(),
                None => newest.push(record.clone()),
            }
        }
        Ok(newest)
    }

    async fn save_intelligence(&self, lead: &LeadIntelligence) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.leads.insert(
            (lead.campaign_id.clone(), lead.target.clone()),
            lead.clone(),
        );
        Ok(())
    }

    async fn intelligence(&self, campaign_id: &CampaignId) -> StoreResult<Vec<LeadIntelligence>> {
        let tables = self.tables.read().await;
        let mut leads: Vec<LeadIntelligence> = tables
            .leads
            .values()
            .filter(|l| &l.campaign_id == campaign_id)
            .cloned()
            .collect();
        leads.sort_by(|a, b| b.priority_score.total_cmp(&a.priority_score));
        Ok(leads)
    }

    async fn record_operation(&self, operation: &OperationRecord) -> StoreResult<()> {
        self.tables.write().await.operations.push(operation.clone());
        Ok(())
    }
}
