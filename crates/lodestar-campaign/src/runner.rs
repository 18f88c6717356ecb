//! Campaign state machine and batch loop.
//!
//! A campaign moves `planning → active → {paused ↔ active} → {completed | failed}`.
//! While active, targets are extracted in batches sized by the
//! [`RiskGovernor`], each one paced, retried and logged. Once every target has
//! been processed the extracted records are scored, qualified and turned into
//! leads. Progress (counters and cursor) is persisted after every target, so a
//! paused campaign resumes exactly where it stopped.

use crate::capabilities::{ExtractionError, Extractor, Scorer};
use crate::error::{CampaignError, Result};
use crate::intelligence;
use crate::pacing::Pacer;
use crate::risk::{Outcome, RiskGovernor};
use chrono::{DateTime, Utc};
use lodestar_browser::{BrowsingSession, EgressLease, EgressRotator, SessionLease, SessionPool};
use lodestar_core::{
    AppConfig, Campaign, CampaignConfig, CampaignCounters, CampaignId, CampaignMetrics,
    CampaignSpec, CampaignStatus, CampaignStore, LeadIntelligence, OperationOutcome,
    OperationRecord, RawRecord, ScoredRecord, TargetRef,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Pause reason when the risk latch engages.
pub const PAUSE_RISK: &str = "risk_emergency";
/// Pause reason when sessions or egress identities stay unavailable.
pub const PAUSE_RESOURCES: &str = "resources_exhausted";
/// Pause reason for an explicit [`PipelineRunner::request_pause`].
pub const PAUSE_REQUESTED: &str = "requested";

/// Limits the runner enforces.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Quality at or above which a qualifying record is high-value
    pub high_value_threshold: f64,
    /// Campaigns allowed to run at once in this process
    pub max_concurrent_campaigns: usize,
    /// Extra attempts for a target after a transient failure
    pub max_target_retries: u32,
    /// Waits for a session or identity before pausing the campaign
    pub max_resource_waits: u32,
}

impl From<&CampaignConfig> for RunnerSettings {
    fn from(config: &CampaignConfig) -> Self {
        Self {
            high_value_threshold: config.high_value_threshold,
            max_concurrent_campaigns: config.max_concurrent_campaigns,
            max_target_retries: config.max_target_retries,
            max_resource_waits: config.max_resource_waits,
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::from(&CampaignConfig::default())
    }
}

/// Snapshot of a campaign's progress, returned by every runner entry point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignReport {
    /// Campaign identifier
    pub campaign_id: CampaignId,
    /// Display name
    pub name: String,
    /// Current state
    pub status: CampaignStatus,
    /// Number of targets
    pub total: u32,
    /// Progress counters
    pub counters: CampaignCounters,
    /// Index of the next unprocessed target
    pub cursor: usize,
    /// Why the campaign is paused, if it is
    pub pause_reason: Option<String>,
    /// Fault that failed the campaign, if any
    pub error_message: Option<String>,
    /// Final metrics once completed
    pub metrics: Option<CampaignMetrics>,
    /// Governor risk when the report was taken
    pub risk: f64,
    /// Share of detections in the governor's recent outcomes
    pub detection_rate: f64,
}

impl CampaignReport {
    fn new(campaign: &Campaign, governor: &RiskGovernor) -> Self {
        Self {
            campaign_id: campaign.id.clone(),
            name: campaign.name.clone(),
            status: campaign.status,
            total: campaign.total(),
            counters: campaign.counters,
            cursor: campaign.cursor,
            pause_reason: campaign.pause_reason.clone(),
            error_message: campaign.error_message.clone(),
            metrics: campaign.metrics.clone(),
            risk: governor.current_risk(),
            detection_rate: governor.detection_rate(),
        }
    }
}

enum TargetResult {
    Extracted(RawRecord),
    Skipped,
    Exhausted,
}

#[derive(Default)]
struct Running {
    active: HashSet<CampaignId>,
    pause_requests: HashSet<CampaignId>,
}

/// Removes a campaign from the running set when its run ends.
struct RunGuard {
    running: Arc<Mutex<Running>>,
    id: CampaignId,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        running.active.remove(&self.id);
        running.pause_requests.remove(&self.id);
    }
}

/// Drives campaigns through extraction, scoring, qualification and synthesis.
///
/// The pool, egress rotator and governor are shared handles; several runners
/// (or several campaigns on one runner) may use the same instances.
pub struct PipelineRunner<S: BrowsingSession> {
    store: Arc<dyn CampaignStore>,
    pool: SessionPool<S>,
    egress: EgressRotator,
    governor: RiskGovernor,
    extractor: Arc<dyn Extractor<S>>,
    scorer: Arc<dyn Scorer>,
    pacer: Pacer,
    settings: RunnerSettings,
    running: Arc<Mutex<Running>>,
}

impl<S: BrowsingSession> Clone for PipelineRunner<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            pool: self.pool.clone(),
            egress: self.egress.clone(),
            governor: self.governor.clone(),
            extractor: Arc::clone(&self.extractor),
            scorer: Arc::clone(&self.scorer),
            pacer: self.pacer.clone(),
            settings: self.settings.clone(),
            running: Arc::clone(&self.running),
        }
    }
}

impl<S: BrowsingSession> PipelineRunner<S> {
    /// Create a runner with default limits and pacing.
    #[must_use]
    pub fn new(
        store: Arc<dyn CampaignStore>,
        pool: SessionPool<S>,
        egress: EgressRotator,
        governor: RiskGovernor,
        extractor: Arc<dyn Extractor<S>>,
        scorer: Arc<dyn Scorer>,
    ) -> Self {
        let defaults = AppConfig::default();
        Self {
            store,
            pool,
            egress,
            governor,
            extractor,
            scorer,
            pacer: Pacer::new(defaults.pacing),
            settings: RunnerSettings::from(&defaults.campaign),
            running: Arc::default(),
        }
    }

    /// Take limits and pacing from configuration.
    #[must_use]
    pub fn with_config(self, config: &AppConfig) -> Self {
        self.with_settings(RunnerSettings::from(&config.campaign))
            .with_pacer(Pacer::new(config.pacing.clone()))
    }

    /// Override the runner limits.
    #[must_use]
    pub fn with_settings(mut self, settings: RunnerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Override the pacer.
    #[must_use]
    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    /// The governor this runner consults.
    #[must_use]
    pub fn governor(&self) -> &RiskGovernor {
        &self.governor
    }

    /// Create and persist a campaign in `planning`.
    pub async fn submit(&self, spec: CampaignSpec) -> Result<Campaign> {
        let campaign = Campaign::from_spec(spec)?;
        self.store.save_campaign(&campaign).await?;
        tracing::info!(
            campaign = %campaign.id,
            targets = campaign.targets.len(),
            level = %campaign.stealth_level,
            "campaign submitted"
        );
        Ok(campaign)
    }

    /// Start a `planning` campaign and run it until it pauses or finishes.
    pub async fn execute(&self, id: &CampaignId) -> Result<CampaignReport> {
        let _guard = self.claim(id)?;
        let mut campaign = self.load(id).await?;
        if campaign.status != CampaignStatus::Planning {
            return Err(CampaignError::InvalidTransition {
                id: id.clone(),
                status: campaign.status,
                action: "execute",
            });
        }

        campaign.status = CampaignStatus::Active;
        campaign.started_at = Some(Utc::now());
        self.store.save_campaign(&campaign).await?;
        tracing::info!(campaign = %id, "campaign started");

        self.drive(campaign).await
    }

    /// Continue a `paused` campaign from its cursor.
    ///
    /// Refused while the governor's risk is at or above the resume threshold.
    pub async fn resume(&self, id: &CampaignId) -> Result<CampaignReport> {
        let _guard = self.claim(id)?;
        let mut campaign = self.load(id).await?;
        if campaign.status != CampaignStatus::Paused {
            return Err(CampaignError::InvalidTransition {
                id: id.clone(),
                status: campaign.status,
                action: "resume",
            });
        }
        if !self.governor.resume_allowed() {
            return Err(CampaignError::RiskTooHigh {
                risk: self.governor.current_risk(),
                threshold: self.governor.resume_threshold(),
            });
        }

        campaign.status = CampaignStatus::Active;
        campaign.pause_reason = None;
        self.store.save_campaign(&campaign).await?;
        tracing::info!(campaign = %id, cursor = campaign.cursor, "campaign resumed");

        self.drive(campaign).await
    }

    /// Ask a running campaign to pause at its next batch boundary.
    pub fn request_pause(&self, id: &CampaignId) -> Result<()> {
        let mut running = self.lock_running();
        if !running.active.contains(id) {
            return Err(CampaignError::NotRunning(id.clone()));
        }
        running.pause_requests.insert(id.clone());
        tracing::info!(campaign = %id, "pause requested");
        Ok(())
    }

    /// Current report for a stored campaign.
    pub async fn report(&self, id: &CampaignId) -> Result<CampaignReport> {
        let campaign = self.load(id).await?;
        Ok(CampaignReport::new(&campaign, &self.governor))
    }

    fn lock_running(&self) -> MutexGuard<'_, Running> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(&self, id: &CampaignId) -> Result<RunGuard> {
        let mut running = self.lock_running();
        if running.active.contains(id) {
            return Err(CampaignError::AlreadyRunning(id.clone()));
        }
        if running.active.len() >= self.settings.max_concurrent_campaigns {
            return Err(CampaignError::AtCapacity {
                max: self.settings.max_concurrent_campaigns,
            });
        }
        running.active.insert(id.clone());
        Ok(RunGuard {
            running: Arc::clone(&self.running),
            id: id.clone(),
        })
    }

    fn take_pause_request(&self, id: &CampaignId) -> bool {
        self.lock_running().pause_requests.remove(id)
    }

    async fn load(&self, id: &CampaignId) -> Result<Campaign> {
        self.store
            .load_campaign(id)
            .await?
            .ok_or_else(|| CampaignError::NotFound(id.clone()))
    }

    async fn drive(&self, mut campaign: Campaign) -> Result<CampaignReport> {
        match self.run(&mut campaign).await {
            Ok(()) => Ok(CampaignReport::new(&campaign, &self.governor)),
            Err(fault) => Err(self.abort(campaign, &fault).await),
        }
    }

    async fn abort(&self, mut campaign: Campaign, fault: &CampaignError) -> CampaignError {
        let reason = fault.to_string();
        tracing::error!(campaign = %campaign.id, error = %reason, "campaign failed");

        campaign.status = CampaignStatus::Failed;
        campaign.error_message = Some(reason.clone());
        campaign.completed_at = Some(Utc::now());
        if let Err(e) = self.store.save_campaign(&campaign).await {
            tracing::error!(campaign = %campaign.id, error = %e, "could not persist failed campaign");
        }

        CampaignError::Aborted {
            report: Box::new(CampaignReport::new(&campaign, &self.governor)),
            reason,
        }
    }

    async fn run(&self, campaign: &mut Campaign) -> Result<()> {
        if let Some(reason) = self.extract_all(campaign).await? {
            campaign.status = CampaignStatus::Paused;
            campaign.pause_reason = Some(reason.to_string());
            self.store.save_campaign(campaign).await?;
            tracing::warn!(
                campaign = %campaign.id,
                reason,
                cursor = campaign.cursor,
                "campaign paused"
            );
            return Ok(());
        }

        let (scored, leads) = self.score_and_qualify(campaign).await?;
        campaign.check_invariants()?;

        campaign.status = CampaignStatus::Completed;
        campaign.completed_at = Some(Utc::now());
        campaign.metrics = Some(intelligence::compute_metrics(campaign, &scored, &leads));
        self.store.save_campaign(campaign).await?;

        tracing::info!(
            campaign = %campaign.id,
            processed = campaign.counters.processed,
            succeeded = campaign.counters.succeeded,
            qualified = campaign.counters.qualified,
            high_value = campaign.counters.high_value,
            "campaign completed"
        );
        Ok(())
    }

    /// Batch loop. Returns a pause reason if the campaign has to stop early.
    async fn extract_all(&self, campaign: &mut Campaign) -> Result<Option<&'static str>> {
        let total = campaign.targets.len();

        while campaign.cursor < total {
            let policy = self.governor.throttle_policy(campaign.stealth_level);
            if policy.paused {
                return Ok(Some(PAUSE_RISK));
            }
            if self.take_pause_request(&campaign.id) {
                return Ok(Some(PAUSE_REQUESTED));
            }
            if self.governor.rotation_due() {
                self.egress.rotate();
                self.governor.mark_rotated();
            }

            let batch_end = (campaign.cursor + policy.batch_size).min(total);
            tracing::debug!(
                campaign = %campaign.id,
                from = campaign.cursor,
                to = batch_end,
                multiplier = policy.delay_multiplier,
                "starting batch"
            );

            while campaign.cursor < batch_end {
                if self.governor.is_paused() {
                    return Ok(Some(PAUSE_RISK));
                }

                let target = campaign.targets[campaign.cursor].clone();
                match self
                    .process_target(&campaign.id, &target, policy.delay_multiplier)
                    .await?
                {
                    TargetResult::Extracted(record) => {
                        self.store.save_raw_record(&campaign.id, &record).await?;
                        campaign.counters.succeeded += 1;
                    }
                    TargetResult::Skipped => {}
                    TargetResult::Exhausted => return Ok(Some(PAUSE_RESOURCES)),
                }

                campaign.counters.processed += 1;
                campaign.cursor += 1;
                campaign.check_invariants()?;
                self.store.save_campaign(campaign).await?;
            }

            if let Some(rate) = self.governor.detection_alert() {
                tracing::warn!(
                    campaign = %campaign.id,
                    detection_rate = rate,
                    risk = self.governor.current_risk(),
                    "security alert: detection rate above threshold"
                );
            }

            if campaign.cursor < total {
                self.pacer.between_batches(policy.delay_multiplier).await;
            }
        }

        Ok(None)
    }

    async fn process_target(
        &self,
        campaign_id: &CampaignId,
        target: &TargetRef,
        multiplier: f64,
    ) -> Result<TargetResult> {
        let mut attempt = 0;
        let mut failures = 0;
        let mut waits = 0;

        loop {
            attempt += 1;
            self.pacer.before_target(multiplier).await;
            let started_at = Utc::now();

            let (session, identity) = match self.acquire_resources().await {
                Ok(resources) => resources,
                Err(detail) => {
                    self.log_operation(
                        campaign_id,
                        target,
                        attempt,
                        None,
                        OperationOutcome::Unavailable,
                        Some(detail),
                        started_at,
                    )
                    .await?;
                    if waits >= self.settings.max_resource_waits {
                        return Ok(TargetResult::Exhausted);
                    }
                    waits += 1;
                    continue;
                }
            };

            let result = self
                .extractor
                .extract(target, &session, identity.identity())
                .await;
            let used = Some((session.id().to_string(), identity.id().to_string()));

            let (outcome, detail, next) = match result {
                Ok(record) => {
                    self.governor.observe(Outcome::Success);
                    self.egress.report_outcome(identity, true);
                    self.pool.release(session);
                    (OperationOutcome::Success, None, Some(TargetResult::Extracted(record)))
                }
                Err(ExtractionError::Detected(detail)) => {
                    self.governor.observe(Outcome::Detected);
                    let identity_id = identity.id().to_string();
                    self.egress.report_outcome(identity, false);
                    if let Err(e) = self.egress.deactivate(&identity_id) {
                        tracing::warn!(identity = %identity_id, error = %e, "could not deactivate identity");
                    }
                    self.pool.retire(session);
                    tracing::warn!(target_ref = %target, identity = %identity_id, "detection signal");
                    (OperationOutcome::Detected, Some(detail), Some(TargetResult::Skipped))
                }
                Err(e) => {
                    self.governor.observe(Outcome::Failure);
                    self.egress.report_outcome(identity, false);
                    self.pool.release(session);
                    failures += 1;
                    let retry = e.is_retryable() && failures <= self.settings.max_target_retries;
                    let outcome = if e.is_retryable() {
                        OperationOutcome::Transient
                    } else {
                        OperationOutcome::Permanent
                    };
                    tracing::debug!(target_ref = %target, attempt, retry, error = %e, "extraction failed");
                    (outcome, Some(e.to_string()), (!retry).then_some(TargetResult::Skipped))
                }
            };

            self.log_operation(campaign_id, target, attempt, used, outcome, detail, started_at)
                .await?;

            if let Some(result) = next {
                return Ok(result);
            }
        }
    }

    /// Pick an identity, then a session bound to its route.
    ///
    /// No session is touched when egress is exhausted. If no session is free
    /// the identity lease is dropped unreported.
    async fn acquire_resources(
        &self,
    ) -> std::result::Result<(SessionLease<S>, EgressLease), String> {
        let identity = self.egress.select().map_err(|e| e.to_string())?;
        let session = self
            .pool
            .acquire(&identity.route())
            .await
            .map_err(|e| e.to_string())?;
        Ok((session, identity))
    }

    #[allow(clippy::too_many_arguments)]
    async fn log_operation(
        &self,
        campaign_id: &CampaignId,
        target: &TargetRef,
        attempt: u32,
        used: Option<(String, String)>,
        outcome: OperationOutcome,
        detail: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        let (session_id, egress_id) = used.unzip();
        let operation = OperationRecord {
            campaign_id: campaign_id.clone(),
            target: target.clone(),
            attempt,
            egress_id,
            session_id,
            outcome,
            detail,
            risk_after: self.governor.current_risk(),
            started_at,
            finished_at: Utc::now(),
        };
        self.store.record_operation(&operation).await?;
        Ok(())
    }

    /// Score every extracted record, qualify it and synthesize leads.
    async fn score_and_qualify(
        &self,
        campaign: &mut Campaign,
    ) -> Result<(Vec<ScoredRecord>, Vec<LeadIntelligence>)> {
        let records = self.store.raw_records(&campaign.id).await?;
        let threshold = campaign.qualification_threshold;

        campaign.counters.qualified = 0;
        campaign.counters.high_value = 0;
        let mut scored_all = Vec::with_capacity(records.len());
        let mut leads = Vec::new();

        for record in records {
            let scores = match self.scorer.score(&record) {
                Ok(scores) => scores,
                Err(e) => {
                    tracing::warn!(target_ref = %record.target, error = %e, "scoring failed, skipping record");
                    continue;
                }
            };
            if let Err(e) = scores.validate() {
                tracing::warn!(target_ref = %record.target, error = %e, "scores out of range, skipping record");
                continue;
            }

            let scored = ScoredRecord::new(
                campaign.id.clone(),
                record,
                scores,
                self.scorer.model_version(),
            );
            self.store.save_record(&scored).await?;

            if intelligence::qualifies(&scored.scores, threshold) {
                campaign.counters.qualified += 1;
                if intelligence::is_high_value(
                    &scored.scores,
                    threshold,
                    self.settings.high_value_threshold,
                ) {
                    campaign.counters.high_value += 1;
                }
                let lead = intelligence::synthesize(&scored, threshold);
                self.store.save_intelligence(&lead).await?;
                leads.push(lead);
            }
            scored_all.push(scored);
        }

        tracing::info!(
            campaign = %campaign.id,
            scored = scored_all.len(),
            qualified = leads.len(),
            "scoring complete"
        );
        Ok((scored_all, leads))
    }
}
