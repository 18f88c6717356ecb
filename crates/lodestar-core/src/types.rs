//! Shared types used across Lodestar.
//!
//! This module defines the campaign data model: validated newtypes for
//! identifiers, the campaign state machine, extracted and scored records,
//! lead intelligence and the per-attempt operation log.

use crate::error::LodestarError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

/// Newtype for campaign identifiers with validation.
///
/// Campaign IDs look like `CMP_20261016_142501_9f3a11c2`: creation date and
/// time (UTC) followed by eight lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CampaignId(String);

impl CampaignId {
    /// Create a new `CampaignId` from a string.
    ///
    /// # Errors
    /// Returns error if the ID doesn't match the required format.
    pub fn new(id: impl Into<String>) -> Result<Self, LodestarError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Generate a fresh identifier stamped with the current time.
    #[must_use]
    pub fn generate() -> Self {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("CMP_{stamp}_{}", &suffix[..8]))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<(), LodestarError> {
        static CAMPAIGN_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = CAMPAIGN_REGEX
            .get_or_init(|| Regex::new(r"^CMP_\d{8}_\d{6}_[0-9a-f]{8}$").expect("valid regex"));

        if regex.is_match(id) {
            Ok(())
        } else {
            Err(LodestarError::Validation(format!(
                "invalid campaign ID: expected CMP_YYYYMMDD_HHMMSS_xxxxxxxx, got '{id}'"
            )))
        }
    }
}

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for CampaignId {
    type Error = LodestarError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CampaignId> for String {
    fn from(id: CampaignId) -> Self {
        id.0
    }
}

/// Reference to one external profile to be extracted (usually a URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetRef(String);

impl TargetRef {
    /// Create a target reference, trimming surrounding whitespace.
    ///
    /// # Errors
    /// Returns error if the reference is empty after trimming.
    pub fn new(target: impl AsRef<str>) -> Result<Self, LodestarError> {
        let trimmed = target.as_ref().trim();
        if trimmed.is_empty() {
            return Err(LodestarError::Validation(
                "target reference must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable short digest of the reference, used to build lead identifiers.
    #[must_use]
    pub fn digest(&self) -> String {
        let id = uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, self.0.as_bytes());
        id.simple().to_string()[..12].to_string()
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for TargetRef {
    type Error = LodestarError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TargetRef> for String {
    fn from(target: TargetRef) -> Self {
        target.0
    }
}

/// Campaign-wide caution setting, 1 (least) to 5 (most).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct StealthLevel(u8);

impl StealthLevel {
    /// Lowest caution level.
    pub const MIN: Self = Self(1);
    /// Highest caution level.
    pub const MAX: Self = Self(5);

    /// Create a stealth level.
    ///
    /// # Errors
    /// Returns error if `level` is outside `1..=5`.
    pub fn new(level: u8) -> Result<Self, LodestarError> {
        if (1..=5).contains(&level) {
            Ok(Self(level))
        } else {
            Err(LodestarError::Validation(format!(
                "stealth level must be between 1 and 5, got {level}"
            )))
        }
    }

    /// Numeric value of the level.
    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based index into per-level tables.
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl Default for StealthLevel {
    fn default() -> Self {
        Self(3)
    }
}

impl TryFrom<u8> for StealthLevel {
    type Error = LodestarError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StealthLevel> for u8 {
    fn from(level: StealthLevel) -> Self {
        level.0
    }
}

impl fmt::Display for StealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// Submitted, never executed
    Planning,
    /// Batch loop running
    Active,
    /// Suspended between batches, resumable
    Paused,
    /// All stages finished
    Completed,
    /// Aborted by an orchestration fault
    Failed,
}

impl CampaignStatus {
    /// Whether the status is terminal (no further transitions).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Parse from the stored string representation.
    ///
    /// # Errors
    /// Returns error for unknown status strings.
    pub fn parse(s: &str) -> Result<Self, LodestarError> {
        match s {
            "planning" => Ok(Self::Planning),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(LodestarError::Validation(format!(
                "unknown campaign status '{other}'"
            ))),
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Planning => "planning",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Progress counters for a campaign.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignCounters {
    /// Targets whose extraction finished (successfully or not)
    pub processed: u32,
    /// Targets extracted successfully
    pub succeeded: u32,
    /// Records passing the qualification threshold
    pub qualified: u32,
    /// Qualified records at or above the high-value threshold
    pub high_value: u32,
}

/// Final campaign figures computed on completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignMetrics {
    /// succeeded / total
    pub success_rate: f64,
    /// qualified / succeeded
    pub qualification_rate: f64,
    /// `high_value` / qualified
    pub high_value_rate: f64,
    /// Mean priority over synthesized leads
    pub mean_priority: f64,
    /// Lead count per tier
    pub tier_distribution: BTreeMap<Tier, u32>,
    /// Wall-clock seconds between start and completion
    pub elapsed_secs: i64,
}

/// Campaign submission request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSpec {
    /// Human-readable name
    pub name: String,
    /// Targets in processing order
    pub targets: Vec<TargetRef>,
    /// Caution level
    pub stealth_level: StealthLevel,
    /// Minimum quality score for a record to become a lead
    pub qualification_threshold: f64,
}

/// A lead-generation campaign and its resumable execution state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    /// Unique identifier
    pub id: CampaignId,
    /// Human-readable name
    pub name: String,
    /// Deduplicated targets in processing order
    pub targets: Vec<TargetRef>,
    /// Caution level
    pub stealth_level: StealthLevel,
    /// Minimum quality score for qualification
    pub qualification_threshold: f64,
    /// Current lifecycle status
    pub status: CampaignStatus,
    /// Progress counters
    pub counters: CampaignCounters,
    /// Index of the next unprocessed target
    pub cursor: usize,
    /// When the campaign was submitted
    pub created_at: DateTime<Utc>,
    /// When execution first started
    pub started_at: Option<DateTime<Utc>>,
    /// When the campaign reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Why the campaign is paused, if it is
    pub pause_reason: Option<String>,
    /// Cause of failure, if it failed
    pub error_message: Option<String>,
    /// Final metrics, once completed
    pub metrics: Option<CampaignMetrics>,
}

impl Campaign {
    /// Create a campaign in `planning` state from a submission.
    ///
    /// Duplicate targets are dropped, keeping the first occurrence.
    ///
    /// # Errors
    /// Returns error if the qualification threshold is outside `[0, 1]`.
    pub fn from_spec(spec: CampaignSpec) -> Result<Self, LodestarError> {
        if !(0.0..=1.0).contains(&spec.qualification_threshold) {
            return Err(LodestarError::Validation(format!(
                "qualification threshold must be within [0, 1], got {}",
                spec.qualification_threshold
            )));
        }

        let mut seen = HashSet::new();
        let targets: Vec<TargetRef> = spec
            .targets
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();

        Ok(Self {
            id: CampaignId::generate(),
            name: spec.name,
            targets,
            stealth_level: spec.stealth_level,
            qualification_threshold: spec.qualification_threshold,
            status: CampaignStatus::Planning,
            counters: CampaignCounters::default(),
            cursor: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            pause_reason: None,
            error_message: None,
            metrics: None,
        })
    }

    /// Total number of targets.
    #[must_use]
    pub fn total(&self) -> u32 {
        u32::try_from(self.targets.len()).unwrap_or(u32::MAX)
    }

    /// Targets not yet processed, in order.
    #[must_use]
    pub fn remaining_targets(&self) -> &[TargetRef] {
        &self.targets[self.cursor.min(self.targets.len())..]
    }

    /// Check the counter invariants.
    ///
    /// # Errors
    /// Returns a validation error naming the violated invariant.
    pub fn check_invariants(&self) -> Result<(), LodestarError> {
        let c = &self.counters;
        if c.processed > self.total() {
            return Err(LodestarError::Validation(format!(
                "processed ({}) exceeds total ({})",
                c.processed,
                self.total()
            )));
        }
        if c.succeeded > c.processed {
            return Err(LodestarError::Validation(format!(
                "succeeded ({}) exceeds processed ({})",
                c.succeeded, c.processed
            )));
        }
        if c.qualified > c.succeeded {
            return Err(LodestarError::Validation(format!(
                "qualified ({}) exceeds succeeded ({})",
                c.qualified, c.succeeded
            )));
        }
        if c.high_value > c.qualified {
            return Err(LodestarError::Validation(format!(
                "high-value ({}) exceeds qualified ({})",
                c.high_value, c.qualified
            )));
        }
        if usize::try_from(c.processed).ok() != Some(self.cursor) {
            return Err(LodestarError::Validation(format!(
                "cursor ({}) out of step with processed ({})",
                self.cursor, c.processed
            )));
        }
        Ok(())
    }
}

/// How a record was extracted and how much to trust it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMeta {
    /// Extraction method tag reported by the extractor
    pub method: String,
    /// Fraction of expected fields present, in `[0, 1]`
    pub completeness: f64,
    /// Extractor confidence, in `[0, 1]`
    pub confidence: f64,
    /// When the record was extracted
    pub extracted_at: DateTime<Utc>,
}

/// Fields extracted for one target. Immutable once returned by an extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Target this record was extracted from
    pub target: TargetRef,
    /// Display name
    pub name: String,
    /// Headline or job title
    pub title: Option<String>,
    /// Company or organisation
    pub affiliation: Option<String>,
    /// Free-text location
    pub location: Option<String>,
    /// Free-text summary
    pub summary: Option<String>,
    /// Positions held, most recent first
    #[serde(default)]
    pub experience: Vec<String>,
    /// Listed skills
    #[serde(default)]
    pub skills: Vec<String>,
    /// Discovered email addresses
    #[serde(default)]
    pub emails: Vec<String>,
    /// Discovered phone numbers
    #[serde(default)]
    pub phones: Vec<String>,
    /// Any further key/value fields
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
    /// Extraction metadata
    pub meta: ExtractionMeta,
}

/// The four independent model scores, each within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSet {
    /// Overall lead quality
    pub quality: f64,
    /// Investment propensity
    pub propensity: f64,
    /// Engagement likelihood
    pub engagement: f64,
    /// Conversion probability
    pub conversion: f64,
}

impl ScoreSet {
    /// Create a score set.
    ///
    /// # Errors
    /// Returns error if any score is NaN or outside `[0, 1]`.
    pub fn new(
        quality: f64,
        propensity: f64,
        engagement: f64,
        conversion: f64,
    ) -> Result<Self, LodestarError> {
        let scores = Self {
            quality,
            propensity,
            engagement,
            conversion,
        };
        scores.validate()?;
        Ok(scores)
    }

    /// Check every score lies within `[0, 1]`.
    ///
    /// # Errors
    /// Returns error naming the first out-of-range score.
    pub fn validate(&self) -> Result<(), LodestarError> {
        for (name, value) in [
            ("quality", self.quality),
            ("propensity", self.propensity),
            ("engagement", self.engagement),
            ("conversion", self.conversion),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(LodestarError::Validation(format!(
                    "{name} score must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Discretized lead quality bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// quality < 0.6
    Bronze,
    /// 0.6 <= quality < 0.75
    Silver,
    /// 0.75 <= quality < 0.9
    Gold,
    /// quality >= 0.9
    Platinum,
}

impl Tier {
    /// Classify a quality score.
    #[must_use]
    pub fn from_quality(quality: f64) -> Self {
        if quality >= 0.9 {
            Self::Platinum
        } else if quality >= 0.75 {
            Self::Gold
        } else if quality >= 0.6 {
            Self::Silver
        } else {
            Self::Bronze
        }
    }

    /// Parse from the stored string representation.
    ///
    /// # Errors
    /// Returns error for unknown tier strings.
    pub fn parse(s: &str) -> Result<Self, LodestarError> {
        match s {
            "bronze" => Ok(Self::Bronze),
            "silver" => Ok(Self::Silver),
            "gold" => Ok(Self::Gold),
            "platinum" => Ok(Self::Platinum),
            other => Err(LodestarError::Validation(format!("unknown tier '{other}'"))),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Platinum => "platinum",
        };
        write!(f, "{s}")
    }
}

/// A raw record with model scores attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    /// Owning campaign
    pub campaign_id: CampaignId,
    /// The extracted record
    pub record: RawRecord,
    /// Model scores
    pub scores: ScoreSet,
    /// Tier derived from the quality score
    pub tier: Tier,
    /// Scorer model version
    pub model_version: String,
    /// When scoring happened
    pub scored_at: DateTime<Utc>,
}

impl ScoredRecord {
    /// Attach scores to a record, deriving the tier.
    #[must_use]
    pub fn new(
        campaign_id: CampaignId,
        record: RawRecord,
        scores: ScoreSet,
        model_version: impl Into<String>,
    ) -> Self {
        Self {
            campaign_id,
            tier: Tier::from_quality(scores.quality),
            record,
            scores,
            model_version: model_version.into(),
            scored_at: Utc::now(),
        }
    }
}

/// Whether a scored record made it through qualification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualificationStatus {
    /// Quality at or above the campaign threshold
    Qualified,
    /// Quality below the campaign threshold
    Unqualified,
}

/// Outreach channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactChannel {
    /// Direct email
    Email,
    /// Phone call
    Phone,
    /// Message through the source platform
    PlatformMessage,
}

/// Tone of the first approach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approach {
    /// Advisory, for the strongest leads
    Consultative,
    /// Informational introduction
    Informational,
}

/// How much the outreach should be tailored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Personalization {
    /// Fully tailored messaging
    High,
    /// Template with a few tailored lines
    Medium,
}

/// Contact-strategy payload attached to a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactStrategy {
    /// Preferred channel
    pub primary_channel: ContactChannel,
    /// Fallback channel
    pub secondary_channel: ContactChannel,
    /// Tone of the approach
    pub approach: Approach,
    /// Level of tailoring
    pub personalization: Personalization,
    /// Talking points
    pub value_propositions: Vec<String>,
    /// Closing ask
    pub call_to_action: String,
}

/// Ranked lead synthesized from a qualifying scored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadIntelligence {
    /// `LEAD_<target digest>_<campaign id>`
    pub lead_id: String,
    /// Owning campaign
    pub campaign_id: CampaignId,
    /// Target the lead came from
    pub target: TargetRef,
    /// Display name of the lead
    pub name: String,
    /// Tier of the underlying record
    pub tier: Tier,
    /// Weighted priority score
    pub priority_score: f64,
    /// Qualification outcome
    pub qualification_status: QualificationStatus,
    /// How to reach out
    pub contact_strategy: ContactStrategy,
    /// Confidence carried over from extraction
    pub confidence: f64,
    /// Components that contributed to the lead
    pub data_sources: Vec<String>,
    /// Extraction method of the underlying record
    pub extraction_method: String,
    /// When the lead was synthesized
    pub created_at: DateTime<Utc>,
}

impl LeadIntelligence {
    /// Lead identifier for a (campaign, target) pair.
    #[must_use]
    pub fn lead_id_for(campaign_id: &CampaignId, target: &TargetRef) -> String {
        format!("LEAD_{}_{}", target.digest(), campaign_id)
    }
}

/// Outcome of a single extraction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationOutcome {
    /// Record extracted
    Success,
    /// Retryable failure
    Transient,
    /// Non-retryable failure
    Permanent,
    /// Platform flagged the session or identity
    Detected,
    /// No session or egress identity was available
    Unavailable,
}

impl fmt::Display for OperationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Detected => "detected",
            Self::Unavailable => "unavailable",
        };
        write!(f, "{s}")
    }
}

/// Log entry for one extraction attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Owning campaign
    pub campaign_id: CampaignId,
    /// Target attempted
    pub target: TargetRef,
    /// 1-based attempt number for this target
    pub attempt: u32,
    /// Egress identity used, if one was leased
    pub egress_id: Option<String>,
    /// Session used, if one was leased
    pub session_id: Option<String>,
    /// What happened
    pub outcome: OperationOutcome,
    /// Failure detail, if any
    pub detail: Option<String>,
    /// Risk estimate after observing the outcome
    pub risk_after: f64,
    /// Attempt start
    pub started_at: DateTime<Utc>,
    /// Attempt end
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(targets: &[&str]) -> CampaignSpec {
        CampaignSpec {
            name: "test".to_string(),
            targets: targets
                .iter()
                .map(|t| TargetRef::new(t).expect("valid target"))
                .collect(),
            stealth_level: StealthLevel::default(),
            qualification_threshold: 0.6,
        }
    }

    #[test]
    fn test_campaign_id_generate_is_valid() {
        let id = CampaignId::generate();
        assert!(CampaignId::new(id.as_str()).is_ok(), "generated {id}");
        assert_ne!(id, CampaignId::generate());
    }

    #[test]
    fn test_campaign_id_invalid() {
        for id in ["", "CMP_", "cmp_20261016_142501_9f3a11c2", "CMP_2026_1425_9f3a11c2"] {
            assert!(CampaignId::new(id).is_err(), "should fail for: {id}");
        }
        assert!(CampaignId::new("CMP_20261016_142501_9f3a11c2").is_ok());
    }

    #[test]
    fn test_campaign_id_serde_validates() {
        let err = serde_json::from_str::<CampaignId>("\"nope\"");
        assert!(err.is_err());
    }

    #[test]
    fn test_target_ref_trims_and_rejects_empty() {
        let t = TargetRef::new("  https://example.com/in/a  ").expect("valid target");
        assert_eq!(t.as_str(), "https://example.com/in/a");
        assert!(TargetRef::new("   ").is_err());
    }

    #[test]
    fn test_target_digest_is_stable() {
        let a = TargetRef::new("https://example.com/in/a").expect("valid target");
        let b = TargetRef::new("https://example.com/in/a").expect("valid target");
        let c = TargetRef::new("https://example.com/in/c").expect("valid target");
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_eq!(a.digest().len(), 12);
    }

    #[test]
    fn test_stealth_level_bounds() {
        assert!(StealthLevel::new(0).is_err());
        assert!(StealthLevel::new(6).is_err());
        assert_eq!(StealthLevel::new(5).expect("valid level").index(), 4);
        assert!(StealthLevel::MIN < StealthLevel::MAX);
    }

    #[test]
    fn test_tier_from_quality() {
        assert_eq!(Tier::from_quality(0.92), Tier::Platinum);
        assert_eq!(Tier::from_quality(0.80), Tier::Gold);
        assert_eq!(Tier::from_quality(0.65), Tier::Silver);
        assert_eq!(Tier::from_quality(0.10), Tier::Bronze);
        assert_eq!(Tier::from_quality(0.9), Tier::Platinum);
        assert_eq!(Tier::from_quality(0.75), Tier::Gold);
        assert_eq!(Tier::from_quality(0.6), Tier::Silver);
    }

    #[test]
    fn test_score_set_rejects_out_of_range() {
        assert!(ScoreSet::new(0.5, 0.5, 0.5, 0.5).is_ok());
        assert!(ScoreSet::new(1.2, 0.5, 0.5, 0.5).is_err());
        assert!(ScoreSet::new(0.5, -0.1, 0.5, 0.5).is_err());
        assert!(ScoreSet::new(0.5, 0.5, f64::NAN, 0.5).is_err());
    }

    #[test]
    fn test_campaign_from_spec_dedups_targets() {
        let campaign = Campaign::from_spec(spec(&["a", "b", "a", "c", "b"])).expect("campaign");
        let targets: Vec<&str> = campaign.targets.iter().map(TargetRef::as_str).collect();
        assert_eq!(targets, vec!["a", "b", "c"]);
        assert_eq!(campaign.status, CampaignStatus::Planning);
        assert_eq!(campaign.total(), 3);
        assert!(campaign.check_invariants().is_ok());
    }

    #[test]
    fn test_campaign_rejects_bad_threshold() {
        let mut s = spec(&["a"]);
        s.qualification_threshold = 1.5;
        assert!(Campaign::from_spec(s).is_err());
    }

    #[test]
    fn test_campaign_invariants() {
        let mut campaign = Campaign::from_spec(spec(&["a", "b"])).expect("campaign");
        campaign.counters.processed = 2;
        campaign.cursor = 2;
        campaign.counters.succeeded = 1;
        campaign.counters.qualified = 1;
        assert!(campaign.check_invariants().is_ok());

        campaign.counters.qualified = 2;
        assert!(campaign.check_invariants().is_err());

        campaign.counters.qualified = 1;
        campaign.counters.processed = 3;
        assert!(campaign.check_invariants().is_err());
    }

    #[test]
    fn test_remaining_targets_follow_cursor() {
        let mut campaign = Campaign::from_spec(spec(&["a", "b", "c"])).expect("campaign");
        campaign.cursor = 2;
        assert_eq!(campaign.remaining_targets().len(), 1);
        assert_eq!(campaign.remaining_targets()[0].as_str(), "c");
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            CampaignStatus::Planning,
            CampaignStatus::Active,
            CampaignStatus::Paused,
            CampaignStatus::Completed,
            CampaignStatus::Failed,
        ] {
            assert_eq!(
                CampaignStatus::parse(&status.to_string()).expect("parse"),
                status
            );
        }
        assert!(CampaignStatus::Completed.is_terminal());
        assert!(!CampaignStatus::Paused.is_terminal());
    }

    #[test]
    fn test_lead_id_format() {
        let campaign_id = CampaignId::new("CMP_20261016_142501_9f3a11c2").expect("valid id");
        let target = TargetRef::new("https://example.com/in/a").expect("valid target");
        let lead_id = LeadIntelligence::lead_id_for(&campaign_id, &target);
        assert!(lead_id.starts_with("LEAD_"));
        assert!(lead_id.ends_with("_CMP_20261016_142501_9f3a11c2"));
    }
}
