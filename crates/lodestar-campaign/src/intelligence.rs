//! Qualification, priority scoring and lead synthesis.
//!
//! Everything here is pure: it takes scored records and campaign settings and
//! returns values, leaving persistence to the runner.

use chrono::Utc;
use lodestar_core::{
    Approach, Campaign, CampaignMetrics, ContactChannel, ContactStrategy, LeadIntelligence,
    Personalization, QualificationStatus, RawRecord, ScoreSet, ScoredRecord, Tier,
};
use std::collections::BTreeMap;

const QUALITY_WEIGHT: f64 = 0.4;
const CONVERSION_WEIGHT: f64 = 0.3;
const ENGAGEMENT_WEIGHT: f64 = 0.2;
const PROPENSITY_WEIGHT: f64 = 0.1;

const CONSULTATIVE_ABOVE: f64 = 0.8;
const HIGH_PERSONALIZATION_ABOVE: f64 = 0.7;

/// Weighted priority in `[0, 1]`.
#[must_use]
pub fn priority_score(scores: &ScoreSet) -> f64 {
    scores.quality * QUALITY_WEIGHT
        + scores.conversion * CONVERSION_WEIGHT
        + scores.engagement * ENGAGEMENT_WEIGHT
        + scores.propensity * PROPENSITY_WEIGHT
}

/// Quality at or above the campaign threshold.
#[must_use]
pub fn qualifies(scores: &ScoreSet, threshold: f64) -> bool {
    scores.quality >= threshold
}

/// Qualifying record whose quality also clears the high-value bar.
#[must_use]
pub fn is_high_value(scores: &ScoreSet, threshold: f64, high_value_threshold: f64) -> bool {
    qualifies(scores, threshold) && scores.quality >= high_value_threshold
}

/// How to approach the person behind a scored record.
#[must_use]
pub fn contact_strategy(scored: &ScoredRecord) -> ContactStrategy {
    let record = &scored.record;
    let quality = scored.scores.quality;

    let primary_channel = if !record.emails.is_empty() {
        ContactChannel::Email
    } else if !record.phones.is_empty() {
        ContactChannel::Phone
    } else {
        ContactChannel::PlatformMessage
    };
    let secondary_channel = if primary_channel == ContactChannel::Email {
        ContactChannel::PlatformMessage
    } else {
        ContactChannel::Email
    };

    ContactStrategy {
        primary_channel,
        secondary_channel,
        approach: if quality > CONSULTATIVE_ABOVE {
            Approach::Consultative
        } else {
            Approach::Informational
        },
        personalization: if quality > HIGH_PERSONALIZATION_ABOVE {
            Personalization::High
        } else {
            Personalization::Medium
        },
        value_propositions: value_propositions(record, &scored.scores),
        call_to_action: call_to_action(scored.tier).to_string(),
    }
}

fn value_propositions(record: &RawRecord, scores: &ScoreSet) -> Vec<String> {
    let mut propositions = Vec::new();

    if let Some(affiliation) = record.affiliation.as_deref().filter(|a| !a.is_empty()) {
        propositions.push(format!("Outcomes relevant to {affiliation}"));
    }
    if let Some(title) = record.title.as_deref().filter(|t| !t.is_empty()) {
        propositions.push(format!("Tailored for the {title} role"));
    }

    // Lead with whichever signal is strongest.
    let dominant = [
        (scores.propensity, "Investment opportunities matched to stated interests"),
        (scores.engagement, "Peer insights and community access"),
        (scores.conversion, "Fast onboarding with a concrete first step"),
    ]
    .into_iter()
    .max_by(|a, b| a.0.total_cmp(&b.0))
    .map(|(_, text)| text);
    if let Some(text) = dominant {
        propositions.push(text.to_string());
    }

    propositions
}

fn call_to_action(tier: Tier) -> &'static str {
    match tier {
        Tier::Platinum => "Schedule a one-to-one strategy session",
        Tier::Gold => "Book a short introductory call",
        Tier::Silver => "Share a relevant case study",
        Tier::Bronze => "Add to the nurture sequence",
    }
}

/// Build the lead for a qualifying scored record.
#[must_use]
pub fn synthesize(scored: &ScoredRecord, threshold: f64) -> LeadIntelligence {
    let qualification_status = if qualifies(&scored.scores, threshold) {
        QualificationStatus::Qualified
    } else {
        QualificationStatus::Unqualified
    };

    LeadIntelligence {
        lead_id: LeadIntelligence::lead_id_for(&scored.campaign_id, &scored.record.target),
        campaign_id: scored.campaign_id.clone(),
        target: scored.record.target.clone(),
        name: scored.record.name.clone(),
        tier: scored.tier,
        priority_score: priority_score(&scored.scores),
        qualification_status,
        contact_strategy: contact_strategy(scored),
        confidence: scored.record.meta.confidence,
        data_sources: vec![
            "extraction".to_string(),
            format!("scoring:{}", scored.model_version),
            "qualification".to_string(),
        ],
        extraction_method: scored.record.meta.method.clone(),
        created_at: Utc::now(),
    }
}

/// Final metrics for a campaign from its counters, scores and leads.
///
/// Rates are zero when their denominator is zero.
#[must_use]
pub fn compute_metrics(
    campaign: &Campaign,
    scored: &[ScoredRecord],
    leads: &[LeadIntelligence],
) -> CampaignMetrics {
    let c = &campaign.counters;

    let mut tier_distribution = BTreeMap::new();
    for record in scored {
        *tier_distribution.entry(record.tier).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    let mean_priority = if leads.is_empty() {
        0.0
    } else {
        leads.iter().map(|l| l.priority_score).sum::<f64>() / leads.len() as f64
    };

    let elapsed_secs = campaign
        .started_at
        .map(|start| {
            (campaign.completed_at.unwrap_or_else(Utc::now) - start)
                .num_seconds()
                .max(0)
        })
        .unwrap_or(0);

    CampaignMetrics {
        success_rate: ratio(c.succeeded, campaign.total()),
        qualification_rate: ratio(c.qualified, c.succeeded),
        high_value_rate: ratio(c.high_value, c.qualified),
        mean_priority,
        tier_distribution,
        elapsed_secs,
    }
}

fn ratio(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        f64::from(numerator) / f64::from(denominator)
    }
}
