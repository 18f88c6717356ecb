//! Campaign submission and inspection.

use crate::state::AppState;
use crate::targets::read_targets;
use anyhow::{anyhow, Context, Result};
use lodestar_core::{
    Campaign, CampaignId, CampaignSpec, CampaignStore, LeadIntelligence, StealthLevel, Tier,
};
use lodestar_db::operations::count_by_outcome;
use std::io::Write;
use std::path::Path;

/// Options for `lodestar submit`.
#[derive(Debug, Clone)]
pub struct SubmitOptions<'a> {
    /// Campaign name
    pub name: String,
    /// Stealth level, or the configured default
    pub stealth: Option<StealthLevel>,
    /// Qualification threshold, or the configured default
    pub threshold: Option<f64>,
    /// File listing the targets
    pub targets_file: &'a Path,
}

/// Create a `planning` campaign from a target list.
pub async fn submit(
    state: &AppState,
    options: SubmitOptions<'_>,
    out: &mut impl Write,
) -> Result<Campaign> {
    let targets = read_targets(options.targets_file)?;
    let defaults = &state.config.campaign;

    let campaign = Campaign::from_spec(CampaignSpec {
        name: options.name,
        targets,
        stealth_level: options.stealth.unwrap_or(defaults.default_stealth_level),
        qualification_threshold: options.threshold.unwrap_or(defaults.qualification_threshold),
    })?;

    state.store().save_campaign(&campaign).await?;
    tracing::info!(
        campaign = %campaign.id,
        targets = campaign.targets.len(),
        "campaign submitted"
    );

    writeln!(
        out,
        "{} ({} targets, stealth level {})",
        campaign.id,
        campaign.targets.len(),
        campaign.stealth_level
    )?;
    Ok(campaign)
}

/// List stored campaigns, newest first.
pub async fn list(state: &AppState, out: &mut impl Write) -> Result<()> {
    let campaigns = state.store().list_campaigns().await?;
    if campaigns.is_empty() {
        writeln!(out, "No campaigns")?;
        return Ok(());
    }

    writeln!(
        out,
        "{:<30} {:<10} {:>9} {:>9}  NAME",
        "ID", "STATUS", "PROGRESS", "QUALIFIED"
    )?;
    for c in &campaigns {
        writeln!(
            out,
            "{:<30} {:<10} {:>9} {:>9}  {}",
            c.id.to_string(),
            c.status.to_string(),
            format!("{}/{}", c.counters.processed, c.total()),
            c.counters.qualified,
            c.name
        )?;
    }
    Ok(())
}

/// Show one campaign in detail.
pub async fn show(state: &AppState, id: &CampaignId, json: bool, out: &mut impl Write) -> Result<()> {
    let campaign = load(state, id).await?;

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&campaign)?)?;
        return Ok(());
    }

    let c = &campaign.counters;
    writeln!(out, "Campaign:   {}", campaign.id)?;
    writeln!(out, "Name:       {}", campaign.name)?;
    writeln!(out, "Status:     {}", campaign.status)?;
    writeln!(out, "Stealth:    level {}", campaign.stealth_level)?;
    writeln!(out, "Threshold:  {:.2}", campaign.qualification_threshold)?;
    writeln!(out, "Progress:   {}/{} (cursor {})", c.processed, campaign.total(), campaign.cursor)?;
    writeln!(
        out,
        "Counters:   succeeded {}, qualified {}, high-value {}",
        c.succeeded, c.qualified, c.high_value
    )?;
    writeln!(out, "Created:    {}", campaign.created_at.to_rfc3339())?;
    if let Some(started) = campaign.started_at {
        writeln!(out, "Started:    {}", started.to_rfc3339())?;
    }
    if let Some(completed) = campaign.completed_at {
        writeln!(out, "Completed:  {}", completed.to_rfc3339())?;
    }
    if let Some(reason) = &campaign.pause_reason {
        writeln!(out, "Paused:     {reason}")?;
    }
    if let Some(error) = &campaign.error_message {
        writeln!(out, "Error:      {error}")?;
    }

    let attempts = count_by_outcome(state.db.pool(), id).await?;
    if !attempts.is_empty() {
        let summary: Vec<String> = attempts
            .iter()
            .map(|(outcome, count)| format!("{outcome} {count}"))
            .collect();
        writeln!(out, "Attempts:   {}", summary.join(", "))?;
    }

    if let Some(m) = &campaign.metrics {
        writeln!(out, "Metrics:")?;
        writeln!(out, "  success rate        {:.1}%", m.success_rate * 100.0)?;
        writeln!(out, "  qualification rate  {:.1}%", m.qualification_rate * 100.0)?;
        writeln!(out, "  high-value rate     {:.1}%", m.high_value_rate * 100.0)?;
        writeln!(out, "  mean priority       {:.3}", m.mean_priority)?;
        writeln!(out, "  elapsed             {}s", m.elapsed_secs)?;
        for (tier, count) in &m.tier_distribution {
            writeln!(out, "  {tier:<19} {count}")?;
        }
    }
    Ok(())
}

/// List a campaign's leads, highest priority first.
pub async fn leads(
    state: &AppState,
    id: &CampaignId,
    tier: Option<Tier>,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    load(state, id).await?;

    let leads: Vec<LeadIntelligence> = match tier {
        Some(tier) => lodestar_db::intelligence::get_leads_by_tier(state.db.pool(), id, tier).await?,
        None => state.store().intelligence(id).await?,
    };

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&leads)?)?;
        return Ok(());
    }

    if leads.is_empty() {
        writeln!(out, "No leads")?;
        return Ok(());
    }

    writeln!(out, "{:>8}  {:<9} {:<17} NAME", "PRIORITY", "TIER", "CHANNEL")?;
    for lead in &leads {
        let channel = serde_json::to_value(lead.contact_strategy.primary_channel)?;
        writeln!(
            out,
            "{:>8.3}  {:<9} {:<17} {}",
            lead.priority_score,
            lead.tier.to_string(),
            channel.as_str().unwrap_or_default(),
            lead.name
        )?;
    }
    Ok(())
}

async fn load(state: &AppState, id: &CampaignId) -> Result<Campaign> {
    state
        .store()
        .load_campaign(id)
        .await
        .context("failed to load campaign")?
        .ok_or_else(|| anyhow!("campaign not found: {id}"))
}
