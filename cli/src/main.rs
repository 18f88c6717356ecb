//! `lodestar` binary.

use anyhow::Result;
use clap::{Parser, Subcommand};
use lodestar_cli::commands::{self, campaign::SubmitOptions};
use lodestar_cli::state::AppState;
use lodestar_core::{logging::init_tracing, CampaignId, LoggingConfig, StealthLevel, Tier};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "lodestar")]
#[command(about = "Risk-governed lead campaign orchestration")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "LODESTAR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Submit a campaign from a target list file
    Submit {
        /// Campaign name
        #[arg(long)]
        name: String,

        /// Stealth level 1-5
        #[arg(long, value_parser = parse_stealth)]
        stealth: Option<StealthLevel>,

        /// Qualification threshold in [0, 1]
        #[arg(long)]
        threshold: Option<f64>,

        /// One target per line; `#` starts a comment
        targets_file: PathBuf,
    },

    /// List campaigns, newest first
    Campaigns,

    /// Show one campaign
    Show {
        #[arg(value_parser = parse_campaign_id)]
        id: CampaignId,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// List a campaign's leads, highest priority first
    Leads {
        #[arg(value_parser = parse_campaign_id)]
        id: CampaignId,

        /// Only leads in this tier (bronze, silver, gold, platinum)
        #[arg(long, value_parser = parse_tier)]
        tier: Option<Tier>,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

fn parse_stealth(s: &str) -> Result<StealthLevel, String> {
    let level: u8 = s.parse().map_err(|e| format!("{e}"))?;
    StealthLevel::new(level).map_err(|e| e.to_string())
}

fn parse_campaign_id(s: &str) -> Result<CampaignId, String> {
    CampaignId::new(s).map_err(|e| e.to_string())
}

fn parse_tier(s: &str) -> Result<Tier, String> {
    Tier::parse(&s.to_lowercase()).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

async fn run(cli: Cli) -> Result<()> {
    let mut out = std::io::stdout().lock();

    if let Commands::Config(ConfigCommand::Init { force }) = &cli.command {
        init_tracing(&LoggingConfig::default());
        let path = commands::config::config_path(cli.config.as_deref())?;
        return commands::config::init(&path, *force, &mut out);
    }

    let config = commands::config::load(cli.config.as_deref())?;
    init_tracing(&config.logging);
    tracing::debug!("Starting lodestar v{}", env!("CARGO_PKG_VERSION"));

    if let Commands::Config(ConfigCommand::Show) = &cli.command {
        return commands::config::show(&config, &mut out);
    }

    let state = AppState::open(config).await?;
    let result = match cli.command {
        Commands::Config(_) => Ok(()),
        Commands::Submit {
            name,
            stealth,
            threshold,
            targets_file,
        } => {
            let options = SubmitOptions {
                name,
                stealth,
                threshold,
                targets_file: &targets_file,
            };
            commands::campaign::submit(&state, options, &mut out)
                .await
                .map(|_| ())
        }
        Commands::Campaigns => commands::campaign::list(&state, &mut out).await,
        Commands::Show { id, json } => commands::campaign::show(&state, &id, json, &mut out).await,
        Commands::Leads { id, tier, json } => {
            commands::campaign::leads(&state, &id, tier, json, &mut out).await
        }
    };

    state.db.close().await;
    result
}
