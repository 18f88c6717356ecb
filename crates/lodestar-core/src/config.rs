//! Configuration management for Lodestar.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use crate::types::StealthLevel;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/lodestar/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Campaign defaults and limits
    pub campaign: CampaignConfig,
    /// Stealth level table
    pub stealth: StealthConfig,
    /// Pacing delays
    pub pacing: PacingConfig,
    /// Risk model parameters
    pub risk: RiskConfig,
    /// Session pool settings
    pub sessions: SessionConfig,
    /// Egress identities and rotation
    pub egress: EgressConfig,
    /// Browser launch settings
    pub browser: BrowserConfig,
    /// Persistence settings
    pub database: DatabaseConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, falling back to defaults if
    /// the file does not exist.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let contents = fs::read_to_string(path)?;
            let config: Self = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `LODESTAR_STEALTH_LEVEL`: Override the default stealth level (1-5)
    /// - `LODESTAR_HEADLESS`: Override browser headless mode (true/false)
    /// - `LODESTAR_DB_PATH`: Override the database path
    /// - `LODESTAR_LOG`: Override the log filter directive
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `LODESTAR_*` environment overrides in place.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("LODESTAR_STEALTH_LEVEL") {
            if let Some(level) = val.parse().ok().and_then(|l| StealthLevel::new(l).ok()) {
                self.campaign.default_stealth_level = level;
                tracing::debug!("Override campaign.default_stealth_level from env: {}", level);
            }
        }

        if let Ok(val) = std::env::var("LODESTAR_HEADLESS") {
            if let Ok(headless) = val.parse() {
                self.browser.headless = headless;
                tracing::debug!("Override browser.headless from env: {}", headless);
            }
        }

        if let Ok(val) = std::env::var("LODESTAR_DB_PATH") {
            tracing::debug!("Override database.path from env: {}", val);
            self.database.path = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var("LODESTAR_LOG") {
            tracing::debug!("Override logging.filter from env: {}", val);
            self.logging.filter = val;
        }
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        unit_interval(
            "campaign.qualification_threshold",
            self.campaign.qualification_threshold,
        )?;
        unit_interval(
            "campaign.high_value_threshold",
            self.campaign.high_value_threshold,
        )?;
        if self.campaign.max_concurrent_campaigns == 0 {
            return Err(ConfigError::invalid(
                "campaign.max_concurrent_campaigns",
                "must be at least 1",
            ));
        }

        if self.stealth.levels.len() != 5 {
            return Err(ConfigError::invalid(
                "stealth.levels",
                format!("expected 5 entries, got {}", self.stealth.levels.len()),
            ));
        }
        for pair in self.stealth.levels.windows(2) {
            if pair[1].delay_multiplier < pair[0].delay_multiplier
                || pair[1].batch_size > pair[0].batch_size
            {
                return Err(ConfigError::invalid(
                    "stealth.levels",
                    "higher levels must not lower the delay multiplier or raise the batch size",
                ));
            }
        }
        if self.stealth.levels.iter().any(|l| l.batch_size == 0) {
            return Err(ConfigError::invalid("stealth.levels", "batch_size must be at least 1"));
        }
        if self.stealth.levels.iter().any(|l| l.delay_multiplier <= 0.0) {
            return Err(ConfigError::invalid(
                "stealth.levels",
                "delay_multiplier must be positive",
            ));
        }
        if self.stealth.risk_delay_gain < 0.0 {
            return Err(ConfigError::invalid("stealth.risk_delay_gain", "must not be negative"));
        }

        if self.pacing.target_delay_ms.0 > self.pacing.target_delay_ms.1 {
            return Err(ConfigError::invalid("pacing.target_delay_ms", "min exceeds max"));
        }
        if self.pacing.batch_pause_ms.0 > self.pacing.batch_pause_ms.1 {
            return Err(ConfigError::invalid("pacing.batch_pause_ms", "min exceeds max"));
        }

        let risk = &self.risk;
        unit_interval("risk.detected_penalty", risk.detected_penalty)?;
        unit_interval("risk.failure_penalty", risk.failure_penalty)?;
        unit_interval("risk.success_decay", risk.success_decay)?;
        unit_interval("risk.emergency_threshold", risk.emergency_threshold)?;
        unit_interval("risk.resume_threshold", risk.resume_threshold)?;
        unit_interval("risk.rotation_threshold", risk.rotation_threshold)?;
        unit_interval("risk.detection_alert_threshold", risk.detection_alert_threshold)?;
        if risk.detected_penalty <= 0.0 {
            return Err(ConfigError::invalid("risk.detected_penalty", "must be positive"));
        }
        if risk.success_decay <= 0.0 {
            return Err(ConfigError::invalid("risk.success_decay", "must be positive"));
        }
        if risk.resume_threshold >= risk.emergency_threshold {
            return Err(ConfigError::invalid(
                "risk.resume_threshold",
                "must be below risk.emergency_threshold",
            ));
        }
        if risk.history_len == 0 {
            return Err(ConfigError::invalid("risk.history_len", "must be at least 1"));
        }

        if self.sessions.max_sessions == 0 {
            return Err(ConfigError::invalid("sessions.max_sessions", "must be at least 1"));
        }
        if self.sessions.creation_attempts == 0 {
            return Err(ConfigError::invalid("sessions.creation_attempts", "must be at least 1"));
        }

        unit_interval("egress.health_floor", self.egress.health_floor)?;
        if !(0.0..1.0).contains(&self.egress.health_decay) {
            return Err(ConfigError::invalid("egress.health_decay", "must be within [0, 1)"));
        }
        if self.egress.max_sessions_per_identity == 0 {
            return Err(ConfigError::invalid(
                "egress.max_sessions_per_identity",
                "must be at least 1",
            ));
        }

        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> ConfigResult<()> {
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::invalid("config_path", "no parent directory"))?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/lodestar/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/lodestar`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        Ok(project_dirs()?.data_dir().to_path_buf())
    }

    /// Resolve the database path, defaulting to `<data_dir>/lodestar.db`.
    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("lodestar.db")),
        }
    }
}

fn project_dirs() -> ConfigResult<ProjectDirs> {
    ProjectDirs::from("com", "lodestar", "lodestar").ok_or(ConfigError::NoConfigDir)
}

fn unit_interval(field: &str, value: f64) -> ConfigResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be within [0, 1], got {value}")))
    }
}

/// Campaign defaults and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// Stealth level used when a submission does not specify one
    pub default_stealth_level: StealthLevel,
    /// Qualification threshold used when a submission does not specify one
    pub qualification_threshold: f64,
    /// Quality at or above which a qualified lead counts as high-value
    pub high_value_threshold: f64,
    /// Campaigns allowed to run at the same time
    pub max_concurrent_campaigns: usize,
    /// Retries per target for transient extraction errors
    pub max_target_retries: u32,
    /// Waits for a free session/identity before pausing the campaign
    pub max_resource_waits: u32,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            default_stealth_level: StealthLevel::default(),
            qualification_threshold: 0.6,
            high_value_threshold: 0.8,
            max_concurrent_campaigns: 3,
            max_target_retries: 2,
            max_resource_waits: 3,
        }
    }
}

/// Base throttle settings for one stealth level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelProfile {
    /// Multiplier applied to every pacing delay
    pub delay_multiplier: f64,
    /// Targets per batch
    pub batch_size: usize,
}

/// Stealth level table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StealthConfig {
    /// How strongly risk stretches the delay multiplier
    pub risk_delay_gain: f64,
    /// One entry per level, index 0 is level 1
    pub levels: Vec<LevelProfile>,
}

impl StealthConfig {
    /// Base profile for a level.
    #[must_use]
    pub fn profile(&self, level: StealthLevel) -> LevelProfile {
        self.levels
            .get(level.index())
            .copied()
            .unwrap_or(LevelProfile {
                delay_multiplier: 5.0,
                batch_size: 1,
            })
    }
}

impl Default for StealthConfig {
    fn default() -> Self {
        let levels = [(1.0, 5), (1.5, 4), (2.0, 3), (3.0, 2), (5.0, 1)]
            .into_iter()
            .map(|(delay_multiplier, batch_size)| LevelProfile {
                delay_multiplier,
                batch_size,
            })
            .collect();
        Self {
            risk_delay_gain: 2.0,
            levels,
        }
    }
}

/// Pacing delays, as inclusive `(min, max)` millisecond ranges before scaling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Delay before each target
    pub target_delay_ms: (u64, u64),
    /// Pause between batches
    pub batch_pause_ms: (u64, u64),
}

impl PacingConfig {
    /// No delays at all; useful for tests and dry runs.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            target_delay_ms: (0, 0),
            batch_pause_ms: (0, 0),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            target_delay_ms: (10_000, 30_000),
            batch_pause_ms: (60_000, 120_000),
        }
    }
}

/// Risk model parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Risk added by a detection signal
    pub detected_penalty: f64,
    /// Risk added by an ordinary failure
    pub failure_penalty: f64,
    /// Fraction of risk removed by each success
    pub success_decay: f64,
    /// Risk at which campaigns pause
    pub emergency_threshold: f64,
    /// Risk below which paused campaigns may resume
    pub resume_threshold: f64,
    /// Risk at which an egress rotation is due early
    pub rotation_threshold: f64,
    /// Seconds between scheduled egress rotations
    pub rotation_interval_secs: u64,
    /// Seconds for idle risk to halve (0 disables idle decay)
    pub idle_half_life_secs: u64,
    /// Outcomes kept in the rolling history
    pub history_len: usize,
    /// Detection rate over the history that raises a security alert
    pub detection_alert_threshold: f64,
}

impl RiskConfig {
    /// Scheduled rotation interval.
    #[must_use]
    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_secs)
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            detected_penalty: 0.3,
            failure_penalty: 0.1,
            success_decay: 0.05,
            emergency_threshold: 0.8,
            resume_threshold: 0.3,
            rotation_threshold: 0.5,
            rotation_interval_secs: 300,
            idle_half_life_secs: 600,
            history_len: 50,
            detection_alert_threshold: 0.7,
        }
    }
}

/// Session pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum live sessions
    pub max_sessions: usize,
    /// Uses after which a session is retired
    pub retirement_ceiling: u32,
    /// Longest `acquire` waits for a free session
    pub acquire_timeout_ms: u64,
    /// Creation attempts before giving up
    pub creation_attempts: u32,
    /// Base backoff between creation attempts (doubles each time)
    pub creation_backoff_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 5,
            retirement_ceiling: 50,
            acquire_timeout_ms: 30_000,
            creation_attempts: 3,
            creation_backoff_ms: 500,
        }
    }
}

/// Egress identity selection strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    /// Cycle through eligible identities in order
    #[default]
    RoundRobin,
    /// Random pick weighted by health score
    WeightedHealth,
}

/// One configured egress identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Unique identifier
    pub id: String,
    /// Endpoint handed to the extractor (e.g. a proxy URL)
    pub endpoint: String,
    /// Opaque class tag (residential, datacenter, mobile, ...)
    pub class: String,
}

/// Egress identities and rotation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EgressConfig {
    /// Selection strategy
    pub strategy: RotationStrategy,
    /// Health below which an identity is deactivated
    pub health_floor: f64,
    /// Weight kept from the previous health on each report
    pub health_decay: f64,
    /// Concurrent leases allowed per identity
    pub max_sessions_per_identity: u32,
    /// Configured identities
    pub identities: Vec<IdentityConfig>,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            strategy: RotationStrategy::RoundRobin,
            health_floor: 0.5,
            health_decay: 0.9,
            max_sessions_per_identity: 1,
            identities: Vec::new(),
        }
    }
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            navigation_timeout_secs: 30,
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file; defaults to `<data_dir>/lodestar.db`
    pub path: Option<PathBuf>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Include event targets in log lines
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,lodestar=debug".to_string(),
            with_target: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.campaign.default_stealth_level.get(), 3);
        assert_eq!(config.campaign.max_concurrent_campaigns, 3);
        assert_eq!(config.sessions.retirement_ceiling, 50);
        assert!((config.risk.emergency_threshold - 0.8).abs() < f64::EPSILON);
        assert!(config.browser.headless);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_level_table_is_monotonic() {
        let stealth = StealthConfig::default();
        let lvl1 = stealth.profile(StealthLevel::MIN);
        let lvl5 = stealth.profile(StealthLevel::MAX);
        assert_eq!(lvl1.batch_size, 5);
        assert_eq!(lvl5.batch_size, 1);
        assert!(lvl5.delay_multiplier > lvl1.delay_multiplier);
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("[campaign]"));
        assert!(toml_str.contains("[risk]"));
        assert!(toml_str.contains("[sessions]"));

        let parsed: AppConfig = toml::from_str(&toml_str).expect("parse serialized config");
        assert_eq!(parsed.stealth.levels, config.stealth.levels);
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().expect("create temp dir");
        let config_path = tmp.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.sessions.max_sessions = 8;
        config.egress.identities.push(IdentityConfig {
            id: "res-1".to_string(),
            endpoint: "http://proxy.invalid:8080".to_string(),
            class: "residential".to_string(),
        });

        config.save_to(&config_path).expect("save config");
        let loaded = AppConfig::load_from(&config_path).expect("load config");

        assert_eq!(loaded.sessions.max_sessions, 8);
        assert_eq!(loaded.egress.identities.len(), 1);
        assert_eq!(loaded.egress.identities[0].class, "residential");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = TempDir::new().expect("create temp dir");
        let loaded = AppConfig::load_from(&tmp.path().join("absent.toml")).expect("defaults");
        assert_eq!(loaded.sessions.max_sessions, 5);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[risk]
emergency_threshold = 0.9

[egress]
strategy = "weighted_health"
"#;

        let config: AppConfig = toml::from_str(toml_str).expect("parse partial config");
        assert!((config.risk.emergency_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.egress.strategy, RotationStrategy::WeightedHealth);
        // These should be defaults
        assert!((config.risk.resume_threshold - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.campaign.max_target_retries, 2);
    }

    #[test]
    fn test_invalid_stealth_level_rejected_by_serde() {
        let toml_str = r"
[campaign]
default_stealth_level = 9
";
        assert!(toml::from_str::<AppConfig>(toml_str).is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_hysteresis() {
        let mut config = AppConfig::default();
        config.risk.resume_threshold = 0.9;
        let err = config.validate().expect_err("resume above emergency");
        assert!(err.to_string().contains("risk.resume_threshold"));
    }

    #[test]
    fn test_validate_rejects_detection_alert_above_one() {
        let mut config = AppConfig::default();
        assert!((config.risk.detection_alert_threshold - 0.7).abs() < f64::EPSILON);
        config.risk.detection_alert_threshold = 1.5;
        let err = config.validate().expect_err("threshold outside [0, 1]");
        assert!(err.to_string().contains("risk.detection_alert_threshold"));
    }

    #[test]
    fn test_validate_rejects_non_monotonic_levels() {
        let mut config = AppConfig::default();
        config.stealth.levels[4].batch_size = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_pacing_range() {
        let mut config = AppConfig::default();
        config.pacing.target_delay_ms = (5_000, 1_000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[sessions]\nmax_sessions = 0\n").expect("write config");
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("LODESTAR_STEALTH_LEVEL", "5");
        std::env::set_var("LODESTAR_HEADLESS", "false");
        std::env::set_var("LODESTAR_DB_PATH", "/tmp/lodestar-test.db");

        let mut config = AppConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.campaign.default_stealth_level.get(), 5);
        assert!(!config.browser.headless);
        assert_eq!(
            config.database_path().expect("db path"),
            PathBuf::from("/tmp/lodestar-test.db")
        );

        std::env::remove_var("LODESTAR_STEALTH_LEVEL");
        std::env::remove_var("LODESTAR_HEADLESS");
        std::env::remove_var("LODESTAR_DB_PATH");
    }
}
