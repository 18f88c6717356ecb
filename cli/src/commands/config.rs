use anyhow::{bail, Context, Result};
use lodestar_core::AppConfig;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Resolve the config file location.
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => AppConfig::config_path().context("failed to determine config path"),
    }
}

/// Load the effective configuration: file (or defaults), then environment
/// overrides, then validation.
pub fn load(explicit: Option<&Path>) -> Result<AppConfig> {
    let path = config_path(explicit)?;
    let mut config = AppConfig::load_from(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    config.apply_env_overrides();
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Write a default config file.
pub fn init(path: &Path, force: bool, out: &mut impl Write) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    AppConfig::default()
        .save_to(path)
        .with_context(|| format!("failed to write config to {}", path.display()))?;

    tracing::info!("Wrote default config to {}", path.display());
    writeln!(out, "Wrote default config to {}", path.display())?;
    Ok(())
}

/// Print the effective configuration as TOML.
pub fn show(config: &AppConfig, out: &mut impl Write) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("failed to render config")?;
    write!(out, "{rendered}")?;
    Ok(())
}
