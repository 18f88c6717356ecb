//! Application state shared by the commands.

use anyhow::{Context, Result};
use lodestar_core::AppConfig;
use lodestar_db::{Database, SqliteCampaignStore};
use std::path::PathBuf;

/// Loaded configuration plus the opened, migrated database.
pub struct AppState {
    /// Effective configuration (file, then environment overrides)
    pub config: AppConfig,
    /// Database handle
    pub db: Database,
}

impl AppState {
    /// Open the database named by `config` and bring its schema up to date.
    pub async fn open(config: AppConfig) -> Result<Self> {
        let path = config
            .database_path()
            .context("failed to resolve database path")?;
        Self::open_at(config, path).await
    }

    /// Like [`AppState::open`] but with an explicit database path.
    pub async fn open_at(config: AppConfig, path: PathBuf) -> Result<Self> {
        tracing::debug!("Opening database at {}", path.display());

        let db = Database::open(&path)
            .await
            .with_context(|| format!("failed to open database {}", path.display()))?;
        db.run_migrations()
            .await
            .context("failed to migrate database")?;

        Ok(Self { config, db })
    }

    /// Campaign store over the shared pool.
    pub fn store(&self) -> SqliteCampaignStore {
        self.db.store()
    }
}
