//! Lodestar Database Layer
//!
//! `SQLite` persistence for campaigns, extracted and scored records, lead
//! intelligence and the operation log. Uses `SQLx` with embedded migrations.
//!
//! # Example
//!
//! ```ignore
//! use lodestar_db::Database;
//!
//! let db = Database::open("lodestar.db").await?;
//! db.run_migrations().await?;
//! let store = db.store();
//! ```
//!
//! Each table has a module of free functions taking `&Pool<Sqlite>`;
//! [`SqliteCampaignStore`] maps the `CampaignStore` contract onto them.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod campaigns;
mod codec;
pub mod connection;
pub mod error;
pub mod intelligence;
pub mod migrations;
pub mod operations;
pub mod records;
pub mod store;

// Re-export commonly used types
pub use connection::MEMORY_PATH;
pub use error::{DatabaseError, Result};
pub use store::SqliteCampaignStore;

use sqlx::{Pool, Sqlite};
use std::path::Path;

/// High-level database handle.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open (creating if missing) the database at `path`, or an in-memory
    /// database for [`MEMORY_PATH`].
    ///
    /// Migrations are not applied; call [`Database::run_migrations`].
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let pool = connection::open_pool(path).await?;
        Ok(Self { pool })
    }

    /// Run all pending database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Highest applied migration version.
    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(&self.pool).await
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Campaign store sharing this database's pool.
    #[must_use]
    pub fn store(&self) -> SqliteCampaignStore {
        SqliteCampaignStore::new(self.pool.clone())
    }

    /// Close the database connection gracefully.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_open_and_migrate() {
        let db = test_support::setup_test_db().await;
        assert_eq!(db.get_schema_version().await.expect("version"), 5);
        db.close().await;
    }

    #[tokio::test]
    async fn test_file_database_persists_across_opens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("lodestar.db");
        let c = test_support::campaign(&["a"]);

        let db = Database::open(&path).await.expect("open");
        db.run_migrations().await.expect("migrate");
        campaigns::upsert_campaign(db.pool(), &c).await.expect("save");
        db.close().await;

        let db = Database::open(&path).await.expect("reopen");
        db.run_migrations().await.expect("migrate again");
        let loaded = campaigns::get_campaign(db.pool(), &c.id)
            .await
            .expect("get")
            .expect("campaign persisted");
        assert_eq!(loaded.id, c.id);
        db.close().await;
    }
}
