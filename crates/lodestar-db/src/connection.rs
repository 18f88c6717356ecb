//! Connection pool setup.
//!
//! Opens a `SQLx` pool over a `SQLite` file (created if missing) or over a
//! private in-memory database when the path is `:memory:`.

use crate::error::{DatabaseError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;

/// Path that selects an in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Connections kept by a file-backed pool.
const FILE_POOL_SIZE: u32 = 5;

/// Open a connection pool for the database at `path`.
///
/// In-memory databases live and die with a single connection, so the pool is
/// pinned to one connection that is never recycled.
///
/// # Errors
/// Returns `DatabaseError::Open` if the path is not valid UTF-8 or the
/// database cannot be opened.
pub async fn open_pool(path: impl AsRef<Path>) -> Result<Pool<Sqlite>> {
    let path_str = path.as_ref().to_str().ok_or_else(|| {
        DatabaseError::Open("invalid database path: not valid UTF-8".to_string())
    })?;

    let in_memory = path_str == MEMORY_PATH;

    let connect_options = if in_memory {
        SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DatabaseError::Open(format!("invalid connection string: {e}")))?
    } else {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
    };
    let connect_options = connect_options.foreign_keys(true);

    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(FILE_POOL_SIZE)
    };

    let pool = pool_options
        .connect_with(connect_options)
        .await
        .map_err(|e| DatabaseError::Open(format!("failed to open {path_str}: {e}")))?;

    tracing::info!(path = path_str, "database pool created");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_pool() {
        let pool = open_pool(MEMORY_PATH).await.expect("open memory pool");
        let one: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&pool)
            .await
            .expect("select");
        assert_eq!(one, 1);
    }

    #[tokio::test]
    async fn test_memory_pool_keeps_state() {
        let pool = open_pool(MEMORY_PATH).await.expect("open memory pool");
        sqlx::query("CREATE TABLE t (x INTEGER)")
            .execute(&pool)
            .await
            .expect("create");
        sqlx::query("INSERT INTO t VALUES (7)")
            .execute(&pool)
            .await
            .expect("insert");
        let x: i64 = sqlx::query_scalar("SELECT x FROM t")
            .fetch_one(&pool)
            .await
            .expect("select");
        assert_eq!(x, 7);
    }

    #[tokio::test]
    async fn test_open_file_pool_creates_parents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("lodestar.db");

        let pool = open_pool(&path).await.expect("open file pool");
        pool.close().await;

        assert!(path.exists());
    }
}
