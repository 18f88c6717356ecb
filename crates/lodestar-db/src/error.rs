//! Database error types.

use lodestar_core::StoreError;
use thiserror::Error;

/// Database-specific errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to open or create the database.
    #[error("failed to open database: {0}")]
    Open(String),

    /// Migration execution failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// A stored value could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A value could not be encoded for storage.
    #[error("encode error: {0}")]
    Encode(String),

    /// Underlying `SQLx` error.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error while preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatabaseError {
    pub(crate) fn decode(column: &str, err: impl std::fmt::Display) -> Self {
        Self::Decode(format!("{column}: {err}"))
    }
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Decode(msg) => StoreError::Decode(msg),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_maps_to_store_decode() {
        let err: StoreError = DatabaseError::decode("status", "unknown status 'x'").into();
        assert!(matches!(err, StoreError::Decode(ref m) if m == "status: unknown status 'x'"));
    }

    #[test]
    fn test_other_errors_map_to_backend() {
        let err: StoreError = DatabaseError::Open("locked".to_string()).into();
        assert_eq!(
            err.to_string(),
            "backend failure: failed to open database: locked"
        );
    }
}
