//! Core error types for Lodestar.
//!
//! `LodestarError` is the umbrella type for validation and subsystem failures,
//! `ConfigError` covers configuration loading, and `StoreError` is the error
//! half of the [`CampaignStore`](crate::store::CampaignStore) contract.

use thiserror::Error;

/// Central error type for shared Lodestar operations.
#[derive(Error, Debug)]
pub enum LodestarError {
    /// Configuration errors (file loading, parsing, validation)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persistence errors surfaced through the store contract
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Validation errors (invalid input, constraints)
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to determine config directory path
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    /// Failed to parse TOML
    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// I/O error reading/writing config
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Reason for invalidity
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors returned by a [`CampaignStore`](crate::store::CampaignStore) implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend rejected or failed the operation
    #[error("backend failure: {0}")]
    Backend(String),

    /// A stored value could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// The requested entity does not exist
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Entity kind (campaign, record, ...)
        entity: &'static str,
        /// Lookup key
        key: String,
    },
}

/// Result type alias using `LodestarError`.
pub type Result<T> = std::result::Result<T, LodestarError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LodestarError::Validation("stealth level 9".to_string());
        assert_eq!(err.to_string(), "validation error: stealth level 9");

        let err = ConfigError::NoConfigDir;
        assert_eq!(
            err.to_string(),
            "could not determine config directory (XDG base directories not available)"
        );

        let err = StoreError::NotFound {
            entity: "campaign",
            key: "CMP_x".to_string(),
        };
        assert_eq!(err.to_string(), "campaign not found: CMP_x");
    }

    #[test]
    fn test_error_from_config() {
        let config_err = ConfigError::invalid("risk.emergency_threshold", "must be in [0, 1]");
        let err: LodestarError = config_err.into();
        assert!(matches!(err, LodestarError::Config(_)));
        assert!(err.to_string().contains("risk.emergency_threshold"));
    }

    #[test]
    fn test_error_from_store() {
        let err: LodestarError = StoreError::Backend("disk full".to_string()).into();
        assert!(matches!(err, LodestarError::Store(_)));
    }
}
