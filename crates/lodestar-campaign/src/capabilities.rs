//! Pluggable extraction and scoring.
//!
//! The runner never fetches or scores anything itself. Embedding applications
//! supply an [`Extractor`] that turns a target into a [`RawRecord`] using a
//! leased session and egress identity, and a [`Scorer`] that rates records.

use async_trait::async_trait;
use lodestar_browser::{BrowsingSession, EgressIdentity, Session};
use lodestar_core::{RawRecord, ScoreSet, TargetRef};
use thiserror::Error;

/// Why an extraction attempt failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    /// Worth retrying (timeouts, flaky pages)
    #[error("transient extraction failure: {0}")]
    Transient(String),

    /// Retrying cannot help (profile gone, unparseable)
    #[error("permanent extraction failure: {0}")]
    Permanent(String),

    /// The platform flagged the session or identity
    #[error("extraction detected: {0}")]
    Detected(String),
}

impl ExtractionError {
    /// Whether the runner should try the target again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Turns a target into a raw record.
#[async_trait]
pub trait Extractor<S: BrowsingSession>: Send + Sync {
    /// Extract one target through the given session and egress identity.
    async fn extract(
        &self,
        target: &TargetRef,
        session: &Session<S>,
        identity: &EgressIdentity,
    ) -> Result<RawRecord, ExtractionError>;
}

/// Scoring failed for a record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("scoring failed: {0}")]
pub struct ScoreError(pub String);

/// Rates a raw record. Must be deterministic.
pub trait Scorer: Send + Sync {
    /// Score one record.
    fn score(&self, record: &RawRecord) -> Result<ScoreSet, ScoreError>;

    /// Version tag stored alongside every score.
    fn model_version(&self) -> &str;
}
