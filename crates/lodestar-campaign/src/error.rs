use crate::runner::CampaignReport;
use lodestar_core::{CampaignId, CampaignStatus, LodestarError, StoreError};
use thiserror::Error;

/// Errors surfaced by [`PipelineRunner`](crate::runner::PipelineRunner).
#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("campaign not found: {0}")]
    NotFound(CampaignId),

    #[error("cannot {action} campaign {id} while {status}")]
    InvalidTransition {
        id: CampaignId,
        status: CampaignStatus,
        action: &'static str,
    },

    #[error("campaign {0} is already running")]
    AlreadyRunning(CampaignId),

    #[error("campaign {0} is not running")]
    NotRunning(CampaignId),

    #[error("concurrent campaign limit reached ({max})")]
    AtCapacity { max: usize },

    #[error("risk {risk:.2} is not below the resume threshold {threshold:.2}")]
    RiskTooHigh { risk: f64, threshold: f64 },

    /// The campaign hit an orchestration fault and is now `failed`.
    #[error("campaign {} aborted: {reason}", report.campaign_id)]
    Aborted {
        report: Box<CampaignReport>,
        reason: String,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] LodestarError),
}

pub type Result<T> = std::result::Result<T, CampaignError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_message() {
        let id = CampaignId::generate();
        let err = CampaignError::InvalidTransition {
            id: id.clone(),
            status: CampaignStatus::Completed,
            action: "resume",
        };
        assert_eq!(
            err.to_string(),
            format!("cannot resume campaign {id} while completed")
        );
    }

    #[test]
    fn test_store_error_converts() {
        let err: CampaignError = StoreError::Backend("disk full".to_string()).into();
        assert!(matches!(err, CampaignError::Store(_)));
    }
}
