//! Lodestar Core - Foundation crate for the Lodestar campaign orchestrator.
//!
//! This crate provides the shared data model, error types, configuration
//! management and the persistence contract that all other Lodestar crates
//! depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Campaign, record and lead types (`CampaignId`, `TargetRef`, `Tier`, ...)
//! - [`store`] - The `CampaignStore` persistence trait
//! - [`logging`] - Tracing subscriber initialization
//!
//! # Example
//!
//! ```rust
//! use lodestar_core::{AppConfig, Tier};
//!
//! let config = AppConfig::default();
//! assert!(config.validate().is_ok());
//! assert_eq!(Tier::from_quality(0.92), Tier::Platinum);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod logging;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, BrowserConfig, CampaignConfig, DatabaseConfig, EgressConfig, IdentityConfig,
    LevelProfile, LoggingConfig, PacingConfig, RiskConfig, RotationStrategy, SessionConfig,
    StealthConfig,
};
pub use error::{ConfigError, ConfigResult, LodestarError, Result, StoreError, StoreResult};
pub use store::CampaignStore;
pub use types::{
    Approach, Campaign, CampaignCounters, CampaignId, CampaignMetrics, CampaignSpec,
    CampaignStatus, ContactChannel, ContactStrategy, ExtractionMeta, LeadIntelligence,
    OperationOutcome, OperationRecord, Personalization, QualificationStatus, RawRecord, ScoreSet,
    ScoredRecord, StealthLevel, TargetRef, Tier,
};
