//! Lodestar Campaign - Risk-governed campaign execution.
//!
//! This crate drives campaigns through a four-stage pipeline: extraction,
//! scoring, qualification and lead synthesis. Extraction is paced and batched
//! by a [`RiskGovernor`] that tracks a detection-risk estimate, and runs on
//! sessions and egress identities borrowed from the shared pools in
//! `lodestar-browser`.
//!
//! # Features
//!
//! - Persisted state machine with pause/resume at an exact cursor
//! - Adaptive batch size and delays driven by the risk estimate
//! - Emergency pause latch with hysteresis
//! - Bounded retries for transient failures, immediate retirement on detection
//! - Per-attempt operation log
//!
//! # Example
//!
//! ```rust,ignore
//! use lodestar_campaign::{MemoryStore, PipelineRunner, RiskGovernor};
//!
//! let runner = PipelineRunner::new(store, pool, egress, governor, extractor, scorer)
//!     .with_config(&config);
//!
//! let campaign = runner.submit(spec).await?;
//! let report = runner.execute(&campaign.id).await?;
//! println!("{} qualified leads", report.counters.qualified);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod capabilities;
#[allow(missing_docs)]
pub mod error;
pub mod intelligence;
pub mod memory;
pub mod pacing;
pub mod risk;
pub mod runner;

// Re-export commonly used types
pub use capabilities::{ExtractionError, Extractor, ScoreError, Scorer};
pub use error::{CampaignError, Result};
pub use memory::MemoryStore;
pub use pacing::Pacer;
pub use risk::{Outcome, RiskGovernor, ThrottlePolicy};
pub use runner::{
    CampaignReport, PipelineRunner, RunnerSettings, PAUSE_REQUESTED, PAUSE_RESOURCES, PAUSE_RISK,
};
