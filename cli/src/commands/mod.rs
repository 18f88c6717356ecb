//! Command handlers.
//!
//! Handlers write their output to a caller-supplied writer so the binary can
//! hand them stdout and tests can hand them a buffer.

pub mod campaign;
pub mod config;
