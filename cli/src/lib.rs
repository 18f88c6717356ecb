//! Lodestar command-line shell.
//!
//! Thin layer over the library crates: configuration management, campaign
//! submission and read-only inspection of stored campaigns and leads.
//! Running extraction requires an `Extractor` and is left to embedding
//! applications.

pub mod commands;
pub mod state;
pub mod targets;
