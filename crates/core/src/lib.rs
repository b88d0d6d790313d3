//! Core types and configuration for the Match Odds triad extractor.
//!
//! This crate provides shared types used across all other crates:
//! - Market definition and price history types
//! - Triad, kick-off correction and match record types
//! - Configuration structures
//! - Common error types and timestamp helpers

pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use config::{BatchConfig, Config, KickoffConfig, SearchConfig, SearchWindow};
pub use error::{Error, Result};
pub use types::*;
