//! Stream ingestion for the Match Odds triad extractor.
//!
//! This crate handles:
//! - Decoding exchange stream lines
//! - Publish time normalization
//! - Locking onto the football Match Odds market of a file
//! - Per-runner price history and activity timestamps

pub mod event;
pub mod ingester;

pub use event::{decode_line, MarketChange, PublishTime, RawEvent, RunnerChange};
pub use ingester::{IngestStats, IngestedMarket, StreamIngester};
