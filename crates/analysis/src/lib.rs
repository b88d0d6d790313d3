//! Match analysis for the triad extractor.
//!
//! This crate handles:
//! - Kick-off correction from observed end-of-trading times
//! - Two-phase search for synchronized 1X2 price triads
//! - Assembly of the per-file match record
//! - The per-file pipeline tying the stages together

pub mod kickoff;
pub mod pipeline;
pub mod record;
pub mod search;

pub use kickoff::{resolve_kickoff, snap_down_to_minute, KickoffCorrector};
pub use pipeline::{FileOutcome, FileReport, MatchPipeline, NoRecordReason};
pub use record::{split_teams, MatchRecordBuilder};
pub use search::{assign_roles, find_candidates, TriadSearcher, TriadSelection};
