//! Batch extraction over a tree of recorded stream files.
//!
//! Files are independent: each is run through the match pipeline on a
//! bounded rayon pool, and the ordered per-file results are reduced into a
//! [`RunSummary`] afterwards.

pub mod driver;
pub mod summary;

pub use driver::{BatchDriver, BatchResult, FileFailure, ProcessedFile};
pub use summary::RunSummary;
