//! Error types for the triad extraction workspace.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the triad extraction workspace.
///
/// Outcomes that are expected for some inputs (a file without a Match Odds
/// market, a market with the wrong number of runners) are not errors; see
/// `NoRecordReason` in the analysis crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stream line that could not be decoded as an exchange event.
    #[error("Malformed line: {0}")]
    MalformedLine(String),

    /// A timestamp value that could not be normalized.
    #[error("Unparsable timestamp: {0}")]
    UnparsableTimestamp(String),

    /// The batch input root is missing or cannot be read.
    #[error("Input root error: {0}")]
    InputRoot(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a malformed line error.
    pub fn malformed_line(msg: impl Into<String>) -> Self {
        Error::MalformedLine(msg.into())
    }

    /// Create an unparsable timestamp error.
    pub fn unparsable_timestamp(msg: impl Into<String>) -> Self {
        Error::UnparsableTimestamp(msg.into())
    }

    /// Create an input root error.
    pub fn input_root(msg: impl Into<String>) -> Self {
        Error::InputRoot(msg.into())
    }
}
