//! Wire format of exchange stream lines.
//!
//! Each line of a stream file is one JSON message. Only market change
//! messages (`op == "mcm"`) carry data the extractor uses.

use serde::Deserialize;

use triad_core::time::parse_publish_time;
use triad_core::{Error, MarketDefinition, Result, SelectionId, TimestampMs};

/// Operation tag of market change messages.
pub const MARKET_CHANGE_OP: &str = "mcm";

/// One decoded stream line.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub op: Option<String>,
    /// Publish time.
    #[serde(default)]
    pub pt: Option<PublishTime>,
    #[serde(default)]
    pub mc: Option<Vec<MarketChange>>,
}

impl RawEvent {
    pub fn is_market_change(&self) -> bool {
        self.op.as_deref() == Some(MARKET_CHANGE_OP)
    }
}

/// Publish time as found on the wire.
///
/// Recorded files normally carry epoch milliseconds, but some converted
/// dumps carry floats or `YYYY-MM-DD HH:MM:SS[.f]` strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PublishTime {
    Millis(i64),
    Fractional(f64),
    Text(String),
    Other(serde_json::Value),
}

impl PublishTime {
    /// Normalize to epoch milliseconds.
    pub fn to_ms(&self) -> Result<TimestampMs> {
        match self {
            PublishTime::Millis(ms) => Ok(*ms),
            PublishTime::Fractional(ms) if ms.is_finite() => Ok(ms.trunc() as TimestampMs),
            PublishTime::Fractional(ms) => {
                Err(Error::unparsable_timestamp(format!("non-finite publish time {ms}")))
            }
            PublishTime::Text(text) => parse_publish_time(text),
            PublishTime::Other(value) => {
                Err(Error::unparsable_timestamp(format!("unsupported publish time {value}")))
            }
        }
    }
}

/// One market change entry of a market change message.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketChange {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "marketDefinition", default)]
    pub market_definition: Option<MarketDefinition>,
    /// Runner changes.
    #[serde(default)]
    pub rc: Option<Vec<RunnerChange>>,
}

/// Per-runner change; only the last traded price is used.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RunnerChange {
    #[serde(default)]
    pub id: Option<SelectionId>,
    #[serde(default)]
    pub ltp: Option<f64>,
}

impl RunnerChange {
    /// Runner id and price, when the change carries both.
    pub fn priced(&self) -> Option<(SelectionId, f64)> {
        Some((self.id?, self.ltp?))
    }
}

/// Decode one stream line.
pub fn decode_line(line: &str) -> Result<RawEvent> {
    serde_json::from_str(line).map_err(|e| Error::malformed_line(e.to_string()))
}
