//! Timestamp parsing and conversion.
//!
//! Exchange streams mix two representations: epoch milliseconds for publish
//! times and ISO-8601 strings for scheduling metadata. Everything here is UTC.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::error::{Error, Result};
use crate::types::TimestampMs;

/// Accepted layouts for `marketTime` / `openDate` strings.
const MARKET_TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%SZ"];

/// Accepted layouts for textual publish times.
const PUBLISH_TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Parse a scheduling string such as `2019-05-12T14:00:00.000Z`.
pub fn parse_market_time(value: &str) -> Result<DateTime<Utc>> {
    parse_with_formats(value, &MARKET_TIME_FORMATS)
}

/// Parse a textual publish time (`2019-05-12 14:00:00.250`) into epoch ms.
pub fn parse_publish_time(value: &str) -> Result<TimestampMs> {
    parse_with_formats(value, &PUBLISH_TIME_FORMATS).map(|dt| dt.timestamp_millis())
}

fn parse_with_formats(value: &str, formats: &[&str]) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| Error::unparsable_timestamp(format!("'{value}'")))
}

/// Convert epoch milliseconds to a UTC instant.
pub fn ms_to_utc(ts_ms: TimestampMs) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ts_ms)
        .single()
        .ok_or_else(|| Error::unparsable_timestamp(format!("{ts_ms} ms out of range")))
}

/// Convert minutes to milliseconds.
#[inline]
pub fn minutes_to_ms(minutes: u32) -> i64 {
    i64::from(minutes) * 60_000
}

/// Signed difference `later - earlier` in fractional hours.
pub fn hours_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / MS_PER_HOUR
}

/// Format an instant the way the exchange writes scheduling strings.
pub fn format_market_time(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S.000Z").to_string()
}
