//! Configuration structures for the triad extractor.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::time::minutes_to_ms;
use crate::types::TimestampMs;

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Triad search windows.
    pub search: SearchConfig,
    /// Kick-off correction.
    pub kickoff: KickoffConfig,
    /// Batch driver.
    pub batch: BatchConfig,
}

/// A search window relative to kick-off, with the max spread allowed
/// between the three legs of a triad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchWindow {
    /// Window start in minutes after kick-off.
    pub from_minutes: u32,
    /// Window end in minutes after kick-off.
    pub to_minutes: u32,
    /// Max seconds between the earliest and latest leg.
    pub max_gap_secs: u32,
}

impl SearchWindow {
    /// Closed window bounds in epoch ms for a kick-off instant.
    pub fn bounds_ms(&self, kickoff_ms: TimestampMs) -> (TimestampMs, TimestampMs) {
        (
            kickoff_ms + minutes_to_ms(self.from_minutes),
            kickoff_ms + minutes_to_ms(self.to_minutes),
        )
    }

    /// Max spread in milliseconds.
    #[inline]
    pub fn max_gap_ms(&self) -> i64 {
        i64::from(self.max_gap_secs) * 1000
    }
}

/// Triad search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Exact window start (minutes after kick-off).
    pub time_from: u32,
    /// Exact window end (minutes after kick-off).
    pub time_to: u32,
    /// Exact max spread (seconds).
    pub window_secs: u32,
    /// Relaxed window start (minutes after kick-off).
    pub relaxed_time_from: u32,
    /// Relaxed window end (minutes after kick-off).
    pub relaxed_time_to: u32,
    /// Relaxed max spread (seconds).
    pub relaxed_window_secs: u32,
    /// Run the relaxed phase when the exact phase finds nothing.
    pub enable_relaxed_phase: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            time_from: 55,
            time_to: 60,
            window_secs: 60,
            relaxed_time_from: 54,
            relaxed_time_to: 60,
            relaxed_window_secs: 180,
            enable_relaxed_phase: true,
        }
    }
}

impl SearchConfig {
    pub fn exact_window(&self) -> SearchWindow {
        SearchWindow {
            from_minutes: self.time_from,
            to_minutes: self.time_to,
            max_gap_secs: self.window_secs,
        }
    }

    pub fn relaxed_window(&self) -> SearchWindow {
        SearchWindow {
            from_minutes: self.relaxed_time_from,
            to_minutes: self.relaxed_time_to,
            max_gap_secs: self.relaxed_window_secs,
        }
    }
}

/// Kick-off correction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KickoffConfig {
    /// Correct the scheduled kick-off from observed end-of-match activity.
    pub enable_correction: bool,
    /// Minutes between kick-off and the last trading activity of a match.
    pub match_offset_minutes: i64,
    /// Max difference (hours) at which scheduled and candidate agree.
    pub tolerance_hours: f64,
    /// Duration above which a match is flagged as suspiciously long.
    pub long_match_hours: f64,
}

impl Default for KickoffConfig {
    fn default() -> Self {
        Self {
            enable_correction: true,
            match_offset_minutes: 90,
            tolerance_hours: 0.01,
            long_match_hours: 2.5,
        }
    }
}

/// Batch driver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Input root scanned recursively.
    pub input: Option<PathBuf>,
    /// Number of parallel workers (0 = auto, 1 = sequential).
    pub workers: usize,
    /// File name suffixes that are never treated as stream files.
    pub skip_extensions: Vec<String>,
    /// Log progress every N files (0 = never).
    pub progress_every: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input: None,
            workers: 0,
            skip_extensions: [".bz2", ".xlsx", ".log", ".txt"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            progress_every: 100,
        }
    }
}

impl Config {
    /// Parse a JSON document; missing sections and fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut config: Config = serde_json::from_str(json)?;
        config.normalize();
        Ok(config)
    }

    /// Parse a `key = value` settings document.
    ///
    /// Blank lines and `#` comments are skipped, keys are case-insensitive,
    /// and values that do not parse fall back to the default with a warning.
    pub fn from_settings_str(text: &str) -> Result<Self> {
        let mut config = Config::default();

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!("Ignoring malformed settings line: '{line}'");
                continue;
            };
            config.apply_setting(&key.trim().to_lowercase(), value.trim())?;
        }

        config.normalize();
        Ok(config)
    }

    fn apply_setting(&mut self, key: &str, value: &str) -> Result<()> {
        let search = &mut self.search;
        match key {
            "input" | "input_dir" => {
                if value.is_empty() {
                    return Err(Error::config("input must not be empty"));
                }
                self.batch.input = Some(PathBuf::from(value));
            }
            "time_from" => search.time_from = parse_or(key, value, search.time_from),
            "time_to" => search.time_to = parse_or(key, value, search.time_to),
            "window_secs" => search.window_secs = parse_or(key, value, search.window_secs),
            "relaxed_time_from" => {
                search.relaxed_time_from = parse_or(key, value, search.relaxed_time_from)
            }
            "relaxed_time_to" => {
                search.relaxed_time_to = parse_or(key, value, search.relaxed_time_to)
            }
            "relaxed_window_secs" => {
                search.relaxed_window_secs = parse_or(key, value, search.relaxed_window_secs)
            }
            "enable_relaxed_phase" => search.enable_relaxed_phase = parse_flag(value),
            "enable_correction" => self.kickoff.enable_correction = parse_flag(value),
            "workers" => self.batch.workers = parse_or(key, value, self.batch.workers),
            _ => debug!("Ignoring unknown setting '{key}'"),
        }
        Ok(())
    }

    /// Swap inverted windows so every window has `from <= to`.
    pub fn normalize(&mut self) {
        let s = &mut self.search;
        if s.time_from > s.time_to {
            warn!(
                "time_from ({}) greater than time_to ({}); swapping",
                s.time_from, s.time_to
            );
            std::mem::swap(&mut s.time_from, &mut s.time_to);
        }
        if s.relaxed_time_from > s.relaxed_time_to {
            warn!(
                "relaxed_time_from ({}) greater than relaxed_time_to ({}); swapping",
                s.relaxed_time_from, s.relaxed_time_to
            );
            std::mem::swap(&mut s.relaxed_time_from, &mut s.relaxed_time_to);
        }
    }
}

fn parse_or<T>(key: &str, value: &str, fallback: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    value.parse().unwrap_or_else(|_| {
        warn!("Invalid integer for {key}: '{value}'. Using fallback {fallback}.");
        fallback
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "y" | "yes" | "true" | "1" | "on"
    )
}
