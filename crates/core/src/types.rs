//! Core data types for Match Odds triad extraction.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Timestamp in milliseconds since Unix epoch (UTC).
pub type TimestampMs = i64;

/// Last traded price with ordering support.
pub type Price = OrderedFloat<f64>;

/// Exchange runner (outcome) identifier.
pub type SelectionId = u64;

/// Event type tag used by the exchange for football.
pub const FOOTBALL_EVENT_TYPE: &str = "1";

/// Market type tag of the three-outcome match result market.
pub const MATCH_ODDS_MARKET_TYPE: &str = "MATCH_ODDS";

/// Runner status marking the settled winning outcome.
pub const WINNER_STATUS: &str = "WINNER";

/// Identifier that the exchange sends either as a string or as an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseId {
    Text(String),
    Number(i64),
}

impl LooseId {
    /// Compare against a textual tag regardless of wire representation.
    pub fn matches(&self, tag: &str) -> bool {
        match self {
            LooseId::Text(s) => s == tag,
            LooseId::Number(n) => n.to_string() == tag,
        }
    }
}

impl fmt::Display for LooseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LooseId::Text(s) => f.write_str(s),
            LooseId::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Market lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketStatus {
    Inactive,
    Open,
    Suspended,
    Closed,
    #[serde(other)]
    Unknown,
}

impl MarketStatus {
    /// Suspension and closure ticks carry no tradable price signal.
    #[inline]
    pub fn is_suspended_or_closed(self) -> bool {
        matches!(self, MarketStatus::Suspended | MarketStatus::Closed)
    }
}

/// One runner entry of a market definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerDefinition {
    pub id: SelectionId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub sort_priority: Option<u32>,
}

impl RunnerDefinition {
    /// Display name, empty when the stream omitted it.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Whether the runner settled as the winner.
    pub fn is_winner(&self) -> bool {
        self.status.as_deref() == Some(WINNER_STATUS)
    }
}

/// Market definition snapshot as carried by a market change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDefinition {
    #[serde(default)]
    pub event_type_id: Option<LooseId>,
    #[serde(default)]
    pub market_type: Option<String>,
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub event_id: Option<LooseId>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub market_time: Option<String>,
    #[serde(default)]
    pub open_date: Option<String>,
    #[serde(default)]
    pub status: Option<MarketStatus>,
    #[serde(default)]
    pub runners: Vec<RunnerDefinition>,
}

impl MarketDefinition {
    /// Football Match Odds is the only market the extractor tracks.
    pub fn is_football_match_odds(&self) -> bool {
        let football = self
            .event_type_id
            .as_ref()
            .is_some_and(|id| id.matches(FOOTBALL_EVENT_TYPE));
        football && self.market_type.as_deref() == Some(MATCH_ODDS_MARKET_TYPE)
    }

    /// Whether this snapshot suspends or closes the market.
    pub fn is_suspended_or_closed(&self) -> bool {
        self.status.is_some_and(MarketStatus::is_suspended_or_closed)
    }
}

/// A single last-traded-price observation for one runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub selection_id: SelectionId,
    pub ts_ms: TimestampMs,
    pub ltp: Price,
}

/// Per-runner price histories in arrival order.
///
/// Nothing is deduplicated or re-sorted here; the triad search sorts its own
/// working copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionPriceHistory {
    histories: BTreeMap<SelectionId, Vec<PriceUpdate>>,
}

impl SelectionPriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an update to its runner's history.
    pub fn record(&mut self, update: PriceUpdate) {
        self.histories
            .entry(update.selection_id)
            .or_default()
            .push(update);
    }

    /// Updates for one runner, in arrival order.
    pub fn updates(&self, selection_id: SelectionId) -> &[PriceUpdate] {
        self.histories
            .get(&selection_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Iterate over all runners and their histories.
    pub fn iter(&self) -> impl Iterator<Item = (SelectionId, &[PriceUpdate])> {
        self.histories.iter().map(|(id, v)| (*id, v.as_slice()))
    }

    /// Total number of updates across all runners.
    pub fn total_updates(&self) -> usize {
        self.histories.values().map(Vec::len).sum()
    }

    /// Number of runners with at least one update.
    pub fn selection_count(&self) -> usize {
        self.histories.len()
    }
}

/// Position of a runner in the 1X2 layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeRole {
    Home,
    Draw,
    Away,
}

impl OutcomeRole {
    /// Roles in sort-priority order.
    pub const ALL: [OutcomeRole; 3] = [OutcomeRole::Home, OutcomeRole::Draw, OutcomeRole::Away];
}

/// A runner assigned to a 1X2 role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role: OutcomeRole,
    pub selection_id: SelectionId,
    pub name: String,
}

/// One leg of a triad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriadEntry {
    pub role: OutcomeRole,
    pub selection_id: SelectionId,
    pub name: String,
    pub ts_ms: TimestampMs,
    pub ltp: Price,
}

/// Three synchronized prices resolved around an anchor timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriadCandidate {
    /// Anchor (snapshot) timestamp.
    pub anchor_ms: TimestampMs,
    /// Max pairwise distance between the three leg timestamps.
    pub spread_ms: i64,
    /// Legs in home, draw, away order.
    pub entries: [TriadEntry; 3],
}

impl TriadCandidate {
    /// Leg for a role.
    pub fn entry(&self, role: OutcomeRole) -> &TriadEntry {
        match role {
            OutcomeRole::Home => &self.entries[0],
            OutcomeRole::Draw => &self.entries[1],
            OutcomeRole::Away => &self.entries[2],
        }
    }
}

/// Which search phase produced the triad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    Exact,
    Relaxed,
    None,
}

impl SelectionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionMethod::Exact => "exact",
            SelectionMethod::Relaxed => "relaxed",
            SelectionMethod::None => "none",
        }
    }
}

impl fmt::Display for SelectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Activity timestamp the corrected kick-off was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KickoffReference {
    /// Last runner change carrying a price outside suspension/closure.
    LastPrice,
    /// Last change of any kind for the tracked market.
    LastTick,
}

/// Result of reconciling the scheduled kick-off with observed activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectedKickoff {
    /// Scheduled kick-off from the first market definition.
    pub scheduled: DateTime<Utc>,
    /// Kick-off to use downstream.
    pub corrected: DateTime<Utc>,
    /// Minute-of-hour of the scheduled kick-off.
    pub minute_pattern: u32,
    /// Whether `corrected` differs from `scheduled` beyond tolerance.
    pub applied: bool,
    /// `corrected - scheduled` in hours (0 when not applied).
    pub correction_hours: f64,
    /// Reference the final candidate came from, if a candidate was computed.
    pub reference: Option<KickoffReference>,
}

/// Settlement tag for one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultTag {
    Winner,
    Loser,
}

/// Prices of the selected triad with the time each leg was traded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriadPrices {
    pub anchor: DateTime<Utc>,
    /// Max distance between the three leg timestamps.
    pub spread_ms: i64,
    pub home: Price,
    pub home_ts: DateTime<Utc>,
    pub draw: Price,
    pub draw_ts: DateTime<Utc>,
    pub away: Price,
    pub away_ts: DateTime<Utc>,
}

/// Final per-file output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub market_id: String,
    pub event_id: String,
    pub event_name: String,
    /// Country code of the competition.
    pub division: String,
    pub market_type: String,
    pub home_team: String,
    pub away_team: String,
    pub home_result: Option<ResultTag>,
    pub draw_result: Option<ResultTag>,
    pub away_result: Option<ResultTag>,
    /// Kick-off the triad windows were anchored on.
    pub kickoff: Option<DateTime<Utc>>,
    /// Kick-off from the first market definition.
    pub scheduled_kickoff: Option<DateTime<Utc>>,
    pub kickoff_corrected: bool,
    pub correction_hours: Option<f64>,
    pub minute_pattern: Option<u32>,
    pub last_price_at: Option<DateTime<Utc>>,
    pub last_tick_at: Option<DateTime<Utc>>,
    /// Hours from scheduled kick-off to the last real price.
    pub match_duration_hours: Option<f64>,
    pub long_by_last_price: bool,
    pub long_by_last_tick: bool,
    pub total_price_updates: usize,
    pub triad: Option<TriadPrices>,
    pub selection_method: SelectionMethod,
}
