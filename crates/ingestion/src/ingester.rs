//! Reconstruction of a Match Odds market from one stream file.
//!
//! The ingester locks onto the first football Match Odds market definition it
//! sees and from then on collects last traded prices for that market only,
//! together with the scheduling strings and activity timestamps the kick-off
//! correction needs.

use std::io::BufRead;

use ordered_float::OrderedFloat;
use tracing::{debug, trace};

use triad_core::{MarketDefinition, PriceUpdate, Result, SelectionPriceHistory, TimestampMs};

use crate::event::{decode_line, MarketChange, RawEvent};

/// Counters describing how a stream was consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Lines read (including blank ones).
    pub lines: u64,
    /// Blank lines.
    pub blank_lines: u64,
    /// Lines that did not decode as JSON events.
    pub malformed_lines: u64,
    /// Decoded events that were not market changes.
    pub ignored_events: u64,
    /// Market change events whose publish time could not be normalized.
    pub unparsable_timestamps: u64,
    /// Change entries for markets other than the tracked one.
    pub foreign_changes: u64,
    /// Price updates recorded for the tracked market.
    pub price_updates: u64,
}

/// Everything the analysis stages need from one stream file.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedMarket {
    /// Identity of the tracked market.
    pub market_id: String,
    /// Last traded prices per runner, in arrival order.
    pub history: SelectionPriceHistory,
    /// Latest definition seen for the tracked market.
    pub definition: MarketDefinition,
    /// `marketTime` of the first definition that carried one.
    pub first_market_time: Option<String>,
    /// `openDate` of the first definition that carried one.
    pub first_open_date: Option<String>,
    /// Latest real price update (not during suspension or closure).
    pub last_price_ms: Option<TimestampMs>,
    /// Latest change of any kind for the tracked market.
    pub last_tick_ms: Option<TimestampMs>,
}

impl IngestedMarket {
    /// Number of runners in the latest definition.
    pub fn runner_count(&self) -> usize {
        self.definition.runners.len()
    }
}

/// Stateful consumer of one file's stream lines.
#[derive(Debug, Default)]
pub struct StreamIngester {
    market_id: Option<String>,
    definition: Option<MarketDefinition>,
    first_market_time: Option<String>,
    first_open_date: Option<String>,
    history: SelectionPriceHistory,
    last_price_ms: Option<TimestampMs>,
    last_tick_ms: Option<TimestampMs>,
    stats: IngestStats,
}

impl StreamIngester {
    /// Create a new ingester.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume every line of a reader.
    ///
    /// I/O errors abort the file; undecodable lines are skipped.
    pub fn ingest_reader<R: BufRead>(reader: R) -> Result<(Option<IngestedMarket>, IngestStats)> {
        let mut ingester = Self::new();
        for line in reader.lines() {
            ingester.push_line(&line?);
        }
        Ok(ingester.finish())
    }

    /// Consume lines already in memory.
    pub fn ingest_lines<I, S>(lines: I) -> (Option<IngestedMarket>, IngestStats)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ingester = Self::new();
        for line in lines {
            ingester.push_line(line.as_ref());
        }
        ingester.finish()
    }

    /// Consume one raw line.
    pub fn push_line(&mut self, line: &str) {
        self.stats.lines += 1;

        let line = line.trim();
        if line.is_empty() {
            self.stats.blank_lines += 1;
            return;
        }

        match decode_line(line) {
            Ok(event) => self.push_event(event),
            Err(e) => {
                self.stats.malformed_lines += 1;
                trace!("Skipping line {}: {e}", self.stats.lines);
            }
        }
    }

    /// Consume one decoded event.
    pub fn push_event(&mut self, event: RawEvent) {
        if !event.is_market_change() {
            self.stats.ignored_events += 1;
            return;
        }

        let ts_ms = match event.pt.as_ref().map(|pt| pt.to_ms()).transpose() {
            Ok(ts) => ts,
            Err(e) => {
                self.stats.unparsable_timestamps += 1;
                debug!("Ignoring timestamp on line {}: {e}", self.stats.lines);
                None
            }
        };

        for change in event.mc.unwrap_or_default() {
            self.apply_change(change, ts_ms);
        }
    }

    fn apply_change(&mut self, change: MarketChange, ts_ms: Option<TimestampMs>) {
        let MarketChange {
            id,
            market_definition,
            rc,
        } = change;

        let suspended_or_closed = market_definition
            .as_ref()
            .is_some_and(MarketDefinition::is_suspended_or_closed);

        if let Some(definition) = market_definition {
            self.apply_definition(&id, definition);
        }

        if self.market_id.as_deref() != Some(id.as_str()) {
            if self.market_id.is_some() {
                self.stats.foreign_changes += 1;
            }
            return;
        }

        let Some(ts_ms) = ts_ms else {
            return;
        };
        self.last_tick_ms = Some(self.last_tick_ms.map_or(ts_ms, |last| last.max(ts_ms)));

        let mut recorded = false;
        for (selection_id, ltp) in rc.iter().flatten().filter_map(|r| r.priced()) {
            self.history.record(PriceUpdate {
                selection_id,
                ts_ms,
                ltp: OrderedFloat(ltp),
            });
            self.stats.price_updates += 1;
            recorded = true;
        }

        if recorded && !suspended_or_closed {
            self.last_price_ms = Some(self.last_price_ms.map_or(ts_ms, |last| last.max(ts_ms)));
        }
    }

    fn apply_definition(&mut self, market_id: &str, definition: MarketDefinition) {
        if !definition.is_football_match_odds() {
            return;
        }

        match self.market_id.as_deref() {
            None => {
                debug!("Tracking Match Odds market {market_id}");
                self.market_id = Some(market_id.to_string());
            }
            Some(locked) if locked == market_id => {}
            Some(_) => return,
        }

        if self.first_market_time.is_none() {
            self.first_market_time = definition.market_time.clone();
        }
        if self.first_open_date.is_none() {
            self.first_open_date = definition.open_date.clone();
        }
        self.definition = Some(definition);
    }

    /// Finish the stream, returning the tracked market if one was found.
    pub fn finish(self) -> (Option<IngestedMarket>, IngestStats) {
        let market = match (self.market_id, self.definition) {
            (Some(market_id), Some(definition)) => Some(IngestedMarket {
                market_id,
                history: self.history,
                definition,
                first_market_time: self.first_market_time,
                first_open_date: self.first_open_date,
                last_price_ms: self.last_price_ms,
                last_tick_ms: self.last_tick_ms,
            }),
            _ => None,
        };
        (market, self.stats)
    }
}
