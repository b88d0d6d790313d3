//! Per-file pipeline: ingest, correct the kick-off, search, build the record.

use std::io::BufRead;

use tracing::debug;

use triad_core::{Config, CorrectedKickoff, MatchRecord, Result, TriadCandidate};
use triad_ingestion::{IngestStats, IngestedMarket, StreamIngester};

use crate::kickoff::{resolve_kickoff, KickoffCorrector};
use crate::record::MatchRecordBuilder;
use crate::search::{assign_roles, TriadSearcher, TriadSelection};

/// Why a file produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoRecordReason {
    /// No football Match Odds definition in the file.
    NoQualifyingMarket,
    /// The tracked market does not have exactly three outcomes.
    WrongOutcomeCount(usize),
}

/// Typed result of one file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Record(MatchRecord),
    NoRecord(NoRecordReason),
}

impl FileOutcome {
    pub fn record(&self) -> Option<&MatchRecord> {
        match self {
            FileOutcome::Record(record) => Some(record),
            FileOutcome::NoRecord(_) => None,
        }
    }

    pub fn into_record(self) -> Option<MatchRecord> {
        match self {
            FileOutcome::Record(record) => Some(record),
            FileOutcome::NoRecord(_) => None,
        }
    }
}

/// Outcome of one file plus diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub outcome: FileOutcome,
    pub stats: IngestStats,
    /// Candidates of the phase that produced the triad.
    pub candidates: Vec<TriadCandidate>,
    pub correction: Option<CorrectedKickoff>,
}

impl FileReport {
    fn without_record(reason: NoRecordReason, stats: IngestStats) -> Self {
        Self {
            outcome: FileOutcome::NoRecord(reason),
            stats,
            candidates: Vec::new(),
            correction: None,
        }
    }
}

/// Runs every analysis stage over one file.
#[derive(Debug, Clone)]
pub struct MatchPipeline {
    corrector: KickoffCorrector,
    searcher: TriadSearcher,
    builder: MatchRecordBuilder,
}

impl MatchPipeline {
    /// Create a new pipeline.
    pub fn new(config: &Config) -> Self {
        Self {
            corrector: KickoffCorrector::new(config.kickoff.clone()),
            searcher: TriadSearcher::new(config.search.clone()),
            builder: MatchRecordBuilder::new(&config.kickoff),
        }
    }

    /// Process lines read from a file.
    pub fn process_reader<R: BufRead>(&self, reader: R) -> Result<FileReport> {
        let (market, stats) = StreamIngester::ingest_reader(reader)?;
        Ok(self.analyze(market, stats))
    }

    /// Process lines already in memory.
    pub fn process_lines<I, S>(&self, lines: I) -> FileReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (market, stats) = StreamIngester::ingest_lines(lines);
        self.analyze(market, stats)
    }

    /// Run correction, search and record assembly over an ingested market.
    pub fn analyze(&self, market: Option<IngestedMarket>, stats: IngestStats) -> FileReport {
        debug!(?stats, "Ingested stream");

        let Some(market) = market else {
            return FileReport::without_record(NoRecordReason::NoQualifyingMarket, stats);
        };
        let Some(roles) = assign_roles(&market.definition) else {
            debug!(
                "Market {} has {} outcomes, skipping",
                market.market_id,
                market.runner_count()
            );
            return FileReport::without_record(
                NoRecordReason::WrongOutcomeCount(market.runner_count()),
                stats,
            );
        };

        let correction = self.corrector.correct(
            market.first_market_time.as_deref(),
            market.last_price_ms,
            market.last_tick_ms,
        );
        let kickoff = resolve_kickoff(correction.as_ref(), &market);

        let selection = match kickoff {
            Some(kickoff) => self.searcher.search(&market.history, &roles, kickoff),
            None => {
                debug!("Market {} has no usable kick-off time", market.market_id);
                TriadSelection::none(false)
            }
        };

        let record = self
            .builder
            .build(&market, &roles, correction.as_ref(), kickoff, &selection);
        debug!(
            "Market {}: {} ({} price updates)",
            record.market_id, record.selection_method, record.total_price_updates
        );

        FileReport {
            outcome: FileOutcome::Record(record),
            stats,
            candidates: selection.candidates,
            correction,
        }
    }
}
