//! Run-wide statistics.

use tracing::info;

use triad_analysis::{FileOutcome, FileReport, NoRecordReason};
use triad_core::SelectionMethod;

use crate::driver::FileFailure;

/// Counters accumulated over every file of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Files discovered and processed.
    pub files_scanned: u64,
    /// Files that produced a record.
    pub matches: u64,
    /// Files without a football Match Odds market.
    pub no_market: u64,
    /// Files whose market did not have three outcomes.
    pub wrong_outcome_count: u64,
    /// Records with an exact triad.
    pub exact: u64,
    /// Records with a relaxed triad.
    pub relaxed: u64,
    /// Records without a triad.
    pub none: u64,
    /// Records whose kick-off was corrected.
    pub corrections_applied: u64,
    /// Files that failed to process.
    pub errors: u64,
    /// Undecodable lines skipped across all files.
    pub malformed_lines: u64,
    /// Price updates recorded across all files.
    pub price_updates: u64,
}

impl RunSummary {
    /// Create an empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one file result into the counters.
    pub fn record(&mut self, result: &Result<FileReport, FileFailure>) {
        self.files_scanned += 1;

        let report = match result {
            Ok(report) => report,
            Err(_) => {
                self.errors += 1;
                return;
            }
        };

        self.malformed_lines += report.stats.malformed_lines;
        self.price_updates += report.stats.price_updates;

        match &report.outcome {
            FileOutcome::NoRecord(NoRecordReason::NoQualifyingMarket) => self.no_market += 1,
            FileOutcome::NoRecord(NoRecordReason::WrongOutcomeCount(_)) => {
                self.wrong_outcome_count += 1
            }
            FileOutcome::Record(record) => {
                self.matches += 1;
                match record.selection_method {
                    SelectionMethod::Exact => self.exact += 1,
                    SelectionMethod::Relaxed => self.relaxed += 1,
                    SelectionMethod::None => self.none += 1,
                }
                if record.kickoff_corrected {
                    self.corrections_applied += 1;
                }
            }
        }
    }

    /// Share of matches that produced a triad (0 when there are no matches).
    pub fn coverage(&self) -> f64 {
        if self.matches == 0 {
            return 0.0;
        }
        (self.exact + self.relaxed) as f64 / self.matches as f64
    }

    /// Log the run summary.
    pub fn log_summary(&self) {
        info!("=== Run Summary ===");
        info!("Files scanned: {}", self.files_scanned);
        info!(
            "Matches: {} (no market: {}, wrong outcome count: {})",
            self.matches, self.no_market, self.wrong_outcome_count
        );
        info!(
            "Triads: exact {}, relaxed {}, none {} (coverage {:.1}%)",
            self.exact,
            self.relaxed,
            self.none,
            self.coverage() * 100.0
        );
        info!("Kick-off corrections applied: {}", self.corrections_applied);
        info!(
            "Errors: {}, malformed lines skipped: {}, price updates: {}",
            self.errors, self.malformed_lines, self.price_updates
        );
    }
}
