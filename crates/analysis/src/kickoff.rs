//! Kick-off time correction.
//!
//! Scheduled kick-off times in market definitions are sometimes off by whole
//! hours, while their minute-of-hour is reliable. The end of trading is a
//! good proxy for the final whistle, so the corrected kick-off is the last
//! activity minus the match length, snapped down to the scheduled minute.

use chrono::{DateTime, Timelike, Utc};
use tracing::{debug, info, warn};

use triad_core::time::{hours_between, minutes_to_ms, ms_to_utc, parse_market_time};
use triad_core::{
    CorrectedKickoff, Error, KickoffConfig, KickoffReference, Result, TimestampMs,
};
use triad_ingestion::IngestedMarket;

const MS_PER_HOUR: i64 = 3_600_000;

/// Latest instant `<= ts_ms` whose minute-of-hour is `minute` and whose
/// seconds are zero.
///
/// Returns `None` when the result does not fit in an `i64`.
pub fn snap_down_to_minute(ts_ms: TimestampMs, minute: u32) -> Option<TimestampMs> {
    let hour_start = ts_ms.div_euclid(MS_PER_HOUR).checked_mul(MS_PER_HOUR)?;
    let candidate = hour_start.checked_add(minutes_to_ms(minute))?;
    if candidate <= ts_ms {
        Some(candidate)
    } else {
        candidate.checked_sub(MS_PER_HOUR)
    }
}

/// Derives corrected kick-off times from observed market activity.
#[derive(Debug, Clone)]
pub struct KickoffCorrector {
    config: KickoffConfig,
}

impl KickoffCorrector {
    /// Create a new corrector.
    pub fn new(config: KickoffConfig) -> Self {
        Self { config }
    }

    /// Kick-off candidate implied by one activity reference.
    pub fn candidate(&self, minute_pattern: u32, reference_ms: TimestampMs) -> Result<DateTime<Utc>> {
        let snapped = self
            .config
            .match_offset_minutes
            .checked_mul(60_000)
            .and_then(|offset| reference_ms.checked_sub(offset))
            .and_then(|estimated_end| snap_down_to_minute(estimated_end, minute_pattern))
            .ok_or_else(|| {
                Error::unparsable_timestamp(format!("{reference_ms} ms out of range"))
            })?;
        ms_to_utc(snapped)
    }

    /// Reconcile the scheduled kick-off with the last real price and, failing
    /// that, the last tick.
    ///
    /// Returns `None` when there is no parsable schedule. Without a last real
    /// price no correction is attempted and the schedule is returned as is.
    pub fn correct(
        &self,
        scheduled: Option<&str>,
        last_price_ms: Option<TimestampMs>,
        last_tick_ms: Option<TimestampMs>,
    ) -> Option<CorrectedKickoff> {
        let scheduled_str = scheduled?;
        let scheduled = match parse_market_time(scheduled_str) {
            Ok(dt) => dt,
            Err(e) => {
                warn!("Could not parse market time: {e}");
                return None;
            }
        };
        let minute_pattern = scheduled.minute();
        let unchanged = |reference| CorrectedKickoff {
            scheduled,
            corrected: scheduled,
            minute_pattern,
            applied: false,
            correction_hours: 0.0,
            reference,
        };

        if !self.config.enable_correction || last_price_ms.is_none() {
            return Some(unchanged(None));
        }

        let references = [
            (KickoffReference::LastPrice, last_price_ms),
            (KickoffReference::LastTick, last_tick_ms),
        ];

        let mut fallback = None;
        for (reference, reference_ms) in references {
            let Some(reference_ms) = reference_ms else {
                continue;
            };
            let candidate = match self.candidate(minute_pattern, reference_ms) {
                Ok(candidate) => candidate,
                Err(e) => {
                    debug!("Abandoning {reference:?} correction attempt: {e}");
                    continue;
                }
            };

            let diff_hours = hours_between(scheduled, candidate);
            debug!(
                "{reference:?} candidate {} vs scheduled {} ({diff_hours:.2}h)",
                candidate.format("%Y-%m-%d %H:%M"),
                scheduled.format("%Y-%m-%d %H:%M"),
            );
            if diff_hours.abs() <= self.config.tolerance_hours {
                return Some(unchanged(Some(reference)));
            }
            fallback = Some((reference, candidate, diff_hours));
        }

        match fallback {
            Some((reference, corrected, diff_hours)) => {
                info!(
                    "Kickoff corrected: {} -> {} (pattern: XX:{minute_pattern:02}, diff: {diff_hours:.2}h)",
                    scheduled.format("%Y-%m-%d %H:%M"),
                    corrected.format("%Y-%m-%d %H:%M"),
                );
                Some(CorrectedKickoff {
                    scheduled,
                    corrected,
                    minute_pattern,
                    applied: true,
                    correction_hours: diff_hours,
                    reference: Some(reference),
                })
            }
            None => Some(unchanged(None)),
        }
    }
}

/// Kick-off to anchor the triad windows on.
///
/// Prefers the corrected kick-off, then the first scheduled time, the latest
/// definition's scheduled time, and finally the first open date.
pub fn resolve_kickoff(
    correction: Option<&CorrectedKickoff>,
    market: &IngestedMarket,
) -> Option<DateTime<Utc>> {
    if let Some(correction) = correction {
        return Some(correction.corrected);
    }

    [
        market.first_market_time.as_deref(),
        market.definition.market_time.as_deref(),
        market.first_open_date.as_deref(),
    ]
    .into_iter()
    .flatten()
    .find_map(|s| parse_market_time(s).ok())
}
