//! Assembly of the per-file match record.

use chrono::{DateTime, Utc};

use triad_core::time::{hours_between, ms_to_utc, parse_market_time};
use triad_core::{
    CorrectedKickoff, KickoffConfig, MatchRecord, OutcomeRole, ResultTag, RoleAssignment,
    TriadPrices,
};
use triad_ingestion::IngestedMarket;

use crate::search::TriadSelection;

const TEAM_SEPARATOR: &str = " v ";

/// Split `"Home v Away"` into team names.
///
/// Without the separator the whole name is the home team.
pub fn split_teams(event_name: &str) -> (String, String) {
    match event_name.split_once(TEAM_SEPARATOR) {
        Some((home, away)) => (home.trim().to_string(), away.trim().to_string()),
        None => (event_name.trim().to_string(), String::new()),
    }
}

/// Builds [`MatchRecord`]s from the outputs of the analysis stages.
#[derive(Debug, Clone)]
pub struct MatchRecordBuilder {
    long_match_hours: f64,
}

impl MatchRecordBuilder {
    /// Create a new builder.
    pub fn new(config: &KickoffConfig) -> Self {
        Self {
            long_match_hours: config.long_match_hours,
        }
    }

    /// Build the record for a three-outcome market.
    pub fn build(
        &self,
        market: &IngestedMarket,
        roles: &[RoleAssignment; 3],
        correction: Option<&CorrectedKickoff>,
        kickoff: Option<DateTime<Utc>>,
        selection: &TriadSelection,
    ) -> MatchRecord {
        let definition = &market.definition;
        let event_name = definition.event_name.clone().unwrap_or_default();
        let (home_team, away_team) = split_teams(&event_name);
        let [home_result, draw_result, away_result] = result_tags(market, roles);

        let scheduled_kickoff = match correction {
            Some(c) => Some(c.scheduled),
            None => market
                .first_market_time
                .as_deref()
                .and_then(|s| parse_market_time(s).ok()),
        };
        let last_price_at = market.last_price_ms.and_then(|ms| ms_to_utc(ms).ok());
        let last_tick_at = market.last_tick_ms.and_then(|ms| ms_to_utc(ms).ok());

        let duration_to = |end: Option<DateTime<Utc>>| {
            scheduled_kickoff
                .zip(end)
                .map(|(start, end)| hours_between(start, end))
        };
        let match_duration_hours = duration_to(last_price_at);
        let tick_duration_hours = duration_to(last_tick_at);
        let is_long = |hours: Option<f64>| hours.is_some_and(|h| h > self.long_match_hours);

        let triad = selection.best.as_ref().and_then(|best| {
            let home = best.entry(OutcomeRole::Home);
            let draw = best.entry(OutcomeRole::Draw);
            let away = best.entry(OutcomeRole::Away);
            Some(TriadPrices {
                anchor: ms_to_utc(best.anchor_ms).ok()?,
                spread_ms: best.spread_ms,
                home: home.ltp,
                home_ts: ms_to_utc(home.ts_ms).ok()?,
                draw: draw.ltp,
                draw_ts: ms_to_utc(draw.ts_ms).ok()?,
                away: away.ltp,
                away_ts: ms_to_utc(away.ts_ms).ok()?,
            })
        });

        MatchRecord {
            market_id: market.market_id.clone(),
            event_id: definition
                .event_id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            event_name,
            division: definition.country_code.clone().unwrap_or_default(),
            market_type: definition.market_type.clone().unwrap_or_default(),
            home_team,
            away_team,
            home_result,
            draw_result,
            away_result,
            kickoff,
            scheduled_kickoff,
            kickoff_corrected: correction.is_some_and(|c| c.applied),
            correction_hours: correction.filter(|c| c.applied).map(|c| c.correction_hours),
            minute_pattern: correction.map(|c| c.minute_pattern),
            last_price_at,
            last_tick_at,
            match_duration_hours,
            long_by_last_price: is_long(match_duration_hours),
            long_by_last_tick: is_long(tick_duration_hours),
            total_price_updates: market.history.total_updates(),
            triad,
            selection_method: selection.method,
        }
    }
}

/// WINNER/LOSER per role, or nothing when no runner is marked a winner.
fn result_tags(market: &IngestedMarket, roles: &[RoleAssignment; 3]) -> [Option<ResultTag>; 3] {
    let runners = &market.definition.runners;
    let is_winner = |selection_id| {
        runners
            .iter()
            .any(|r| r.id == selection_id && r.is_winner())
    };

    if !roles.iter().any(|role| is_winner(role.selection_id)) {
        return [None; 3];
    }

    roles.each_ref().map(|role| {
        Some(if is_winner(role.selection_id) {
            ResultTag::Winner
        } else {
            ResultTag::Loser
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ordered_float::OrderedFloat;
    use triad_core::{
        KickoffReference, LooseId, MarketDefinition, PriceUpdate, RunnerDefinition,
        SelectionMethod, SelectionPriceHistory, TimestampMs, TriadCandidate, TriadEntry,
    };

    use crate::search::assign_roles;

    fn at(s: &str) -> TimestampMs {
        parse_market_time(s).unwrap().timestamp_millis()
    }

    fn make_runner(id: u64, name: &str, status: &str, priority: u32) -> RunnerDefinition {
        RunnerDefinition {
            id,
            name: Some(name.to_string()),
            status: Some(status.to_string()),
            sort_priority: Some(priority),
        }
    }

    fn make_market(statuses: [&str; 3]) -> IngestedMarket {
        let mut history = SelectionPriceHistory::new();
        for (i, id) in [10, 20, 30].into_iter().enumerate() {
            history.record(PriceUpdate {
                selection_id: id,
                ts_ms: at("2019-05-12T14:59:00Z") + i as i64 * 1000,
                ltp: OrderedFloat(2.0 + i as f64),
            });
        }
        IngestedMarket {
            market_id: "1.158000001".to_string(),
            history,
            definition: MarketDefinition {
                event_name: Some("Arsenal v  Chelsea ".to_string()),
                event_id: Some(LooseId::Number(29001)),
                country_code: Some("GB".to_string()),
                market_type: Some("MATCH_ODDS".to_string()),
                runners: vec![
                    make_runner(10, "Arsenal", statuses[0], 1),
                    make_runner(20, "Chelsea", statuses[1], 2),
                    make_runner(30, "The Draw", statuses[2], 3),
                ],
                ..Default::default()
            },
            first_market_time: Some("2019-05-12T14:00:00.000Z".to_string()),
            first_open_date: None,
            last_price_ms: Some(at("2019-05-12T17:40:00Z")),
            last_tick_ms: Some(at("2019-05-12T17:45:00Z")),
        }
    }

    fn make_selection(anchor_ms: TimestampMs) -> TriadSelection {
        let entry = |role, ltp, ts_ms| TriadEntry {
            role,
            selection_id: 0,
            name: String::new(),
            ts_ms,
            ltp: OrderedFloat(ltp),
        };
        TriadSelection {
            method: SelectionMethod::Exact,
            best: Some(TriadCandidate {
                anchor_ms,
                spread_ms: 40_000,
                entries: [
                    entry(OutcomeRole::Home, 2.1, anchor_ms - 40_000),
                    entry(OutcomeRole::Draw, 3.4, anchor_ms - 25_000),
                    entry(OutcomeRole::Away, 3.9, anchor_ms),
                ],
            }),
            candidates: Vec::new(),
            relaxed_attempted: false,
        }
    }

    #[test]
    fn test_split_teams() {
        assert_eq!(
            split_teams("Arsenal v Chelsea"),
            ("Arsenal".to_string(), "Chelsea".to_string())
        );
        assert_eq!(
            split_teams("Man Utd v West Ham v X"),
            ("Man Utd".to_string(), "West Ham v X".to_string())
        );
        assert_eq!(split_teams("Arsenal vs Chelsea"), ("Arsenal vs Chelsea".to_string(), String::new()));
        assert_eq!(split_teams(""), (String::new(), String::new()));
    }

    #[test]
    fn test_build_full_record() {
        let market = make_market(["LOSER", "WINNER", "LOSER"]);
        let roles = assign_roles(&market.definition).unwrap();
        let correction = CorrectedKickoff {
            scheduled: parse_market_time("2019-05-12T14:00:00Z").unwrap(),
            corrected: parse_market_time("2019-05-12T16:00:00Z").unwrap(),
            minute_pattern: 0,
            applied: true,
            correction_hours: 2.0,
            reference: Some(KickoffReference::LastTick),
        };
        let anchor = at("2019-05-12T16:59:45Z");

        let record = MatchRecordBuilder::new(&KickoffConfig::default()).build(
            &market,
            &roles,
            Some(&correction),
            Some(correction.corrected),
            &make_selection(anchor),
        );

        assert_eq!(record.home_team, "Arsenal");
        assert_eq!(record.away_team, "Chelsea");
        assert_eq!(record.event_id, "29001");
        assert_eq!(record.division, "GB");
        // Roles follow sort priority, so the middle runner is the draw slot.
        assert_eq!(record.home_result, Some(ResultTag::Loser));
        assert_eq!(record.draw_result, Some(ResultTag::Winner));
        assert_eq!(record.away_result, Some(ResultTag::Loser));
        assert!(record.kickoff_corrected);
        assert_eq!(record.correction_hours, Some(2.0));
        assert_eq!(record.minute_pattern, Some(0));
        assert_eq!(record.total_price_updates, 3);
        assert_abs_diff_eq!(record.match_duration_hours.unwrap(), 3.0 + 40.0 / 60.0, epsilon = 1e-9);
        assert!(record.long_by_last_price);
        assert!(record.long_by_last_tick);

        let triad = record.triad.unwrap();
        assert_eq!(triad.anchor.timestamp_millis(), anchor);
        assert_eq!(triad.spread_ms, 40_000);
        assert_eq!(triad.home, OrderedFloat(2.1));
        assert_eq!(triad.home_ts.timestamp_millis(), at("2019-05-12T16:59:05Z"));
        assert_eq!(triad.draw_ts.timestamp_millis(), at("2019-05-12T16:59:20Z"));
        assert_eq!(triad.away, OrderedFloat(3.9));
        assert_eq!(triad.away_ts.timestamp_millis(), anchor);
        assert_eq!(record.selection_method, SelectionMethod::Exact);
    }

    #[test]
    fn test_no_winner_leaves_results_empty() {
        let market = make_market(["ACTIVE", "ACTIVE", "ACTIVE"]);
        let roles = assign_roles(&market.definition).unwrap();
        let record = MatchRecordBuilder::new(&KickoffConfig::default()).build(
            &market,
            &roles,
            None,
            None,
            &TriadSelection::none(false),
        );

        assert_eq!(record.home_result, None);
        assert_eq!(record.draw_result, None);
        assert_eq!(record.away_result, None);
        assert!(!record.kickoff_corrected);
        assert_eq!(record.correction_hours, None);
        assert_eq!(record.minute_pattern, None);
        assert!(record.triad.is_none());
        assert_eq!(record.selection_method, SelectionMethod::None);
        // Scheduled kick-off falls back to the first scheduling string.
        assert_eq!(
            record.scheduled_kickoff.map(|dt| dt.timestamp_millis()),
            Some(at("2019-05-12T14:00:00Z"))
        );
    }

    #[test]
    fn test_long_flags_use_threshold() {
        let mut market = make_market(["WINNER", "LOSER", "LOSER"]);
        market.last_price_ms = Some(at("2019-05-12T16:00:00Z"));
        market.last_tick_ms = Some(at("2019-05-12T16:31:00Z"));
        let roles = assign_roles(&market.definition).unwrap();
        let record = MatchRecordBuilder::new(&KickoffConfig::default()).build(
            &market,
            &roles,
            None,
            None,
            &TriadSelection::none(true),
        );

        assert_abs_diff_eq!(record.match_duration_hours.unwrap(), 2.0, epsilon = 1e-9);
        assert!(!record.long_by_last_price);
        assert!(record.long_by_last_tick);
        assert_eq!(record.home_result, Some(ResultTag::Winner));
    }
}
