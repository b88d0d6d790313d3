//! Two-phase search for synchronized 1X2 price triads.
//!
//! A triad is one last traded price per outcome, all observed within a short
//! time of each other inside a window after kick-off. The exact phase uses a
//! tight spread and prefers the latest anchor; the relaxed phase only runs
//! when the exact phase finds nothing and prefers the tightest spread.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use triad_core::{
    MarketDefinition, OutcomeRole, PriceUpdate, RoleAssignment, SearchConfig, SearchWindow,
    SelectionMethod, SelectionPriceHistory, TimestampMs, TriadCandidate, TriadEntry,
};

/// Outcome of a triad search.
#[derive(Debug, Clone, PartialEq)]
pub struct TriadSelection {
    /// Phase that produced the triad.
    pub method: SelectionMethod,
    /// Selected triad.
    pub best: Option<TriadCandidate>,
    /// All candidates of the phase that succeeded.
    pub candidates: Vec<TriadCandidate>,
    /// Whether the relaxed phase was run.
    pub relaxed_attempted: bool,
}

impl TriadSelection {
    /// Selection with no triad.
    pub fn none(relaxed_attempted: bool) -> Self {
        Self {
            method: SelectionMethod::None,
            best: None,
            candidates: Vec::new(),
            relaxed_attempted,
        }
    }
}

/// Assign home/draw/away by ascending sort priority.
///
/// Runners without a priority take their position in the definition (1-based);
/// ties keep definition order. Returns `None` unless there are exactly three
/// runners.
pub fn assign_roles(definition: &MarketDefinition) -> Option<[RoleAssignment; 3]> {
    if definition.runners.len() != 3 {
        return None;
    }

    let mut ordered: Vec<_> = definition
        .runners
        .iter()
        .enumerate()
        .map(|(idx, runner)| (runner.sort_priority.unwrap_or(idx as u32 + 1), runner))
        .collect();
    ordered.sort_by_key(|(priority, _)| *priority);

    Some(std::array::from_fn(|i| RoleAssignment {
        role: OutcomeRole::ALL[i],
        selection_id: ordered[i].1.id,
        name: ordered[i].1.display_name().to_string(),
    }))
}

/// Most recent update at or before `anchor` and no older than `max_gap_ms`.
///
/// `leg` must be sorted by timestamp (stable, so equal timestamps keep
/// arrival order); among equal timestamps the earliest arrival wins.
fn resolve_at(leg: &[PriceUpdate], anchor: TimestampMs, max_gap_ms: i64) -> Option<&PriceUpdate> {
    let end = leg.partition_point(|u| u.ts_ms <= anchor);
    let latest = leg.get(end.checked_sub(1)?)?.ts_ms;
    if anchor - latest > max_gap_ms {
        return None;
    }
    let first = leg.partition_point(|u| u.ts_ms < latest);
    leg.get(first)
}

/// Triad searcher over one market's price history.
#[derive(Debug, Clone)]
pub struct TriadSearcher {
    config: SearchConfig,
}

impl TriadSearcher {
    /// Create a new searcher.
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    /// Run the exact phase and, if it finds nothing, the relaxed phase.
    pub fn search(
        &self,
        history: &SelectionPriceHistory,
        roles: &[RoleAssignment; 3],
        kickoff: DateTime<Utc>,
    ) -> TriadSelection {
        let kickoff_ms = kickoff.timestamp_millis();

        let exact = find_candidates(history, roles, self.config.exact_window(), kickoff_ms);
        if let Some(best) = select_exact(&exact).cloned() {
            debug!(
                "Exact triad at {} ({} candidates)",
                best.anchor_ms,
                exact.len()
            );
            return TriadSelection {
                method: SelectionMethod::Exact,
                best: Some(best),
                candidates: exact,
                relaxed_attempted: false,
            };
        }

        if !self.config.enable_relaxed_phase {
            return TriadSelection::none(false);
        }

        let relaxed = find_candidates(history, roles, self.config.relaxed_window(), kickoff_ms);
        match select_relaxed(&relaxed).cloned() {
            Some(best) => {
                debug!(
                    "Relaxed triad at {} with spread {}ms ({} candidates)",
                    best.anchor_ms,
                    best.spread_ms,
                    relaxed.len()
                );
                TriadSelection {
                    method: SelectionMethod::Relaxed,
                    best: Some(best),
                    candidates: relaxed,
                    relaxed_attempted: true,
                }
            }
            None => TriadSelection::none(true),
        }
    }
}

/// All triads in a window, one per distinct anchor, in anchor order.
///
/// Anchors are the distinct timestamps of every update inside the window.
/// Each role resolves independently to its most recent in-window update at or
/// before the anchor and within the window's max gap of it.
pub fn find_candidates(
    history: &SelectionPriceHistory,
    roles: &[RoleAssignment; 3],
    window: SearchWindow,
    kickoff_ms: TimestampMs,
) -> Vec<TriadCandidate> {
    let (start, end) = window.bounds_ms(kickoff_ms);
    let max_gap_ms = window.max_gap_ms();
    let in_window = |ts: TimestampMs| start <= ts && ts <= end;

    let legs: Vec<Vec<PriceUpdate>> = roles
        .iter()
        .map(|assignment| {
            let mut leg: Vec<PriceUpdate> = history
                .updates(assignment.selection_id)
                .iter()
                .filter(|u| in_window(u.ts_ms))
                .copied()
                .collect();
            leg.sort_by_key(|u| u.ts_ms);
            leg
        })
        .collect();

    let anchors: BTreeSet<TimestampMs> = history
        .iter()
        .flat_map(|(_, updates)| updates.iter().map(|u| u.ts_ms))
        .filter(|ts| in_window(*ts))
        .collect();

    let mut candidates = Vec::new();
    for anchor in anchors {
        let resolved: Option<Vec<&PriceUpdate>> = legs
            .iter()
            .map(|leg| resolve_at(leg, anchor, max_gap_ms))
            .collect();
        let Some(resolved) = resolved else {
            continue;
        };

        let newest = resolved.iter().map(|u| u.ts_ms).max().unwrap_or(anchor);
        let oldest = resolved.iter().map(|u| u.ts_ms).min().unwrap_or(anchor);
        let spread_ms = newest - oldest;
        if spread_ms > max_gap_ms {
            continue;
        }

        candidates.push(TriadCandidate {
            anchor_ms: anchor,
            spread_ms,
            entries: std::array::from_fn(|i| TriadEntry {
                role: roles[i].role,
                selection_id: roles[i].selection_id,
                name: roles[i].name.clone(),
                ts_ms: resolved[i].ts_ms,
                ltp: resolved[i].ltp,
            }),
        });
    }

    candidates
}

/// Exact-phase winner: the latest anchor.
pub fn select_exact(candidates: &[TriadCandidate]) -> Option<&TriadCandidate> {
    candidates.iter().max_by_key(|c| c.anchor_ms)
}

/// Relaxed-phase winner: the smallest spread, then the latest anchor.
pub fn select_relaxed(candidates: &[TriadCandidate]) -> Option<&TriadCandidate> {
    candidates
        .iter()
        .min_by_key(|c| (c.spread_ms, Reverse(c.anchor_ms)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordered_float::OrderedFloat;
    use proptest::prelude::*;
    use triad_core::time::parse_market_time;
    use triad_core::RunnerDefinition;

    const HOME: u64 = 47972;
    const DRAW: u64 = 58805;
    const AWAY: u64 = 48224;

    fn kickoff() -> DateTime<Utc> {
        parse_market_time("2019-05-12T14:00:00.000Z").unwrap()
    }

    /// Kick-off relative offset in milliseconds.
    fn ko(minutes: i64, seconds: i64) -> TimestampMs {
        kickoff().timestamp_millis() + minutes * 60_000 + seconds * 1000
    }

    fn make_runner(id: u64, name: &str, priority: Option<u32>) -> RunnerDefinition {
        RunnerDefinition {
            id,
            name: Some(name.to_string()),
            status: Some("ACTIVE".to_string()),
            sort_priority: priority,
        }
    }

    fn make_roles() -> [RoleAssignment; 3] {
        let definition = MarketDefinition {
            runners: vec![
                make_runner(HOME, "Arsenal", Some(1)),
                make_runner(AWAY, "Chelsea", Some(2)),
                make_runner(DRAW, "The Draw", Some(3)),
            ],
            ..Default::default()
        };
        assign_roles(&definition).unwrap()
    }

    fn make_history(updates: &[(u64, TimestampMs, f64)]) -> SelectionPriceHistory {
        let mut history = SelectionPriceHistory::new();
        for &(selection_id, ts_ms, ltp) in updates {
            history.record(PriceUpdate {
                selection_id,
                ts_ms,
                ltp: OrderedFloat(ltp),
            });
        }
        history
    }

    fn standard_roles() -> [RoleAssignment; 3] {
        let definition = MarketDefinition {
            runners: vec![
                make_runner(AWAY, "Chelsea", Some(3)),
                make_runner(HOME, "Arsenal", Some(1)),
                make_runner(DRAW, "The Draw", Some(2)),
            ],
            ..Default::default()
        };
        assign_roles(&definition).unwrap()
    }

    #[test]
    fn test_roles_follow_sort_priority() {
        let roles = standard_roles();
        assert_eq!(roles[0].selection_id, HOME);
        assert_eq!(roles[1].selection_id, DRAW);
        assert_eq!(roles[2].selection_id, AWAY);
        assert_eq!(roles[2].role, OutcomeRole::Away);
        assert_eq!(roles[0].name, "Arsenal");

        let by_priority = make_roles();
        assert_eq!(by_priority[1].selection_id, AWAY);
    }

    #[test]
    fn test_roles_default_to_position() {
        let definition = MarketDefinition {
            runners: vec![
                make_runner(HOME, "Arsenal", None),
                make_runner(DRAW, "The Draw", None),
                make_runner(AWAY, "Chelsea", None),
            ],
            ..Default::default()
        };
        let roles = assign_roles(&definition).unwrap();
        assert_eq!(roles.map(|r| r.selection_id), [HOME, DRAW, AWAY]);
    }

    #[test]
    fn test_roles_require_three_runners() {
        let definition = MarketDefinition {
            runners: vec![make_runner(HOME, "A", Some(1)), make_runner(AWAY, "B", Some(2))],
            ..Default::default()
        };
        assert!(assign_roles(&definition).is_none());
    }

    #[test]
    fn test_exact_triad_latest_anchor() {
        let history = make_history(&[
            (HOME, ko(59, 0), 2.10),
            (DRAW, ko(59, 20), 3.40),
            (AWAY, ko(59, 45), 3.90),
        ]);
        let selection = TriadSearcher::new(SearchConfig::default()).search(
            &history,
            &standard_roles(),
            kickoff(),
        );

        assert_eq!(selection.method, SelectionMethod::Exact);
        assert!(!selection.relaxed_attempted);
        let best = selection.best.unwrap();
        assert_eq!(best.anchor_ms, ko(59, 45));
        assert_eq!(best.spread_ms, 45_000);
        assert_eq!(best.entry(OutcomeRole::Home).ltp, OrderedFloat(2.10));
        assert_eq!(best.entry(OutcomeRole::Draw).ltp, OrderedFloat(3.40));
        assert_eq!(best.entry(OutcomeRole::Away).ltp, OrderedFloat(3.90));
    }

    #[test]
    fn test_relaxed_fallback_when_spacing_too_wide() {
        let history = make_history(&[
            (HOME, ko(56, 0), 2.10),
            (DRAW, ko(57, 10), 3.40),
            (AWAY, ko(58, 20), 3.90),
        ]);
        let selection = TriadSearcher::new(SearchConfig::default()).search(
            &history,
            &standard_roles(),
            kickoff(),
        );

        assert_eq!(selection.method, SelectionMethod::Relaxed);
        assert!(selection.relaxed_attempted);
        let best = selection.best.unwrap();
        assert_eq!(best.anchor_ms, ko(58, 20));
        assert_eq!(best.spread_ms, 140_000);
        assert_eq!(selection.candidates.len(), 1);
    }

    #[test]
    fn test_relaxed_prefers_smallest_spread_then_latest() {
        // Two bursts in the relaxed window; the earlier one is tighter.
        let history = make_history(&[
            (HOME, ko(54, 30), 2.0),
            (DRAW, ko(55, 45), 3.0),
            (AWAY, ko(56, 0), 4.0),
            (HOME, ko(57, 30), 2.1),
            (DRAW, ko(58, 45), 3.1),
            (AWAY, ko(59, 55), 4.1),
        ]);
        let selection = TriadSearcher::new(SearchConfig::default()).search(
            &history,
            &standard_roles(),
            kickoff(),
        );

        assert_eq!(selection.method, SelectionMethod::Relaxed);
        let best = selection.best.unwrap();
        let min_spread = selection.candidates.iter().map(|c| c.spread_ms).min().unwrap();
        assert_eq!(best.spread_ms, min_spread);
        assert_eq!(best.anchor_ms, ko(56, 0));
        assert_eq!(best.entry(OutcomeRole::Home).ltp, OrderedFloat(2.0));
    }

    #[test]
    fn test_relaxed_tie_breaks_on_latest_anchor() {
        let candidates = vec![
            make_candidate(1_000, 90_000),
            make_candidate(5_000, 90_000),
            make_candidate(9_000, 120_000),
        ];
        assert_eq!(select_relaxed(&candidates).unwrap().anchor_ms, 5_000);
        assert_eq!(select_exact(&candidates).unwrap().anchor_ms, 9_000);
        assert!(select_exact(&[]).is_none());
    }

    fn make_candidate(anchor_ms: TimestampMs, spread_ms: i64) -> TriadCandidate {
        let entry = |role| TriadEntry {
            role,
            selection_id: 1,
            name: String::new(),
            ts_ms: anchor_ms,
            ltp: OrderedFloat(2.0),
        };
        TriadCandidate {
            anchor_ms,
            spread_ms,
            entries: OutcomeRole::ALL.map(entry),
        }
    }

    #[test]
    fn test_spread_equal_to_max_gap_is_accepted() {
        let history = make_history(&[
            (HOME, ko(58, 0), 2.0),
            (DRAW, ko(58, 30), 3.0),
            (AWAY, ko(59, 0), 4.0),
        ]);
        let selection = TriadSearcher::new(SearchConfig::default()).search(
            &history,
            &standard_roles(),
            kickoff(),
        );

        assert_eq!(selection.method, SelectionMethod::Exact);
        let best = selection.best.unwrap();
        assert_eq!(best.anchor_ms, ko(59, 0));
        assert_eq!(best.spread_ms, SearchConfig::default().exact_window().max_gap_ms());

        // One millisecond wider falls through to the relaxed phase.
        let history = make_history(&[
            (HOME, ko(58, 0) - 1, 2.0),
            (DRAW, ko(58, 30), 3.0),
            (AWAY, ko(59, 0), 4.0),
        ]);
        let selection = TriadSearcher::new(SearchConfig::default()).search(
            &history,
            &standard_roles(),
            kickoff(),
        );
        assert_eq!(selection.method, SelectionMethod::Relaxed);
        assert_eq!(selection.best.unwrap().spread_ms, 60_001);
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let roles = standard_roles();
        let window = SearchConfig::default().exact_window();

        let at_start = make_history(&[
            (HOME, ko(55, 0), 2.0),
            (DRAW, ko(55, 0), 3.0),
            (AWAY, ko(55, 0), 4.0),
        ]);
        let found = find_candidates(&at_start, &roles, window, kickoff().timestamp_millis());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].anchor_ms, ko(55, 0));

        let at_end = make_history(&[
            (HOME, ko(59, 30), 2.0),
            (DRAW, ko(59, 50), 3.0),
            (AWAY, ko(60, 0), 4.0),
        ]);
        let found = find_candidates(&at_end, &roles, window, kickoff().timestamp_millis());
        assert_eq!(found.last().unwrap().anchor_ms, ko(60, 0));

        let outside = make_history(&[
            (HOME, ko(54, 59), 2.0),
            (DRAW, ko(55, 10), 3.0),
            (AWAY, ko(60, 1), 4.0),
        ]);
        assert!(find_candidates(&outside, &roles, window, kickoff().timestamp_millis()).is_empty());
    }

    #[test]
    fn test_resolution_is_causal() {
        // The away price after the anchor must not be used for that anchor.
        let history = make_history(&[
            (HOME, ko(58, 0), 2.0),
            (DRAW, ko(58, 10), 3.0),
            (AWAY, ko(58, 40), 4.0),
        ]);
        let found = find_candidates(
            &history,
            &standard_roles(),
            SearchConfig::default().exact_window(),
            kickoff().timestamp_millis(),
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].anchor_ms, ko(58, 40));
    }

    #[test]
    fn test_most_recent_price_wins_and_duplicates_resolve_to_first() {
        let history = make_history(&[
            (HOME, ko(59, 0), 2.0),
            (HOME, ko(59, 30), 2.2),
            (HOME, ko(59, 30), 2.4),
            (DRAW, ko(59, 10), 3.0),
            (AWAY, ko(59, 40), 4.0),
            // Late arrival of an older tick.
            (AWAY, ko(59, 5), 4.5),
        ]);
        let selection = TriadSearcher::new(SearchConfig::default()).search(
            &history,
            &standard_roles(),
            kickoff(),
        );
        let best = selection.best.unwrap();
        assert_eq!(best.anchor_ms, ko(59, 40));
        assert_eq!(best.entry(OutcomeRole::Home).ltp, OrderedFloat(2.2));
        assert_eq!(best.entry(OutcomeRole::Away).ltp, OrderedFloat(4.0));
    }

    #[test]
    fn test_no_triad_when_runner_missing() {
        let history = make_history(&[(HOME, ko(59, 0), 2.0), (DRAW, ko(59, 10), 3.0)]);
        let selection = TriadSearcher::new(SearchConfig::default()).search(
            &history,
            &standard_roles(),
            kickoff(),
        );
        assert_eq!(selection.method, SelectionMethod::None);
        assert!(selection.best.is_none());
        assert!(selection.candidates.is_empty());
        assert!(selection.relaxed_attempted);
    }

    #[test]
    fn test_relaxed_phase_can_be_disabled() {
        let history = make_history(&[
            (HOME, ko(56, 0), 2.10),
            (DRAW, ko(57, 10), 3.40),
            (AWAY, ko(58, 20), 3.90),
        ]);
        let config = SearchConfig {
            enable_relaxed_phase: false,
            ..SearchConfig::default()
        };
        let selection = TriadSearcher::new(config).search(&history, &standard_roles(), kickoff());
        assert_eq!(selection.method, SelectionMethod::None);
        assert!(!selection.relaxed_attempted);
    }

    proptest! {
        #[test]
        fn prop_phase_invariants(
            ticks in prop::collection::vec((0usize..3, 50i64 * 60..62 * 60, 101u32..2000), 0..40)
        ) {
            let roles = standard_roles();
            let ids = [HOME, DRAW, AWAY];
            let updates: Vec<_> = ticks
                .iter()
                .map(|&(runner, secs, price)| (ids[runner], ko(0, secs), f64::from(price) / 100.0))
                .collect();
            let history = make_history(&updates);
            let config = SearchConfig::default();
            let searcher = TriadSearcher::new(config.clone());
            let selection = searcher.search(&history, &roles, kickoff());

            let exact = find_candidates(&history, &roles, config.exact_window(), kickoff().timestamp_millis());
            prop_assert!(exact.iter().all(|c| c.spread_ms <= config.exact_window().max_gap_ms()));
            prop_assert_eq!(selection.relaxed_attempted, exact.is_empty());

            match selection.method {
                SelectionMethod::Exact => {
                    let best = selection.best.as_ref().unwrap();
                    let max_anchor = selection.candidates.iter().map(|c| c.anchor_ms).max().unwrap();
                    prop_assert_eq!(best.anchor_ms, max_anchor);
                }
                SelectionMethod::Relaxed => {
                    let best = selection.best.as_ref().unwrap();
                    let gap = config.relaxed_window().max_gap_ms();
                    prop_assert!(selection.candidates.iter().all(|c| c.spread_ms <= gap));
                    for c in &selection.candidates {
                        prop_assert!(
                            best.spread_ms < c.spread_ms
                                || (best.spread_ms == c.spread_ms && best.anchor_ms >= c.anchor_ms)
                        );
                    }
                }
                SelectionMethod::None => {
                    prop_assert!(selection.best.is_none());
                    prop_assert!(selection.candidates.is_empty());
                }
            }
        }
    }
}
