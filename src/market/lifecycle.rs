//! Per-market lifecycle tracking
//!
//! Phases move strictly forward. A market can be in Positioning and
//! MarketMaking at the same time; every other phase is exclusive.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use super::TemperatureMarket;

/// Lifecycle phase of a tracked market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MarketPhase {
    /// Known but not yet inside the positioning window
    Scanning,
    /// Directional entries driven by forecast edge
    Positioning,
    /// Passive quoting on non-primary buckets
    MarketMaking,
    /// Target date: reacting to observed temperatures
    DayOfMonitoring,
    /// Past settlement, waiting for the venue to resolve
    WaitingResolution,
    /// Terminal
    Resolved,
}

impl MarketPhase {
    /// Forward-progress rank; Positioning and MarketMaking share a rank
    /// because they run concurrently.
    fn rank(self) -> u8 {
        match self {
            MarketPhase::Scanning => 0,
            MarketPhase::Positioning | MarketPhase::MarketMaking => 1,
            MarketPhase::DayOfMonitoring => 2,
            MarketPhase::WaitingResolution => 3,
            MarketPhase::Resolved => 4,
        }
    }
}

/// Active phases for a market given time context
///
/// `past_settlement` is true on the target date once the daily high is
/// locked in (after the configured settlement hour).
pub fn active_phases(
    market: &TemperatureMarket,
    today: NaiveDate,
    past_settlement: bool,
    making_enabled: bool,
) -> Vec<MarketPhase> {
    if market.resolved {
        return vec![MarketPhase::Resolved];
    }
    let days = market.days_until_target(today);
    if days < 0 || (days == 0 && past_settlement) {
        return vec![MarketPhase::WaitingResolution];
    }
    if days == 0 {
        return vec![MarketPhase::DayOfMonitoring];
    }
    let mut phases = vec![MarketPhase::Positioning];
    if making_enabled {
        phases.push(MarketPhase::MarketMaking);
    }
    phases
}

/// Tracks highest phase reached per market and flags regressions
#[derive(Debug, Default)]
pub struct LifecycleTracker {
    advance_days: i64,
    making_enabled: bool,
    reached: HashMap<String, u8>,
}

impl LifecycleTracker {
    pub fn new(advance_days: i64, making_enabled: bool) -> Self {
        Self {
            advance_days,
            making_enabled,
            reached: HashMap::new(),
        }
    }

    /// Evaluate a market's current phases and record forward progress
    ///
    /// A computed phase behind the highest phase already reached is an
    /// anomaly (clock skew or a re-listed market). It is logged and the
    /// market is held at its reached phase.
    pub fn evaluate(
        &mut self,
        market: &TemperatureMarket,
        today: NaiveDate,
        past_settlement: bool,
    ) -> Vec<MarketPhase> {
        let days = market.days_until_target(today);

        let phases = if !market.resolved && days > self.advance_days {
            vec![MarketPhase::Scanning]
        } else {
            active_phases(market, today, past_settlement, self.making_enabled)
        };

        let new_rank = phases.iter().map(|p| p.rank()).max().unwrap_or(0);
        let entry = self.reached.entry(market.market_id.clone()).or_insert(new_rank);

        if new_rank < *entry {
            tracing::warn!(
                market_id = %market.market_id,
                reached = *entry,
                computed = new_rank,
                "lifecycle regression detected, holding at reached phase"
            );
            crate::telemetry::metrics::record_lifecycle_anomaly(&market.market_id);
            return phases_at_rank(*entry, self.making_enabled);
        }

        *entry = new_rank;
        phases
    }

    /// External resolution signal; terminal regardless of local phase
    pub fn mark_resolved(&mut self, market_id: &str) {
        self.reached
            .insert(market_id.to_string(), MarketPhase::Resolved.rank());
        tracing::info!(market_id = %market_id, "market resolved");
    }

    pub fn is_resolved(&self, market_id: &str) -> bool {
        self.reached
            .get(market_id)
            .is_some_and(|r| *r == MarketPhase::Resolved.rank())
    }

    /// Drop state for markets no longer tracked
    pub fn retain(&mut self, keep: impl Fn(&str) -> bool) {
        self.reached.retain(|id, _| keep(id));
    }

    /// Highest phase reached for a market, if tracked
    pub fn reached_phase(&self, market_id: &str) -> Option<MarketPhase> {
        self.reached
            .get(market_id)
            .map(|r| phases_at_rank(*r, self.making_enabled)[0])
    }
}

fn phases_at_rank(rank: u8, making_enabled: bool) -> Vec<MarketPhase> {
    match rank {
        0 => vec![MarketPhase::Scanning],
        1 if making_enabled => vec![MarketPhase::Positioning, MarketPhase::MarketMaking],
        1 => vec![MarketPhase::Positioning],
        2 => vec![MarketPhase::DayOfMonitoring],
        3 => vec![MarketPhase::WaitingResolution],
        _ => vec![MarketPhase::Resolved],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::tests::ladder;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_scanning_outside_window() {
        let mut tracker = LifecycleTracker::new(3, true);
        let market = ladder(); // target March 15
        let phases = tracker.evaluate(&market, date(10), false);
        assert_eq!(phases, vec![MarketPhase::Scanning]);
    }

    #[test]
    fn test_concurrent_positioning_and_making() {
        let mut tracker = LifecycleTracker::new(3, true);
        let market = ladder();
        let phases = tracker.evaluate(&market, date(13), false);
        assert!(phases.contains(&MarketPhase::Positioning));
        assert!(phases.contains(&MarketPhase::MarketMaking));
    }

    #[test]
    fn test_making_disabled() {
        let mut tracker = LifecycleTracker::new(3, false);
        let market = ladder();
        let phases = tracker.evaluate(&market, date(13), false);
        assert_eq!(phases, vec![MarketPhase::Positioning]);
    }

    #[test]
    fn test_day_of_and_waiting() {
        let mut tracker = LifecycleTracker::new(3, true);
        let market = ladder();
        assert_eq!(
            tracker.evaluate(&market, date(15), false),
            vec![MarketPhase::DayOfMonitoring]
        );
        assert_eq!(
            tracker.evaluate(&market, date(15), true),
            vec![MarketPhase::WaitingResolution]
        );
    }

    #[test]
    fn test_regression_held_at_reached_phase() {
        let mut tracker = LifecycleTracker::new(3, true);
        let market = ladder();
        tracker.evaluate(&market, date(15), false); // DayOfMonitoring
        // Clock appears to move backwards into the positioning window
        let phases = tracker.evaluate(&market, date(13), false);
        assert_eq!(phases, vec![MarketPhase::DayOfMonitoring]);
    }

    #[test]
    fn test_external_resolution_is_terminal() {
        let mut tracker = LifecycleTracker::new(3, true);
        let mut market = ladder();
        tracker.evaluate(&market, date(13), false);
        tracker.mark_resolved(&market.market_id);
        assert!(tracker.is_resolved(&market.market_id));

        market.resolved = true;
        let phases = tracker.evaluate(&market, date(15), false);
        assert_eq!(phases, vec![MarketPhase::Resolved]);
    }
}
