//! Per-market circuit breaker
//!
//! Trips on daily realized loss or runaway inventory. A tripped market
//! stops quoting until an explicit reset or the next trading day.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// Why a market's quoting was halted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TripReason {
    /// Daily loss beyond the configured maximum
    DailyLoss { loss: Decimal, limit: Decimal },
    /// Inventory beyond the hard cap
    Inventory { inventory: Decimal, cap: Decimal },
}

impl std::fmt::Display for TripReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TripReason::DailyLoss { loss, limit } => {
                write!(f, "daily loss {} beyond limit {}", loss, limit)
            }
            TripReason::Inventory { inventory, cap } => {
                write!(f, "inventory {} beyond cap {}", inventory, cap)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Trip {
    reason: TripReason,
    day: NaiveDate,
}

/// Tracks tripped markets
#[derive(Default)]
pub struct CircuitBreaker {
    trips: HashMap<String, Trip>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&mut self, market_id: &str, reason: TripReason, today: NaiveDate) {
        tracing::warn!(
            market_id = %market_id,
            reason = %reason,
            "circuit breaker tripped"
        );
        crate::telemetry::metrics::record_breaker_trip(market_id);
        self.trips
            .insert(market_id.to_string(), Trip { reason, day: today });
    }

    /// Whether all order flow is halted for a market
    ///
    /// A trip expires at the next trading-day boundary.
    pub fn is_tripped(&self, market_id: &str, today: NaiveDate) -> bool {
        self.trips
            .get(market_id)
            .is_some_and(|trip| trip.day >= today)
    }

    pub fn trip_reason(&self, market_id: &str) -> Option<&TripReason> {
        self.trips.get(market_id).map(|t| &t.reason)
    }

    /// Explicit operator reset
    pub fn reset(&mut self, market_id: &str) {
        if self.trips.remove(market_id).is_some() {
            tracing::info!(market_id = %market_id, "circuit breaker reset");
        }
    }

    /// Evaluate limits and trip if either is breached; returns the halt
    /// reason if the market cannot trade right now.
    pub fn check(
        &mut self,
        market_id: &str,
        daily_pnl: Decimal,
        max_daily_loss: Decimal,
        worst_inventory: Decimal,
        inventory_cap: Decimal,
        today: NaiveDate,
    ) -> Option<TripReason> {
        if self.is_tripped(market_id, today) {
            return self.trip_reason(market_id).cloned();
        }

        if daily_pnl < -max_daily_loss {
            let reason = TripReason::DailyLoss {
                loss: -daily_pnl,
                limit: max_daily_loss,
            };
            self.trip(market_id, reason.clone(), today);
            return Some(reason);
        }

        if worst_inventory.abs() > inventory_cap {
            let reason = TripReason::Inventory {
                inventory: worst_inventory,
                cap: inventory_cap,
            };
            self.trip(market_id, reason.clone(), today);
            return Some(reason);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_trips_on_daily_loss() {
        let mut breaker = CircuitBreaker::new();
        let reason = breaker.check("mkt-1", dec!(-60), dec!(50), dec!(0), dec!(500), day(15));
        assert!(matches!(reason, Some(TripReason::DailyLoss { .. })));
        assert!(breaker.is_tripped("mkt-1", day(15)));
    }

    #[test]
    fn test_trips_on_inventory() {
        let mut breaker = CircuitBreaker::new();
        let reason = breaker.check("mkt-1", dec!(0), dec!(50), dec!(-600), dec!(500), day(15));
        assert!(matches!(reason, Some(TripReason::Inventory { .. })));
    }

    #[test]
    fn test_trip_latches_within_day() {
        let mut breaker = CircuitBreaker::new();
        breaker.check("mkt-1", dec!(-60), dec!(50), dec!(0), dec!(500), day(15));
        // loss recovers, breaker stays tripped
        let reason = breaker.check("mkt-1", dec!(0), dec!(50), dec!(0), dec!(500), day(15));
        assert!(reason.is_some());
    }

    #[test]
    fn test_trip_expires_next_day() {
        let mut breaker = CircuitBreaker::new();
        breaker.check("mkt-1", dec!(-60), dec!(50), dec!(0), dec!(500), day(15));
        assert!(!breaker.is_tripped("mkt-1", day(16)));
        let reason = breaker.check("mkt-1", dec!(0), dec!(50), dec!(0), dec!(500), day(16));
        assert!(reason.is_none());
    }

    #[test]
    fn test_explicit_reset() {
        let mut breaker = CircuitBreaker::new();
        breaker.check("mkt-1", dec!(-60), dec!(50), dec!(0), dec!(500), day(15));
        breaker.reset("mkt-1");
        assert!(!breaker.is_tripped("mkt-1", day(15)));
    }

    #[test]
    fn test_healthy_market_untripped() {
        let mut breaker = CircuitBreaker::new();
        let reason = breaker.check("mkt-1", dec!(-10), dec!(50), dec!(100), dec!(500), day(15));
        assert!(reason.is_none());
    }
}
