//! Trading strategies
//!
//! Two strategies can work the same ladder at once. To keep them from
//! fighting, outcomes are partitioned: the forecast's primary bucket and
//! its near neighbors belong to the position taker, the rest to the
//! market maker.

mod market_maker;
mod position_taker;

pub use market_maker::{MarketMaker, QuotePair};
pub use position_taker::PositionTaker;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::market::TemperatureMarket;

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Buy,
    Sell,
}

/// Why an order was generated
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IntentReason {
    /// Forecast edge over market price
    Edge(Decimal),
    /// Day-of observed temperature left the held bucket
    BucketCorrection,
    /// Market maker quote refresh
    Quote,
}

/// A decision to trade, not yet submitted
#[derive(Debug, Clone, Serialize)]
pub struct OrderIntent {
    pub market_id: String,
    pub token_id: String,
    pub side: Side,
    /// Notional in USDC
    pub size: Decimal,
    /// Limit price; `None` submits a market order
    pub limit_price: Option<Decimal>,
    /// Price snapshot at decision time, used for market-order accounting
    pub mark_price: Decimal,
    pub reason: IntentReason,
    pub created_at: DateTime<Utc>,
}

impl OrderIntent {
    pub fn limit(
        market_id: &str,
        token_id: &str,
        side: Side,
        size: Decimal,
        price: Decimal,
        reason: IntentReason,
    ) -> Self {
        Self {
            market_id: market_id.to_string(),
            token_id: token_id.to_string(),
            side,
            size,
            limit_price: Some(price),
            mark_price: price,
            reason,
            created_at: Utc::now(),
        }
    }

    pub fn market(
        market_id: &str,
        token_id: &str,
        side: Side,
        size: Decimal,
        mark_price: Decimal,
        reason: IntentReason,
    ) -> Self {
        Self {
            market_id: market_id.to_string(),
            token_id: token_id.to_string(),
            side,
            size,
            limit_price: None,
            mark_price,
            reason,
            created_at: Utc::now(),
        }
    }
}

/// Which strategy owns an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    PositionTaker,
    MarketMaker,
}

/// Assign each outcome index to a strategy
///
/// The primary bucket for the forecast temperature plus `span` buckets on
/// each side go to the taker. Everything else goes to the maker. With no
/// containing bucket the whole ladder is maker territory.
pub fn partition_outcomes(
    market: &TemperatureMarket,
    forecast_temp: f64,
    span: usize,
) -> Vec<Owner> {
    let mut owners = vec![Owner::MarketMaker; market.outcomes.len()];
    if let Some(primary) = market.primary_bucket(forecast_temp) {
        let lo = primary.saturating_sub(span);
        let hi = (primary + span).min(market.outcomes.len().saturating_sub(1));
        for owner in owners.iter_mut().take(hi + 1).skip(lo) {
            *owner = Owner::PositionTaker;
        }
    }
    owners
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::tests::ladder;

    #[test]
    fn test_partition_center() {
        // forecast 63.5F lands in bucket 2 of five; span 1 takes 1..=3
        let owners = partition_outcomes(&ladder(), 63.5, 1);
        assert_eq!(
            owners,
            vec![
                Owner::MarketMaker,
                Owner::PositionTaker,
                Owner::PositionTaker,
                Owner::PositionTaker,
                Owner::MarketMaker,
            ]
        );
    }

    #[test]
    fn test_partition_edge_of_ladder() {
        let owners = partition_outcomes(&ladder(), 55.0, 1);
        assert_eq!(owners[0], Owner::PositionTaker);
        assert_eq!(owners[1], Owner::PositionTaker);
        assert_eq!(owners[2], Owner::MarketMaker);
    }

    #[test]
    fn test_partition_no_containing_bucket() {
        let owners = partition_outcomes(&ladder(), 62.5, 1);
        assert!(owners.iter().all(|o| *o == Owner::MarketMaker));
    }
}
