//! Forecast-driven position taking
//!
//! Buys the bucket the forecast points at, with capped spillover into
//! adjacent buckets as a hedge against small forecast misses. Rebalances
//! when the forecast migrates to a different bucket, but only when the
//! expected edge gain clears the transaction cost of both legs.

use rust_decimal::Decimal;

use crate::config::TakerConfig;
use crate::forecast::Forecast;
use crate::market::TemperatureMarket;
use crate::model;
use crate::risk::{KellySizer, PositionBook};
use crate::strategy::{IntentReason, OrderIntent, Side};

pub struct PositionTaker {
    cfg: TakerConfig,
    sizer: KellySizer,
    min_edge: Decimal,
    max_exposure_per_market: Decimal,
    bankroll: Decimal,
}

impl PositionTaker {
    pub fn new(
        cfg: TakerConfig,
        sizer: KellySizer,
        min_edge: Decimal,
        max_exposure_per_market: Decimal,
        bankroll: Decimal,
    ) -> Self {
        Self {
            cfg,
            sizer,
            min_edge,
            max_exposure_per_market,
            bankroll,
        }
    }

    /// Entry orders for a market given the current forecast
    pub fn plan(
        &self,
        market: &TemperatureMarket,
        forecast: &Forecast,
        days_to_target: i64,
        book: &PositionBook,
    ) -> Vec<OrderIntent> {
        let Some(primary) = market.primary_bucket(forecast.max_temp) else {
            tracing::debug!(
                market_id = %market.market_id,
                temp = forecast.max_temp,
                "forecast temperature outside ladder, no entry"
            );
            return Vec::new();
        };

        let assessments = model::assess_market(market, forecast);
        let edge = assessments[primary].edge;
        crate::telemetry::metrics::record_edge(&market.market_id, edge);

        if edge <= self.min_edge {
            tracing::debug!(
                market_id = %market.market_id,
                edge = %edge,
                min_edge = %self.min_edge,
                "edge below threshold, no entry"
            );
            return Vec::new();
        }

        let headroom = self.max_exposure_per_market - book.market_exposure(&market.market_id);
        let Some(total) = self.sizer.size(
            edge,
            assessments[primary].probability,
            market.outcomes[primary].price,
            days_to_target,
            self.bankroll,
            headroom,
        ) else {
            return Vec::new();
        };

        self.allocate(market, primary, total, edge)
    }

    /// Split a market's total allocation across the primary bucket and its
    /// neighbors
    ///
    /// The primary gets at most `primary_allocation_cap` of the total; the
    /// remainder spills into neighbors within the span, weighted by
    /// decay^distance.
    fn allocate(
        &self,
        market: &TemperatureMarket,
        primary: usize,
        total: Decimal,
        edge: Decimal,
    ) -> Vec<OrderIntent> {
        let mut legs: Vec<(usize, Decimal)> = Vec::new();

        let neighbors = neighbor_weights(market.outcomes.len(), primary, self.cfg.neighbor_span,
            self.cfg.neighbor_decay);

        if neighbors.is_empty() {
            legs.push((primary, total));
        } else {
            let primary_size = total * self.cfg.primary_allocation_cap;
            let spill = total - primary_size;
            let weight_sum: Decimal = neighbors.iter().map(|(_, w)| *w).sum();
            legs.push((primary, primary_size));
            for (idx, weight) in neighbors {
                legs.push((idx, spill * weight / weight_sum));
            }
        }

        legs.into_iter()
            .filter(|(_, size)| *size >= self.sizer.min_order_size)
            .map(|(idx, size)| {
                let outcome = &market.outcomes[idx];
                tracing::info!(
                    market_id = %market.market_id,
                    token_id = %outcome.token_id,
                    bucket = %outcome.range.label,
                    size = %size,
                    edge = %edge,
                    "position entry planned"
                );
                OrderIntent::limit(
                    &market.market_id,
                    &outcome.token_id,
                    Side::Buy,
                    size,
                    outcome.price,
                    IntentReason::Edge(edge),
                )
            })
            .collect()
    }

    /// Cost-aware rebalance when the forecast bucket shifted
    ///
    /// Moves a held position into the new primary bucket only if the new
    /// bucket's edge, applied to the moved notional, beats the cost of
    /// closing and reopening.
    pub fn rebalance(
        &self,
        market: &TemperatureMarket,
        forecast: &Forecast,
        book: &PositionBook,
    ) -> Vec<OrderIntent> {
        let Some(primary) = market.primary_bucket(forecast.max_temp) else {
            return Vec::new();
        };
        let target = &market.outcomes[primary];

        let mut intents = Vec::new();
        for position in book.positions_for_market(&market.market_id) {
            if position.shares <= Decimal::ZERO || position.token_id == target.token_id {
                continue;
            }
            let Some(held) = market.outcome_by_token(&position.token_id) else {
                continue;
            };
            if held.range.contains(forecast.max_temp) {
                continue;
            }

            let notional = position.shares * position.mark_price;
            let Some(assessment) = model::assess_token(market, &target.token_id, forecast) else {
                continue;
            };
            let expected_gain = assessment.edge * notional;
            let cost = self.cfg.cost_rate * notional * Decimal::TWO;

            if expected_gain <= cost {
                tracing::debug!(
                    market_id = %market.market_id,
                    from = %held.range.label,
                    to = %target.range.label,
                    expected_gain = %expected_gain,
                    cost = %cost,
                    "rebalance not worth the cost, holding"
                );
                continue;
            }

            tracing::info!(
                market_id = %market.market_id,
                from = %held.range.label,
                to = %target.range.label,
                notional = %notional,
                "rebalancing into new forecast bucket"
            );
            intents.push(OrderIntent::market(
                &market.market_id,
                &position.token_id,
                Side::Sell,
                notional,
                position.mark_price,
                IntentReason::Edge(assessment.edge),
            ));
            intents.push(OrderIntent::limit(
                &market.market_id,
                &target.token_id,
                Side::Buy,
                notional,
                target.price,
                IntentReason::Edge(assessment.edge),
            ));
        }
        intents
    }
}

/// Neighbor indices and decay weights around the primary bucket
fn neighbor_weights(
    len: usize,
    primary: usize,
    span: usize,
    decay: Decimal,
) -> Vec<(usize, Decimal)> {
    let mut weights = Vec::new();
    for dist in 1..=span {
        let mut w = Decimal::ONE;
        for _ in 0..dist {
            w *= decay;
        }
        if primary >= dist {
            weights.push((primary - dist, w));
        }
        if primary + dist < len {
            weights.push((primary + dist, w));
        }
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::tests::ladder;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn taker() -> PositionTaker {
        PositionTaker::new(
            TakerConfig::default(),
            KellySizer::new(dec!(0.25), dec!(100), dec!(1)),
            dec!(0.05),
            dec!(200),
            dec!(1000),
        )
    }

    fn forecast(temp: f64) -> Forecast {
        Forecast {
            date: NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
            max_temp: temp,
            confidence: 0.75,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_plan_buys_primary_and_neighbors() {
        let market = ladder();
        let intents = taker().plan(&market, &forecast(62.0), 0, &PositionBook::new());

        assert_eq!(intents.len(), 3);
        assert!(intents.iter().all(|i| i.side == Side::Buy));
        // primary leg is the largest
        let primary = intents.iter().find(|i| i.token_id == "t-6162").unwrap();
        for other in intents.iter().filter(|i| i.token_id != "t-6162") {
            assert!(primary.size > other.size);
        }
    }

    #[test]
    fn test_primary_allocation_cap_honored() {
        let market = ladder();
        let intents = taker().plan(&market, &forecast(62.0), 0, &PositionBook::new());
        let total: Decimal = intents.iter().map(|i| i.size).sum();
        let primary = intents.iter().find(|i| i.token_id == "t-6162").unwrap();
        assert!(primary.size <= total * dec!(0.60) + dec!(0.0001));
    }

    #[test]
    fn test_no_entry_below_min_edge() {
        let mut market = ladder();
        // price the primary bucket at its adjusted probability: zero edge
        market.outcomes[1].price = dec!(0.75);
        let intents = taker().plan(&market, &forecast(62.0), 0, &PositionBook::new());
        assert!(intents.is_empty());
    }

    #[test]
    fn test_no_entry_when_exposure_exhausted() {
        use crate::execution::Fill;
        use uuid::Uuid;

        let market = ladder();
        let mut book = PositionBook::new();
        book.apply_fill(&Fill {
            order_id: Uuid::new_v4(),
            market_id: "mkt-1".to_string(),
            token_id: "t-6162".to_string(),
            side: Side::Buy,
            price: dec!(0.50),
            shares: dec!(400),
            fees: dec!(0),
            timestamp: Utc::now(),
        });
        // exposure 200 == cap
        let intents = taker().plan(&market, &forecast(62.0), 0, &book);
        assert!(intents.is_empty());
    }

    #[test]
    fn test_rebalance_when_forecast_shifts() {
        use crate::execution::Fill;
        use uuid::Uuid;

        let market = ladder();
        let mut book = PositionBook::new();
        book.apply_fill(&Fill {
            order_id: Uuid::new_v4(),
            market_id: "mkt-1".to_string(),
            token_id: "t-6162".to_string(),
            side: Side::Buy,
            price: dec!(0.20),
            shares: dec!(100),
            fees: dec!(0),
            timestamp: Utc::now(),
        });

        // forecast moved to the 65-66 bucket, big edge available there
        let intents = taker().rebalance(&market, &forecast(65.5), &book);
        assert_eq!(intents.len(), 2);
        assert_eq!(intents[0].side, Side::Sell);
        assert_eq!(intents[0].token_id, "t-6162");
        assert!(intents[0].limit_price.is_none());
        assert_eq!(intents[1].side, Side::Buy);
        assert_eq!(intents[1].token_id, "t-6566");
    }

    #[test]
    fn test_rebalance_skipped_when_cost_dominates() {
        use crate::execution::Fill;
        use uuid::Uuid;

        let mut market = ladder();
        // new bucket priced near its adjusted probability: tiny edge
        market.outcomes[3].price = dec!(0.73);
        let mut book = PositionBook::new();
        book.apply_fill(&Fill {
            order_id: Uuid::new_v4(),
            market_id: "mkt-1".to_string(),
            token_id: "t-6162".to_string(),
            side: Side::Buy,
            price: dec!(0.20),
            shares: dec!(100),
            fees: dec!(0),
            timestamp: Utc::now(),
        });

        let intents = taker().rebalance(&market, &forecast(65.5), &book);
        assert!(intents.is_empty());
    }

    #[test]
    fn test_rebalance_noop_when_bucket_still_right() {
        use crate::execution::Fill;
        use uuid::Uuid;

        let market = ladder();
        let mut book = PositionBook::new();
        book.apply_fill(&Fill {
            order_id: Uuid::new_v4(),
            market_id: "mkt-1".to_string(),
            token_id: "t-6162".to_string(),
            side: Side::Buy,
            price: dec!(0.20),
            shares: dec!(100),
            fees: dec!(0),
            timestamp: Utc::now(),
        });

        let intents = taker().rebalance(&market, &forecast(61.5), &book);
        assert!(intents.is_empty());
    }
}
