//! Passive quoting on non-primary buckets
//!
//! Quotes straddle the model's confidence-adjusted probability. The spread
//! widens on thin books, quotes skew against accumulated inventory, and a
//! side drops entirely once inventory passes its bound or the quote would
//! cross the prevailing price.

use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;

use crate::config::MakerConfig;
use crate::forecast::Forecast;
use crate::market::TemperatureMarket;
use crate::model;
use crate::strategy::{IntentReason, OrderIntent, Side};

const MIN_PRICE: Decimal = dec!(0.01);
const MAX_PRICE: Decimal = dec!(0.99);

/// A bid/ask pair for one outcome; either side may be suppressed
#[derive(Debug, Clone)]
pub struct QuotePair {
    pub bid: Option<OrderIntent>,
    pub ask: Option<OrderIntent>,
}

pub struct MarketMaker {
    cfg: MakerConfig,
}

impl MarketMaker {
    pub fn new(cfg: MakerConfig) -> Self {
        Self { cfg }
    }

    /// Compute the current quote pair for one outcome
    ///
    /// Returns `None` when both sides are suppressed or the bucket has no
    /// quotable band left after clamping.
    pub fn quotes_for(
        &self,
        market: &TemperatureMarket,
        outcome_idx: usize,
        forecast: &Forecast,
        inventory: Decimal,
    ) -> Option<QuotePair> {
        let outcome = &market.outcomes[outcome_idx];
        let (fair, _) = model::bucket_probability(market, outcome_idx, forecast);
        let half = self.spread_for(outcome.liquidity) / Decimal::TWO;

        let mut bid = fair - half;
        let mut ask = fair + half;

        // Skew both quotes away from the inventory once it crosses the
        // threshold; long inventory pushes quotes down to favor selling.
        let threshold = self.cfg.skew_threshold * self.cfg.max_inventory;
        if inventory.abs() >= threshold && !threshold.is_zero() {
            let shift = if inventory > Decimal::ZERO {
                -self.cfg.skew_factor
            } else {
                self.cfg.skew_factor
            };
            bid += shift;
            ask += shift;
        }

        // Side suppression at the inventory bound, and for any side at or
        // through the prevailing price: that would take, not make
        let suppress_bid = inventory >= self.cfg.max_inventory || bid >= outcome.price;
        let suppress_ask = inventory <= -self.cfg.max_inventory || ask <= outcome.price;

        let quote = |side: Side, price: Decimal| {
            let mut intent = OrderIntent::limit(
                &market.market_id,
                &outcome.token_id,
                side,
                self.cfg.quote_size,
                price,
                IntentReason::Quote,
            );
            // marked at the market, not the quote, so a passive quote is
            // recognizable as passive downstream
            intent.mark_price = outcome.price;
            intent
        };

        let bid_intent =
            (!suppress_bid && bid >= MIN_PRICE).then(|| quote(Side::Buy, bid.min(MAX_PRICE)));
        let ask_intent =
            (!suppress_ask && ask <= MAX_PRICE).then(|| quote(Side::Sell, ask.max(MIN_PRICE)));

        if bid_intent.is_none() && ask_intent.is_none() {
            return None;
        }
        Some(QuotePair {
            bid: bid_intent,
            ask: ask_intent,
        })
    }

    /// Liquidity-scaled spread with a floor
    fn spread_for(&self, liquidity: Decimal) -> Decimal {
        let root = liquidity
            .max(Decimal::ONE)
            .sqrt()
            .unwrap_or(Decimal::ONE);
        (self.cfg.base_spread / root).max(self.cfg.min_spread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::tests::ladder;
    use chrono::{NaiveDate, Utc};

    fn maker() -> MarketMaker {
        MarketMaker::new(MakerConfig::default())
    }

    fn forecast(temp: f64) -> Forecast {
        Forecast {
            date: NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
            max_temp: temp,
            confidence: 0.80,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_quotes_straddle_fair_value() {
        let mut market = ladder();
        // bucket 1 is the forecast bucket: fair = 0.80
        market.outcomes[1].price = dec!(0.80);
        let pair = maker()
            .quotes_for(&market, 1, &forecast(62.0), Decimal::ZERO)
            .unwrap();
        let bid = pair.bid.unwrap();
        let ask = pair.ask.unwrap();
        assert!(bid.limit_price.unwrap() < dec!(0.80));
        assert!(ask.limit_price.unwrap() > dec!(0.80));
        assert_eq!(bid.reason, IntentReason::Quote);
    }

    #[test]
    fn test_spread_floor_on_deep_book() {
        let mut market = ladder();
        market.outcomes[1].price = dec!(0.80);
        market.outcomes[1].liquidity = dec!(1000000);
        let pair = maker()
            .quotes_for(&market, 1, &forecast(62.0), Decimal::ZERO)
            .unwrap();
        let spread =
            pair.ask.unwrap().limit_price.unwrap() - pair.bid.unwrap().limit_price.unwrap();
        assert_eq!(spread, dec!(0.02));
    }

    #[test]
    fn test_spread_widens_on_thin_book() {
        let mut market = ladder();
        market.outcomes[1].price = dec!(0.80);
        market.outcomes[1].liquidity = dec!(1);
        let pair = maker()
            .quotes_for(&market, 1, &forecast(62.0), Decimal::ZERO)
            .unwrap();
        let spread =
            pair.ask.unwrap().limit_price.unwrap() - pair.bid.unwrap().limit_price.unwrap();
        assert_eq!(spread, dec!(0.04));
    }

    #[test]
    fn test_inventory_skew_shifts_quotes_down_when_long() {
        let mut market = ladder();
        // priced inside both the flat and the skewed band
        market.outcomes[1].price = dec!(0.795);
        let flat = maker()
            .quotes_for(&market, 1, &forecast(62.0), Decimal::ZERO)
            .unwrap();
        // at 70% of max inventory (350 of 500) the skew kicks in
        let long = maker()
            .quotes_for(&market, 1, &forecast(62.0), dec!(350))
            .unwrap();

        let flat_bid = flat.bid.unwrap().limit_price.unwrap();
        let long_bid = long.bid.unwrap().limit_price.unwrap();
        assert_eq!(long_bid, flat_bid - dec!(0.01));
        let flat_ask = flat.ask.unwrap().limit_price.unwrap();
        let long_ask = long.ask.unwrap().limit_price.unwrap();
        assert_eq!(long_ask, flat_ask - dec!(0.01));
    }

    #[test]
    fn test_bid_suppressed_at_max_inventory() {
        let mut market = ladder();
        market.outcomes[1].price = dec!(0.795);
        let pair = maker()
            .quotes_for(&market, 1, &forecast(62.0), dec!(500))
            .unwrap();
        assert!(pair.bid.is_none());
        assert!(pair.ask.is_some());
    }

    #[test]
    fn test_ask_suppressed_at_max_short() {
        let mut market = ladder();
        // short skew shifts the band up; keep the bid below the market
        market.outcomes[1].price = dec!(0.805);
        let pair = maker()
            .quotes_for(&market, 1, &forecast(62.0), dec!(-500))
            .unwrap();
        assert!(pair.bid.is_some());
        assert!(pair.ask.is_none());
    }

    #[test]
    fn test_no_side_quoted_through_the_market() {
        let market = ladder();
        // bucket 3 is far from the forecast: fair = 0, so both the bid and
        // the clamped ask sit at or below the 0.20 market price
        assert!(maker()
            .quotes_for(&market, 3, &forecast(62.0), Decimal::ZERO)
            .is_none());
    }

    #[test]
    fn test_zero_probability_bucket_quotes_ask_when_room_remains() {
        let mut market = ladder();
        // sub-penny market leaves room for a passive ask at the clamp
        market.outcomes[3].price = dec!(0.005);
        let pair = maker()
            .quotes_for(&market, 3, &forecast(62.0), Decimal::ZERO)
            .unwrap();
        assert!(pair.bid.is_none());
        assert_eq!(pair.ask.unwrap().limit_price.unwrap(), dec!(0.01));
    }
}
