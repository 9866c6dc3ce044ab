//! Position and inventory tracking
//!
//! Positions mutate only on confirmed fills. Marks update valuation but
//! never share counts.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::execution::Fill;
use crate::strategy::Side;

/// An open position in one outcome token
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub market_id: String,
    pub token_id: String,
    /// Signed share count; negative means short from maker sells
    pub shares: Decimal,
    /// Volume-weighted average entry price
    pub avg_price: Decimal,
    /// Last mark used for valuation
    pub mark_price: Decimal,
}

impl Position {
    pub fn notional(&self) -> Decimal {
        self.shares.abs() * self.mark_price
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.shares * (self.mark_price - self.avg_price)
    }
}

/// Book of positions keyed by (market, token), with per-market daily
/// realized P&L for the circuit breaker
#[derive(Default)]
pub struct PositionBook {
    positions: HashMap<(String, String), Position>,
    daily_realized: HashMap<String, Decimal>,
    day: Option<NaiveDate>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a confirmed fill
    ///
    /// Buys add shares at a blended average price. Sells reduce shares and
    /// realize P&L against the average. Fees count against realized P&L.
    pub fn apply_fill(&mut self, fill: &Fill) {
        let key = (fill.market_id.clone(), fill.token_id.clone());
        let position = self.positions.entry(key.clone()).or_insert(Position {
            market_id: fill.market_id.clone(),
            token_id: fill.token_id.clone(),
            shares: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            mark_price: fill.price,
        });

        let signed = match fill.side {
            Side::Buy => fill.shares,
            Side::Sell => -fill.shares,
        };

        let same_direction = position.shares.is_zero()
            || (position.shares > Decimal::ZERO) == (signed > Decimal::ZERO);

        if same_direction {
            let old_notional = position.shares.abs() * position.avg_price;
            let new_notional = fill.shares * fill.price;
            let total = position.shares.abs() + fill.shares;
            if !total.is_zero() {
                position.avg_price = (old_notional + new_notional) / total;
            }
            position.shares += signed;
        } else {
            // Reducing or flipping; realize against the average
            let closed = fill.shares.min(position.shares.abs());
            let direction = if position.shares > Decimal::ZERO {
                Decimal::ONE
            } else {
                -Decimal::ONE
            };
            let realized = closed * (fill.price - position.avg_price) * direction;
            *self
                .daily_realized
                .entry(fill.market_id.clone())
                .or_default() += realized;

            position.shares += signed;
            if position.shares.is_zero() {
                self.positions.remove(&key);
            } else if (position.shares > Decimal::ZERO) != (direction > Decimal::ZERO) {
                // flipped through zero, remainder enters at fill price
                position.avg_price = fill.price;
            }
        }

        if !fill.fees.is_zero() {
            *self
                .daily_realized
                .entry(fill.market_id.clone())
                .or_default() -= fill.fees;
        }

        if let Some(p) = self.positions.get_mut(&(fill.market_id.clone(), fill.token_id.clone()))
        {
            p.mark_price = fill.price;
        }
    }

    /// Update the valuation mark for a token
    pub fn mark(&mut self, market_id: &str, token_id: &str, price: Decimal) {
        if let Some(p) = self
            .positions
            .get_mut(&(market_id.to_string(), token_id.to_string()))
        {
            p.mark_price = price;
        }
    }

    pub fn position(&self, market_id: &str, token_id: &str) -> Option<&Position> {
        self.positions
            .get(&(market_id.to_string(), token_id.to_string()))
    }

    pub fn positions_for_market(&self, market_id: &str) -> Vec<&Position> {
        self.positions
            .values()
            .filter(|p| p.market_id == market_id)
            .collect()
    }

    /// Signed inventory in one token
    pub fn inventory(&self, market_id: &str, token_id: &str) -> Decimal {
        self.position(market_id, token_id)
            .map(|p| p.shares)
            .unwrap_or_default()
    }

    /// Total marked exposure in a market
    pub fn market_exposure(&self, market_id: &str) -> Decimal {
        self.positions_for_market(market_id)
            .iter()
            .map(|p| p.notional())
            .sum()
    }

    /// Realized plus unrealized P&L for a market since the last day roll
    pub fn daily_pnl(&self, market_id: &str) -> Decimal {
        let realized = self
            .daily_realized
            .get(market_id)
            .copied()
            .unwrap_or_default();
        let unrealized: Decimal = self
            .positions_for_market(market_id)
            .iter()
            .map(|p| p.unrealized_pnl())
            .sum();
        realized + unrealized
    }

    /// Reset daily realized P&L at a trading-day boundary
    ///
    /// Returns true if the day actually rolled.
    pub fn roll_day(&mut self, today: NaiveDate) -> bool {
        if self.day == Some(today) {
            return false;
        }
        self.day = Some(today);
        self.daily_realized.clear();
        true
    }

    pub fn drop_market(&mut self, market_id: &str) {
        self.positions.retain(|(m, _), _| m != market_id);
        self.daily_realized.remove(market_id);
    }
}
