//! Kelly criterion position sizing
//!
//! Fractional Kelly scaled by forecast confidence and by how close the
//! target date is. Far-out bets get cut harder because the forecast that
//! justifies them is weaker than its confidence number alone implies.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Floor on the Kelly denominator, keeps near-$1 prices from exploding
/// the fraction
const DENOMINATOR_FLOOR: Decimal = dec!(0.01);

/// Kelly sizer for bucket bets
///
/// Shares pay $1 if the bucket hits, $0 otherwise, so the Kelly fraction
/// for a positive edge is edge / (1 - price).
pub struct KellySizer {
    /// Fraction of full Kelly (e.g. 0.25 for quarter Kelly)
    pub fraction: Decimal,
    /// Cap on a single order's notional
    pub max_position_size: Decimal,
    /// Smallest order worth submitting
    pub min_order_size: Decimal,
}

impl KellySizer {
    pub fn new(fraction: Decimal, max_position_size: Decimal, min_order_size: Decimal) -> Self {
        Self {
            fraction,
            max_position_size,
            min_order_size,
        }
    }

    /// Notional to deploy on one bucket, or `None` when nothing tradable
    /// survives the caps
    ///
    /// `headroom` is the remaining exposure budget for the market; the
    /// returned size never exceeds it.
    pub fn size(
        &self,
        edge: Decimal,
        confidence: Decimal,
        price: Decimal,
        days_to_target: i64,
        bankroll: Decimal,
        headroom: Decimal,
    ) -> Option<Decimal> {
        if edge <= Decimal::ZERO || headroom <= Decimal::ZERO {
            return None;
        }

        let denominator = (Decimal::ONE - price).max(DENOMINATOR_FLOOR);
        let raw = self.fraction * edge * confidence / denominator;
        let size = (raw * day_scale(days_to_target) * bankroll)
            .min(self.max_position_size)
            .min(headroom);

        if size < self.min_order_size {
            return None;
        }
        Some(size)
    }
}

/// Horizon discount on position size
///
/// Same-day conviction bets full scale, three or more days out is halved.
pub fn day_scale(days_to_target: i64) -> Decimal {
    match days_to_target {
        i64::MIN..=0 => dec!(1.00),
        1 => dec!(0.85),
        2 => dec!(0.70),
        _ => dec!(0.50),
    }
}
