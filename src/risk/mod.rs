//! Risk management module
//!
//! Position sizing, exposure caps, inventory tracking, and the per-market
//! circuit breaker.

mod kelly;
mod limits;
mod position;

pub use kelly::{day_scale, KellySizer};
pub use limits::{CircuitBreaker, TripReason};
pub use position::{Position, PositionBook};
