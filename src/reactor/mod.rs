//! Event reaction layer
//!
//! Push price updates and day-of temperature observations funnel into one
//! event stream. Work is serialized per (market, token) key: one event in
//! flight per key, with a single latest-wins pending slot behind it, so a
//! burst of updates for one token collapses to "process the newest state
//! next" instead of queueing stale work.

mod dispatcher;

pub use dispatcher::{Admission, EventKey, KeyedDispatcher};

use crate::market::PriceUpdate;

/// An event the engine reacts to
///
/// Scheduled work goes through the same stream as pushed work: the cycle
/// emits a `Refresh` per outcome instead of trading directly, so both
/// paths serialize on the same key.
#[derive(Debug, Clone)]
pub enum MarketEvent {
    /// Price pushed for a tracked token
    Price(PriceUpdate),
    /// Scheduled re-evaluation of one outcome
    Refresh { market_id: String, token_id: String },
    /// Running daily max observed on the target day
    Observation { market_id: String, observed_max: f64 },
}

impl MarketEvent {
    /// Serialization key; observations serialize against the market with
    /// an empty token component
    pub fn key(&self, market_id: &str) -> EventKey {
        match self {
            MarketEvent::Price(update) => EventKey {
                market_id: market_id.to_string(),
                token_id: update.token_id.clone(),
            },
            MarketEvent::Refresh {
                market_id,
                token_id,
            } => EventKey {
                market_id: market_id.clone(),
                token_id: token_id.clone(),
            },
            MarketEvent::Observation { market_id, .. } => EventKey {
                market_id: market_id.clone(),
                token_id: String::new(),
            },
        }
    }
}
