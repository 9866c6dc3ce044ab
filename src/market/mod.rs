//! Temperature market domain types
//!
//! A daily-high market is a ladder of mutually exclusive temperature
//! buckets ("60°F or lower", "61-62°F", ..., "69°F or higher"), each with
//! its own outcome token. Exactly one bucket pays out at resolution.

mod discovery;
pub mod lifecycle;
mod store;

pub use discovery::GammaDiscovery;
pub use store::MarketStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// One temperature bucket, inclusive on both bounds
///
/// Open-ended ladder extremes leave the corresponding bound `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRange {
    /// Original outcome label, e.g. "61-62°F"
    pub label: String,
    /// Lower bound in degrees F, `None` for "X°F or lower"
    pub min_temp: Option<f64>,
    /// Upper bound in degrees F, `None` for "X°F or higher"
    pub max_temp: Option<f64>,
}

impl TemperatureRange {
    /// Parse a bucket label into a range
    ///
    /// Accepts "61-62°F", "65°F or higher", "60°F or lower", and the same
    /// shapes without the degree suffix. Returns `None` for anything else.
    pub fn from_label(label: &str) -> Option<Self> {
        let trimmed = label.trim();
        let lower = trimmed.to_lowercase();

        let strip_degrees =
            |s: &str| s.trim().trim_end_matches("°f").trim_end_matches('°').trim().to_string();

        if let Some(idx) = lower.find("or higher") {
            let num = strip_degrees(&lower[..idx]).parse::<f64>().ok()?;
            return Some(Self {
                label: trimmed.to_string(),
                min_temp: Some(num),
                max_temp: None,
            });
        }
        if let Some(idx) = lower.find("or lower") {
            let num = strip_degrees(&lower[..idx]).parse::<f64>().ok()?;
            return Some(Self {
                label: trimmed.to_string(),
                min_temp: None,
                max_temp: Some(num),
            });
        }
        if let Some((lo, hi)) = lower.split_once('-') {
            let lo = strip_degrees(lo).parse::<f64>().ok()?;
            let hi = strip_degrees(hi).parse::<f64>().ok()?;
            if lo > hi {
                return None;
            }
            return Some(Self {
                label: trimmed.to_string(),
                min_temp: Some(lo),
                max_temp: Some(hi),
            });
        }
        // Single-degree bucket like "64°F"
        let num = strip_degrees(&lower).parse::<f64>().ok()?;
        Some(Self {
            label: trimmed.to_string(),
            min_temp: Some(num),
            max_temp: Some(num),
        })
    }

    /// Whether a temperature falls inside this bucket, bounds inclusive
    pub fn contains(&self, temp: f64) -> bool {
        let above_min = self.min_temp.map_or(true, |min| temp >= min);
        let below_max = self.max_temp.map_or(true, |max| temp <= max);
        above_min && below_max
    }

    /// Midpoint used for ordering buckets; open ends fall back to the
    /// closed bound.
    fn sort_key(&self) -> f64 {
        match (self.min_temp, self.max_temp) {
            (Some(lo), Some(hi)) => (lo + hi) / 2.0,
            (Some(lo), None) => lo,
            (None, Some(hi)) => hi,
            (None, None) => 0.0,
        }
    }
}

/// One outcome token within a market ladder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    /// CLOB token id
    pub token_id: String,
    /// Temperature bucket this token pays on
    pub range: TemperatureRange,
    /// Last known price (implied probability)
    pub price: Decimal,
    /// Resting liquidity near the touch (USDC)
    pub liquidity: Decimal,
}

/// A daily-high temperature market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperatureMarket {
    /// Condition id from the venue
    pub market_id: String,
    /// Market question text
    pub question: String,
    /// Calendar date whose daily high resolves the market
    pub target_date: NaiveDate,
    /// Bucket ladder, ordered coldest to warmest
    pub outcomes: Vec<Outcome>,
    /// Traded volume over the last 24h (USDC)
    pub volume_24h: Decimal,
    /// Whether the venue reports the market resolved
    pub resolved: bool,
}

impl TemperatureMarket {
    /// Days from `today` until the target date (negative once past)
    pub fn days_until_target(&self, today: NaiveDate) -> i64 {
        (self.target_date - today).num_days()
    }

    /// Sort the ladder coldest to warmest
    pub fn sort_outcomes(&mut self) {
        self.outcomes.sort_by(|a, b| {
            a.range
                .sort_key()
                .partial_cmp(&b.range.sort_key())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Index of every bucket whose range contains `temp`
    ///
    /// One hit for an interior temperature; two hits when the temperature
    /// sits on a boundary shared by adjacent buckets.
    pub fn buckets_containing(&self, temp: f64) -> Vec<usize> {
        self.outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| o.range.contains(temp))
            .map(|(i, _)| i)
            .collect()
    }

    /// The bucket predicted to pay for `temp`, if any contains it
    pub fn primary_bucket(&self, temp: f64) -> Option<usize> {
        self.buckets_containing(temp).first().copied()
    }

    pub fn outcome_by_token(&self, token_id: &str) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.token_id == token_id)
    }

    /// Validate ladder shape, rejecting empty or token-less ladders
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.outcomes.is_empty() {
            return Err(EngineError::InvalidMarketData {
                market_id: self.market_id.clone(),
                detail: "no parseable outcomes".to_string(),
            });
        }
        if self.outcomes.iter().any(|o| o.token_id.is_empty()) {
            return Err(EngineError::InvalidMarketData {
                market_id: self.market_id.clone(),
                detail: "outcome missing token id".to_string(),
            });
        }
        Ok(())
    }
}

/// A price change pushed from the venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub token_id: String,
    pub price: Decimal,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Source of market snapshots
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch the current set of temperature markets
    async fn snapshot(&self) -> anyhow::Result<Vec<TemperatureMarket>>;
}
