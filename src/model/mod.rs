//! Probability model for temperature buckets
//!
//! Maps a forecast onto each bucket of a ladder: the bucket containing the
//! forecast temperature gets the forecast confidence as its probability,
//! everything else gets zero. A temperature sitting on the shared edge of
//! two adjacent buckets splits the confidence evenly between them.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::forecast::Forecast;
use crate::market::TemperatureMarket;

/// Edge assessment for one outcome token
#[derive(Debug, Clone, Serialize)]
pub struct EdgeAssessment {
    pub token_id: String,
    /// Confidence-adjusted probability of the bucket paying out
    pub probability: Decimal,
    /// Probability minus market price; positive means underpriced
    pub edge: Decimal,
    /// True when the forecast sat on a boundary shared by two buckets
    pub boundary_split: bool,
}

/// Confidence-adjusted probability for the outcome at `index`
pub fn bucket_probability(
    market: &TemperatureMarket,
    index: usize,
    forecast: &Forecast,
) -> (Decimal, bool) {
    let confidence = Decimal::from_f64(forecast.confidence).unwrap_or_default();
    let hits = market.buckets_containing(forecast.max_temp);

    match hits.len() {
        1 if hits[0] == index => (confidence, false),
        2 if hits.contains(&index) => (confidence / Decimal::TWO, true),
        _ => (Decimal::ZERO, hits.len() == 2),
    }
}

/// Assess every outcome of a ladder against a forecast
pub fn assess_market(market: &TemperatureMarket, forecast: &Forecast) -> Vec<EdgeAssessment> {
    market
        .outcomes
        .iter()
        .enumerate()
        .map(|(idx, outcome)| {
            let (probability, boundary_split) = bucket_probability(market, idx, forecast);
            EdgeAssessment {
                token_id: outcome.token_id.clone(),
                probability,
                edge: probability - outcome.price,
                boundary_split,
            }
        })
        .collect()
}

/// Assess a single outcome token
pub fn assess_token(
    market: &TemperatureMarket,
    token_id: &str,
    forecast: &Forecast,
) -> Option<EdgeAssessment> {
    let index = market
        .outcomes
        .iter()
        .position(|o| o.token_id == token_id)?;
    let (probability, boundary_split) = bucket_probability(market, index, forecast);
    Some(EdgeAssessment {
        token_id: token_id.to_string(),
        probability,
        edge: probability - market.outcomes[index].price,
        boundary_split,
    })
}
