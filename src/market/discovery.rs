//! Gamma API client for market discovery
//!
//! Fetches active NYC daily-high temperature events. Each event carries
//! one binary market per temperature bucket; we keep the YES token of each
//! bucket as one outcome of the ladder.

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use super::{MarketDataSource, Outcome, TemperatureMarket, TemperatureRange};
use crate::config::DiscoveryConfig;

/// Client for Polymarket's Gamma API
pub struct GammaDiscovery {
    config: DiscoveryConfig,
    client: Client,
}

impl GammaDiscovery {
    pub fn new(config: DiscoveryConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    async fn fetch_events(&self) -> anyhow::Result<Vec<GammaEvent>> {
        let url = format!("{}/events", self.config.base_url);

        tracing::debug!(url = %url, "fetching temperature events from Gamma API");

        let response = self
            .client
            .get(&url)
            .query(&[("active", "true"), ("closed", "false")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gamma API error: {} - {}", status, body);
        }

        let events: Vec<GammaEvent> = response.json().await?;
        let needle = self.config.search_term.to_lowercase();
        Ok(events
            .into_iter()
            .filter(|e| e.title.to_lowercase().contains(&needle))
            .collect())
    }

    /// Convert one Gamma event into a temperature ladder
    ///
    /// Bucket markets with unparseable labels or missing token ids are
    /// skipped with a warning; an event with no usable buckets yields
    /// `None`.
    fn convert_event(&self, event: GammaEvent) -> Option<TemperatureMarket> {
        let target_date = event
            .markets
            .iter()
            .find_map(|m| m.end_date.as_deref())
            .and_then(parse_end_date)?;

        let event_id = event.id.clone();
        let mut outcomes = Vec::new();
        for market in event.markets {
            match convert_bucket(&market) {
                Some(outcome) => outcomes.push(outcome),
                None => {
                    tracing::warn!(
                        event_id = %event_id,
                        label = %market.group_item_title.as_deref().unwrap_or("<none>"),
                        "skipping unparseable bucket market"
                    );
                }
            }
        }

        if outcomes.is_empty() {
            return None;
        }

        let mut market = TemperatureMarket {
            market_id: event_id,
            question: event.title,
            target_date,
            outcomes,
            volume_24h: event
                .volume_24hr
                .and_then(Decimal::from_f64)
                .unwrap_or_default(),
            resolved: event.closed,
        };
        market.sort_outcomes();
        Some(market)
    }
}

#[async_trait::async_trait]
impl MarketDataSource for GammaDiscovery {
    async fn snapshot(&self) -> anyhow::Result<Vec<TemperatureMarket>> {
        let events = self.fetch_events().await?;
        let markets: Vec<TemperatureMarket> = events
            .into_iter()
            .filter_map(|e| self.convert_event(e))
            .collect();

        tracing::info!(market_count = markets.len(), "temperature markets discovered");
        Ok(markets)
    }
}

fn convert_bucket(market: &GammaBucketMarket) -> Option<Outcome> {
    let label = market.group_item_title.as_deref()?;
    let range = TemperatureRange::from_label(label)?;
    let token_id = first_token(market.clob_token_ids.as_deref()?)?;
    let price = market
        .outcome_prices
        .as_deref()
        .and_then(first_price)
        .unwrap_or_else(|| Decimal::new(5, 1));
    let liquidity = market
        .liquidity
        .as_deref()
        .and_then(|l| Decimal::from_str(l).ok())
        .unwrap_or(Decimal::ONE);

    Some(Outcome {
        token_id,
        range,
        price,
        liquidity,
    })
}

/// Token ids arrive as a JSON-encoded string: "[\"yes\", \"no\"]"
fn first_token(raw: &str) -> Option<String> {
    let tokens: Vec<String> = serde_json::from_str(raw).ok()?;
    tokens.into_iter().next().filter(|t| !t.is_empty())
}

/// Outcome prices arrive the same way: "[\"0.12\", \"0.88\"]"
fn first_price(raw: &str) -> Option<Decimal> {
    let prices: Vec<String> = serde_json::from_str(raw).ok()?;
    prices.first().and_then(|p| Decimal::from_str(p).ok())
}

fn parse_end_date(raw: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).date_naive())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaEvent {
    id: String,
    title: String,
    #[serde(default)]
    closed: bool,
    #[serde(default)]
    volume_24hr: Option<f64>,
    #[serde(default)]
    markets: Vec<GammaBucketMarket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaBucketMarket {
    /// Bucket label, e.g. "61-62°F"
    group_item_title: Option<String>,
    clob_token_ids: Option<String>,
    outcome_prices: Option<String>,
    liquidity: Option<String>,
    end_date: Option<String>,
}
