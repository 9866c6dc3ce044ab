//! Weather forecast inputs
//!
//! Forecast confidence decays with horizon: 0.95 same-day, minus 0.10 per
//! day out, floored at 0.50.

mod weather;

pub use weather::WeatherClient;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::EngineError;

/// A daily-high forecast for one target date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub date: NaiveDate,
    /// Forecast daily high in degrees F
    pub max_temp: f64,
    /// Horizon-derived confidence in [0.5, 0.95]
    pub confidence: f64,
    pub fetched_at: DateTime<Utc>,
}

/// Confidence for a forecast `days_ahead` days before the target date
pub fn horizon_confidence(days_ahead: i64) -> f64 {
    let days = days_ahead.max(0) as f64;
    (0.95 - 0.10 * days).clamp(0.50, 0.95)
}

/// Source of forecasts and same-day observations
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    /// Forecast daily high for a future (or current) date
    async fn forecast(&self, date: NaiveDate, days_ahead: i64) -> anyhow::Result<Forecast>;

    /// Highest temperature observed so far on `date`, if any observations
    /// have been reported
    async fn observed_max(&self, date: NaiveDate) -> anyhow::Result<Option<f64>>;
}

/// TTL cache of forecasts, one writer (the engine refresh loop)
#[derive(Clone)]
pub struct ForecastCache {
    ttl_secs: i64,
    entries: Arc<RwLock<HashMap<NaiveDate, Forecast>>>,
}

impl ForecastCache {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl_secs,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn insert(&self, forecast: Forecast) {
        self.entries.write().await.insert(forecast.date, forecast);
    }

    /// Fetch a forecast if present and within the freshness window
    ///
    /// A stale entry is an error, not a silent fallback: decisions built on
    /// it would be wrong, so the caller skips the decision and logs.
    pub async fn get_fresh(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Forecast, EngineError> {
        let entries = self.entries.read().await;
        let forecast = entries.get(&date).ok_or(EngineError::StaleData {
            kind: "forecast".to_string(),
            age_secs: i64::MAX,
            ttl_secs: self.ttl_secs,
        })?;

        let age = (now - forecast.fetched_at).num_seconds();
        if age > self.ttl_secs {
            return Err(EngineError::StaleData {
                kind: "forecast".to_string(),
                age_secs: age,
                ttl_secs: self.ttl_secs,
            });
        }
        Ok(forecast.clone())
    }

    pub async fn retain_dates(&self, keep: impl Fn(&NaiveDate) -> bool) {
        self.entries.write().await.retain(|d, _| keep(d));
    }
}
