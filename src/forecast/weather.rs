//! Weather.com API client
//!
//! Two endpoints: the 7-day daily forecast for future highs, and hourly
//! observation history for the running daily max on the target day.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{horizon_confidence, Forecast, ForecastProvider};
use crate::config::ForecastConfig;

pub struct WeatherClient {
    config: ForecastConfig,
    client: Client,
}

impl WeatherClient {
    pub fn new(config: ForecastConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { config, client })
    }

    async fn fetch_daily_forecast(&self) -> anyhow::Result<DailyForecastResponse> {
        let url = format!("{}/v3/wx/forecast/daily/7day", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("geocode", self.config.geocode.as_str()),
                ("format", "json"),
                ("units", "e"),
                ("language", "en-US"),
                ("apiKey", self.config.api_key.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("forecast API error: {}", response.status());
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ForecastProvider for WeatherClient {
    async fn forecast(&self, date: NaiveDate, days_ahead: i64) -> anyhow::Result<Forecast> {
        let daily = self.fetch_daily_forecast().await?;

        let max_temp = daily
            .valid_time_local
            .iter()
            .zip(daily.temperature_max.iter())
            .find_map(|(ts, temp)| {
                let day = ts.get(..10)?.parse::<NaiveDate>().ok()?;
                if day == date {
                    temp.map(|t| t as f64)
                } else {
                    None
                }
            })
            .ok_or_else(|| anyhow::anyhow!("no forecast for {} in 7-day window", date))?;

        Ok(Forecast {
            date,
            max_temp,
            confidence: horizon_confidence(days_ahead),
            fetched_at: Utc::now(),
        })
    }

    async fn observed_max(&self, date: NaiveDate) -> anyhow::Result<Option<f64>> {
        let url = format!(
            "{}/v1/location/{}:9:US/observations/historical.json",
            self.config.base_url, self.config.location_id
        );
        let compact = date.format("%Y%m%d").to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("units", "e"),
                ("startDate", compact.as_str()),
                ("apiKey", self.config.api_key.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("observation API error: {}", response.status());
        }

        let history: ObservationResponse = response.json().await?;
        let max = history
            .observations
            .iter()
            .filter_map(|o| o.temp)
            .fold(None, |acc: Option<f64>, t| {
                Some(acc.map_or(t, |m| m.max(t)))
            });
        Ok(max)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyForecastResponse {
    valid_time_local: Vec<String>,
    temperature_max: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct ObservationResponse {
    #[serde(default)]
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    temp: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_forecast_parse() {
        let json = r#"{
            "validTimeLocal": ["2025-03-15T07:00:00-0400", "2025-03-16T07:00:00-0400"],
            "temperatureMax": [62, null]
        }"#;
        let parsed: DailyForecastResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.temperature_max[0], Some(62));
        assert_eq!(parsed.temperature_max[1], None);
    }

    #[test]
    fn test_observation_parse_and_max() {
        let json = r#"{"observations": [
            {"temp": 58.0}, {"temp": 61.0}, {"temp": null}, {"temp": 60.0}
        ]}"#;
        let parsed: ObservationResponse = serde_json::from_str(json).unwrap();
        let max = parsed
            .observations
            .iter()
            .filter_map(|o| o.temp)
            .fold(None::<f64>, |acc, t| Some(acc.map_or(t, |m| m.max(t))));
        assert_eq!(max, Some(61.0));
    }
}
