//! Scan command: discover markets and report edges without trading

use chrono::Utc;
use clap::Args;

use crate::config::Config;
use crate::forecast::{ForecastProvider, WeatherClient};
use crate::market::{GammaDiscovery, MarketDataSource};
use crate::model;

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Only show buckets with edge at or above the configured threshold
    #[arg(long)]
    pub edges_only: bool,
}

impl ScanArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        let discovery = GammaDiscovery::new(config.discovery.clone())?;
        let weather = WeatherClient::new(config.forecast.clone())?;
        let today = Utc::now().date_naive();

        let markets = discovery.snapshot().await?;
        if markets.is_empty() {
            println!("no temperature markets found");
            return Ok(());
        }

        for market in markets {
            let days = market.days_until_target(today);
            println!("{} (target {}, {}d out)", market.question, market.target_date, days);

            let forecast = match weather.forecast(market.target_date, days).await {
                Ok(f) => f,
                Err(err) => {
                    println!("  forecast unavailable: {}", err);
                    continue;
                }
            };
            println!(
                "  forecast high {:.1}F, confidence {:.2}",
                forecast.max_temp, forecast.confidence
            );

            for assessment in model::assess_market(&market, &forecast) {
                if self.edges_only && assessment.edge < config.edge.min_edge {
                    continue;
                }
                let outcome = market
                    .outcome_by_token(&assessment.token_id)
                    .map(|o| o.range.label.as_str())
                    .unwrap_or("?");
                println!(
                    "  {:<16} price {:>5}  prob {:>5}  edge {:>6}",
                    outcome,
                    market
                        .outcome_by_token(&assessment.token_id)
                        .map(|o| o.price.to_string())
                        .unwrap_or_default(),
                    assessment.probability,
                    assessment.edge
                );
            }
        }

        Ok(())
    }
}
