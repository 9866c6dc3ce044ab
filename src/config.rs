//! Configuration types for poly-weather

use rust_decimal::Decimal;
use serde::Deserialize;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub discovery: DiscoveryConfig,
    pub forecast: ForecastConfig,
    pub edge: EdgeConfig,
    pub risk: RiskConfig,
    #[serde(default)]
    pub taker: TakerConfig,
    #[serde(default)]
    pub maker: MakerConfig,
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    pub telemetry: TelemetryConfig,
}

/// Orchestrator cadence and sizing context
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Seconds between scheduled evaluation cycles
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Seconds between observed-temperature polls on target day
    #[serde(default = "default_day_of_interval")]
    pub day_of_interval_secs: u64,

    /// How many days ahead of the target date to start positioning
    #[serde(default = "default_advance_days")]
    pub advance_days: i64,

    /// Bankroll available to the Kelly sizer (USDC)
    pub bankroll: Decimal,

    /// UTC hour after which the daily high is considered locked in
    #[serde(default = "default_settlement_hour")]
    pub settlement_hour: u32,
}

fn default_check_interval() -> u64 {
    60
}
fn default_day_of_interval() -> u64 {
    1
}
fn default_advance_days() -> i64 {
    3
}
fn default_settlement_hour() -> u32 {
    // roughly 6pm in New York
    23
}

/// Market discovery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Gamma API base URL
    #[serde(default = "default_gamma_url")]
    pub base_url: String,

    /// Search term matching the daily temperature ladder
    #[serde(default = "default_search_term")]
    pub search_term: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}
fn default_search_term() -> String {
    "highest temperature in NYC".to_string()
}
fn default_http_timeout() -> u64 {
    10
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            base_url: default_gamma_url(),
            search_term: default_search_term(),
            timeout_secs: default_http_timeout(),
        }
    }
}

/// Weather forecast provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastConfig {
    /// Forecast API base URL
    #[serde(default = "default_weather_url")]
    pub base_url: String,

    /// API key for the forecast provider
    pub api_key: String,

    /// Geocode of the station, "lat,lon"
    #[serde(default = "default_geocode")]
    pub geocode: String,

    /// Station location id for observed-temperature history
    #[serde(default = "default_location_id")]
    pub location_id: String,

    /// Forecast cache freshness window in seconds
    #[serde(default = "default_forecast_ttl")]
    pub cache_ttl_secs: i64,

    /// Minimum observed-max change (degrees F) that triggers reaction
    #[serde(default = "default_change_threshold")]
    pub change_threshold: f64,
}

fn default_weather_url() -> String {
    "https://api.weather.com".to_string()
}
fn default_geocode() -> String {
    // KNYC station in Central Park
    "40.78,-73.97".to_string()
}
fn default_location_id() -> String {
    "KNYC".to_string()
}
fn default_forecast_ttl() -> i64 {
    600
}
fn default_change_threshold() -> f64 {
    0.5
}

/// Edge computation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EdgeConfig {
    /// Minimum edge required before any position-taking order
    #[serde(default = "default_min_edge")]
    pub min_edge: Decimal,
}

fn default_min_edge() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

/// Risk and sizing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Fraction of full Kelly to bet
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: Decimal,

    /// Cap on a single order's notional (USDC)
    #[serde(default = "default_max_position_size")]
    pub max_position_size: Decimal,

    /// Cap on total exposure per market (USDC)
    #[serde(default = "default_max_exposure")]
    pub max_exposure_per_market: Decimal,

    /// Smallest tradable order notional (USDC)
    #[serde(default = "default_min_order_size")]
    pub min_order_size: Decimal,
}

fn default_kelly_fraction() -> Decimal {
    Decimal::new(25, 2) // 0.25
}
fn default_max_position_size() -> Decimal {
    Decimal::new(100, 0)
}
fn default_max_exposure() -> Decimal {
    Decimal::new(200, 0)
}
fn default_min_order_size() -> Decimal {
    Decimal::new(1, 0)
}

/// Position taker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TakerConfig {
    /// Share of a market's total allocation the primary bucket may take
    #[serde(default = "default_primary_cap")]
    pub primary_allocation_cap: Decimal,

    /// How many buckets on each side of the primary receive spillover
    #[serde(default = "default_neighbor_span")]
    pub neighbor_span: usize,

    /// Geometric decay per bucket of distance for spillover weights
    #[serde(default = "default_neighbor_decay")]
    pub neighbor_decay: Decimal,

    /// Transaction cost rate applied to rebalance legs
    #[serde(default = "default_cost_rate")]
    pub cost_rate: Decimal,
}

fn default_primary_cap() -> Decimal {
    Decimal::new(60, 2) // 0.60
}
fn default_neighbor_span() -> usize {
    1
}
fn default_neighbor_decay() -> Decimal {
    Decimal::new(50, 2) // 0.50
}
fn default_cost_rate() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

impl Default for TakerConfig {
    fn default() -> Self {
        Self {
            primary_allocation_cap: default_primary_cap(),
            neighbor_span: default_neighbor_span(),
            neighbor_decay: default_neighbor_decay(),
            cost_rate: default_cost_rate(),
        }
    }
}

/// Market maker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MakerConfig {
    /// Enable quoting on non-primary buckets
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Spread at unit liquidity; effective spread is base / sqrt(liquidity)
    #[serde(default = "default_base_spread")]
    pub base_spread: Decimal,

    /// Floor on the quoted spread
    #[serde(default = "default_min_spread")]
    pub min_spread: Decimal,

    /// Notional per quote side (USDC)
    #[serde(default = "default_quote_size")]
    pub quote_size: Decimal,

    /// Target absolute inventory bound (shares)
    #[serde(default = "default_max_inventory")]
    pub max_inventory: Decimal,

    /// Fraction of max inventory at which quotes start skewing
    #[serde(default = "default_skew_threshold")]
    pub skew_threshold: Decimal,

    /// Price shift applied to both quotes when skewed
    #[serde(default = "default_skew_factor")]
    pub skew_factor: Decimal,

    /// Daily realized loss per market that trips the circuit breaker
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: Decimal,
}

fn default_true() -> bool {
    true
}
fn default_base_spread() -> Decimal {
    Decimal::new(4, 2) // 0.04
}
fn default_min_spread() -> Decimal {
    Decimal::new(2, 2) // 0.02
}
fn default_quote_size() -> Decimal {
    Decimal::new(20, 0)
}
fn default_max_inventory() -> Decimal {
    Decimal::new(500, 0)
}
fn default_skew_threshold() -> Decimal {
    Decimal::new(70, 2) // 0.70
}
fn default_skew_factor() -> Decimal {
    Decimal::new(1, 2) // 0.01
}
fn default_max_daily_loss() -> Decimal {
    Decimal::new(50, 0)
}

impl Default for MakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_spread: default_base_spread(),
            min_spread: default_min_spread(),
            quote_size: default_quote_size(),
            max_inventory: default_max_inventory(),
            skew_threshold: default_skew_threshold(),
            skew_factor: default_skew_factor(),
            max_daily_loss: default_max_daily_loss(),
        }
    }
}

/// Execution engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,

    /// Taker fee rate applied by the paper engine
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,

    /// Milliseconds before an unanswered submission becomes ambiguous
    #[serde(default = "default_submit_deadline")]
    pub submit_deadline_ms: u64,
}

/// Execution mode: paper trading or live
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Paper,
    Live,
}

fn default_fee_rate() -> Decimal {
    Decimal::new(1, 3) // 0.001
}
fn default_submit_deadline() -> u64 {
    5_000
}

/// Price stream configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// CLOB WebSocket endpoint
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Reconnect attempts before giving up
    #[serde(default = "default_max_reconnects")]
    pub max_reconnect_attempts: u32,

    /// Initial reconnect backoff in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_reconnect_delay_ms: u64,

    /// Backoff cap in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_reconnect_delay_ms: u64,
}

fn default_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string()
}
fn default_max_reconnects() -> u32 {
    10
}
fn default_initial_delay() -> u64 {
    1_000
}
fn default_max_delay() -> u64 {
    30_000
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            max_reconnect_attempts: default_max_reconnects(),
            initial_reconnect_delay_ms: default_initial_delay(),
            max_reconnect_delay_ms: default_max_delay(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    pub metrics_port: u16,
    pub log_level: String,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        use crate::error::EngineError;

        if self.execution.mode == ExecutionMode::Live {
            return Err(EngineError::Config(
                "live execution is not wired up; use mode = \"paper\"".to_string(),
            )
            .into());
        }
        if self.engine.bankroll <= Decimal::ZERO {
            return Err(EngineError::Config("bankroll must be positive".to_string()).into());
        }
        if self.taker.primary_allocation_cap > Decimal::ONE {
            return Err(
                EngineError::Config("primary_allocation_cap must be <= 1".to_string()).into(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn minimal_toml() -> &'static str {
        r#"
            [engine]
            bankroll = 1000.0

            [discovery]

            [forecast]
            api_key = "test-key"

            [edge]
            min_edge = 0.05

            [risk]
            kelly_fraction = 0.25

            [execution]
            mode = "paper"

            [telemetry]
            metrics_port = 9090
            log_level = "info"
        "#
    }

    #[test]
    fn test_config_deserialize_with_defaults() {
        let config = Config::from_toml(minimal_toml()).unwrap();
        assert_eq!(config.engine.check_interval_secs, 60);
        assert_eq!(config.engine.day_of_interval_secs, 1);
        assert_eq!(config.engine.advance_days, 3);
        assert_eq!(config.edge.min_edge, dec!(0.05));
        assert_eq!(config.risk.max_exposure_per_market, dec!(200));
        assert_eq!(config.maker.skew_threshold, dec!(0.70));
        assert_eq!(config.forecast.change_threshold, 0.5);
    }

    #[test]
    fn test_live_mode_rejected() {
        let toml = minimal_toml().replace("\"paper\"", "\"live\"");
        assert!(Config::from_toml(&toml).is_err());
    }

    #[test]
    fn test_nonpositive_bankroll_rejected() {
        let toml = minimal_toml().replace("1000.0", "0.0");
        assert!(Config::from_toml(&toml).is_err());
    }

    #[test]
    fn test_stream_defaults() {
        let config = Config::from_toml(minimal_toml()).unwrap();
        assert_eq!(config.stream.max_reconnect_attempts, 10);
        assert_eq!(config.stream.initial_reconnect_delay_ms, 1_000);
        assert_eq!(config.stream.max_reconnect_delay_ms, 30_000);
    }
}
