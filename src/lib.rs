//! poly-weather: reactive trading engine for Polymarket NYC daily-high
//! temperature markets
//!
//! Core components:
//! - Market discovery via Gamma API, bucket-label parsing
//! - Weather forecast and day-of observation inputs
//! - Confidence-adjusted bucket probabilities and edge computation
//! - Kelly sizing with horizon discounts
//! - Position taking with neighbor spillover, cost-aware rebalancing
//! - Passive quoting with inventory skew and a per-market circuit breaker
//! - Per-key serialized reaction to pushed prices and observed temperatures
//! - Paper execution and full observability stack

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod feed;
pub mod forecast;
pub mod market;
pub mod model;
pub mod reactor;
pub mod risk;
pub mod strategy;
pub mod telemetry;
