//! Prometheus metrics and an in-process snapshot
//!
//! Counters and gauges go to the exporter; the same events also bump an
//! atomic snapshot the engine exposes through its API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use metrics::{counter, gauge};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

/// Point-in-time counters for the engine API
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub edges_observed: u64,
    pub orders_placed: u64,
    pub breaker_trips: u64,
    pub stream_reconnects: u64,
    pub events_processed: u64,
}

/// Shared atomic counters behind the snapshot
#[derive(Default)]
pub struct EngineMetrics {
    edges_observed: AtomicU64,
    orders_placed: AtomicU64,
    breaker_trips: AtomicU64,
    stream_reconnects: AtomicU64,
    events_processed: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn edge_observed(&self) {
        self.edges_observed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn order_placed(&self) {
        self.orders_placed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn breaker_trip(&self) {
        self.breaker_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stream_reconnect(&self) {
        self.stream_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            edges_observed: self.edges_observed.load(Ordering::Relaxed),
            orders_placed: self.orders_placed.load(Ordering::Relaxed),
            breaker_trips: self.breaker_trips.load(Ordering::Relaxed),
            stream_reconnects: self.stream_reconnects.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
        }
    }
}

pub fn record_edge(market_id: &str, edge: Decimal) {
    counter!("weather_edges_observed_total", "market" => market_id.to_string()).increment(1);
    gauge!("weather_edge", "market" => market_id.to_string())
        .set(edge.to_f64().unwrap_or(0.0));
}

pub fn record_order(market_id: &str) {
    counter!("weather_orders_placed_total", "market" => market_id.to_string()).increment(1);
}

pub fn record_breaker_trip(market_id: &str) {
    counter!("weather_breaker_trips_total", "market" => market_id.to_string()).increment(1);
}

pub fn record_reconnect() {
    counter!("weather_stream_reconnects_total").increment(1);
}

pub fn record_lifecycle_anomaly(market_id: &str) {
    counter!("weather_lifecycle_anomalies_total", "market" => market_id.to_string()).increment(1);
}

pub fn set_active_markets(count: usize) {
    gauge!("weather_active_markets").set(count as f64);
}

pub fn set_market_daily_pnl(market_id: &str, pnl: Decimal) {
    gauge!("weather_market_daily_pnl_usd", "market" => market_id.to_string())
        .set(pnl.to_f64().unwrap_or(0.0));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = EngineMetrics::new();
        metrics.edge_observed();
        metrics.edge_observed();
        metrics.order_placed();
        metrics.stream_reconnect();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.edges_observed, 2);
        assert_eq!(snapshot.orders_placed, 1);
        assert_eq!(snapshot.breaker_trips, 0);
        assert_eq!(snapshot.stream_reconnects, 1);
    }
}
