//! Engine-wide error taxonomy
//!
//! Deliberately small: stale data skips one decision, invalid market data
//! drops the offending input, and configuration problems are fatal at
//! startup. Ambiguous submissions and risk halts are engine state (the
//! dispatcher's per-key block and the circuit breaker), not error values.

use thiserror::Error;

/// Errors surfaced by the trading engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Cached data is older than its freshness window
    #[error("stale {kind} data: age {age_secs}s exceeds ttl {ttl_secs}s")]
    StaleData {
        kind: String,
        age_secs: i64,
        ttl_secs: i64,
    },

    /// Market payload that cannot be interpreted (unparseable bucket label,
    /// missing token id). The offending market or outcome is excluded.
    #[error("invalid market data in {market_id}: {detail}")]
    InvalidMarketData { market_id: String, detail: String },

    /// Bad or unsupported configuration
    #[error("config error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::StaleData {
            kind: "forecast".to_string(),
            age_secs: 700,
            ttl_secs: 600,
        };
        assert!(err.to_string().contains("stale forecast"));

        let err = EngineError::InvalidMarketData {
            market_id: "mkt-1".to_string(),
            detail: "no parseable buckets".to_string(),
        };
        assert!(err.to_string().contains("mkt-1"));
    }
}
