//! Shared market cache
//!
//! Single writer (the engine's refresh path and the reactor's price path),
//! many readers. Readers get clones rather than lock guards so strategy
//! code stays lock-free.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::{PriceUpdate, TemperatureMarket};

#[derive(Default)]
struct StoreInner {
    markets: HashMap<String, TemperatureMarket>,
    /// token id -> (market id, outcome index)
    token_index: HashMap<String, (String, usize)>,
}

/// Cache of tracked markets keyed by market id, with a token-to-market index
#[derive(Clone, Default)]
pub struct MarketStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl MarketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tracked set from a fresh snapshot
    ///
    /// Markets failing validation are dropped and logged. Prices pushed
    /// since the snapshot was taken are overwritten by snapshot prices,
    /// which is fine: the next push re-applies them.
    pub async fn replace_all(&self, markets: Vec<TemperatureMarket>) -> usize {
        let mut inner = self.inner.write().await;
        inner.markets.clear();
        inner.token_index.clear();

        let mut dropped = 0;
        for mut market in markets {
            if let Err(err) = market.validate() {
                tracing::warn!(error = %err, "dropping invalid market from snapshot");
                dropped += 1;
                continue;
            }
            market.sort_outcomes();
            for (idx, outcome) in market.outcomes.iter().enumerate() {
                inner
                    .token_index
                    .insert(outcome.token_id.clone(), (market.market_id.clone(), idx));
            }
            inner.markets.insert(market.market_id.clone(), market);
        }
        dropped
    }

    /// Apply a pushed price; returns the owning market id, or `None` for
    /// an unmapped token (caller drops the event).
    pub async fn apply_price(&self, update: &PriceUpdate) -> Option<String> {
        let mut inner = self.inner.write().await;
        let (market_id, idx) = inner.token_index.get(&update.token_id)?.clone();
        let market = inner.markets.get_mut(&market_id)?;
        market.outcomes[idx].price = update.price;
        Some(market_id)
    }

    pub async fn get(&self, market_id: &str) -> Option<TemperatureMarket> {
        self.inner.read().await.markets.get(market_id).cloned()
    }

    pub async fn all(&self) -> Vec<TemperatureMarket> {
        self.inner.read().await.markets.values().cloned().collect()
    }

    /// Resolve a token to its owning market id
    pub async fn market_for_token(&self, token_id: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .token_index
            .get(token_id)
            .map(|(m, _)| m.clone())
    }

    /// Every token id in the tracked set, for stream subscription
    pub async fn tracked_tokens(&self) -> Vec<String> {
        self.inner.read().await.token_index.keys().cloned().collect()
    }

    /// Last known price for a token
    pub async fn price_of(&self, token_id: &str) -> Option<Decimal> {
        let inner = self.inner.read().await;
        let (market_id, idx) = inner.token_index.get(token_id)?;
        inner.markets.get(market_id).map(|m| m.outcomes[*idx].price)
    }

    pub async fn remove(&self, market_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(market) = inner.markets.remove(market_id) {
            for outcome in &market.outcomes {
                inner.token_index.remove(&outcome.token_id);
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.markets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::tests::ladder;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_replace_and_lookup() {
        let store = MarketStore::new();
        let dropped = store.replace_all(vec![ladder()]).await;
        assert_eq!(dropped, 0);
        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.market_for_token("t-6162").await.as_deref(),
            Some("mkt-1")
        );
        assert_eq!(store.tracked_tokens().await.len(), 5);
    }

    #[tokio::test]
    async fn test_invalid_market_dropped() {
        let store = MarketStore::new();
        let mut bad = ladder();
        bad.market_id = "mkt-bad".to_string();
        bad.outcomes.clear();
        let dropped = store.replace_all(vec![ladder(), bad]).await;
        assert_eq!(dropped, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_apply_price() {
        let store = MarketStore::new();
        store.replace_all(vec![ladder()]).await;

        let update = PriceUpdate {
            token_id: "t-6364".to_string(),
            price: dec!(0.42),
            timestamp: Utc::now(),
        };
        assert_eq!(store.apply_price(&update).await.as_deref(), Some("mkt-1"));
        assert_eq!(store.price_of("t-6364").await, Some(dec!(0.42)));
    }

    #[tokio::test]
    async fn test_unmapped_token_ignored() {
        let store = MarketStore::new();
        store.replace_all(vec![ladder()]).await;

        let update = PriceUpdate {
            token_id: "t-unknown".to_string(),
            price: dec!(0.42),
            timestamp: Utc::now(),
        };
        assert!(store.apply_price(&update).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_clears_index() {
        let store = MarketStore::new();
        store.replace_all(vec![ladder()]).await;
        store.remove("mkt-1").await;
        assert!(store.is_empty().await);
        assert!(store.market_for_token("t-6162").await.is_none());
    }
}
