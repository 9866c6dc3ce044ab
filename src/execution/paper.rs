//! Paper trading execution
//!
//! Market orders and marketable limits fill immediately at the intent's
//! mark price; a taker fee applies. Resting quotes stay `Pending` until
//! cancelled. Good enough for exercising the engine end to end.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::{ExecutionClient, Fill, OrderHandle, OrderId, OrderStatus};
use crate::strategy::{OrderIntent, Side};

pub struct PaperExecution {
    fee_rate: Decimal,
    fills: Arc<RwLock<Vec<Fill>>>,
    statuses: Arc<RwLock<HashMap<OrderId, OrderStatus>>>,
}

impl PaperExecution {
    pub fn new(fee_rate: Decimal) -> Self {
        Self {
            fee_rate,
            fills: Arc::new(RwLock::new(Vec::new())),
            statuses: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// A limit buy at or above the mark, or a limit sell at or below it,
    /// crosses the simulated book
    fn is_marketable(intent: &OrderIntent) -> bool {
        match intent.limit_price {
            None => true,
            Some(limit) => match intent.side {
                Side::Buy => limit >= intent.mark_price,
                Side::Sell => limit <= intent.mark_price,
            },
        }
    }
}

#[async_trait]
impl ExecutionClient for PaperExecution {
    async fn submit(&self, order_id: OrderId, intent: &OrderIntent) -> anyhow::Result<OrderHandle> {
        if Self::is_marketable(intent) {
            let price = intent.limit_price.unwrap_or(intent.mark_price);
            if price.is_zero() {
                anyhow::bail!("cannot fill at zero price");
            }
            let shares = intent.size / price;
            let fill = Fill {
                order_id,
                market_id: intent.market_id.clone(),
                token_id: intent.token_id.clone(),
                side: intent.side,
                price,
                shares,
                fees: intent.size * self.fee_rate,
                timestamp: Utc::now(),
            };
            self.fills.write().await.push(fill);
            self.statuses.write().await.insert(order_id, OrderStatus::Filled);
            tracing::info!(
                order_id = %order_id,
                token_id = %intent.token_id,
                "paper order filled"
            );
        } else {
            self.statuses
                .write()
                .await
                .insert(order_id, OrderStatus::Pending);
            tracing::debug!(
                order_id = %order_id,
                token_id = %intent.token_id,
                "paper order resting"
            );
        }

        let status = self
            .statuses
            .read()
            .await
            .get(&order_id)
            .copied()
            .unwrap_or(OrderStatus::Pending);
        Ok(OrderHandle {
            id: order_id,
            status,
        })
    }

    async fn cancel(&self, id: OrderId) -> anyhow::Result<bool> {
        let mut statuses = self.statuses.write().await;
        match statuses.get(&id) {
            Some(OrderStatus::Pending) => {
                statuses.insert(id, OrderStatus::Cancelled);
                tracing::debug!(order_id = %id, "paper order cancelled");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn status(&self, id: OrderId) -> anyhow::Result<OrderStatus> {
        Ok(self
            .statuses
            .read()
            .await
            .get(&id)
            .copied()
            .unwrap_or(OrderStatus::Rejected))
    }

    async fn drain_fills(&self) -> anyhow::Result<Vec<Fill>> {
        let mut fills = self.fills.write().await;
        Ok(std::mem::take(&mut *fills))
    }
}
