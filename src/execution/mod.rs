//! Order execution seam
//!
//! The engine talks to the venue only through `ExecutionClient`. Fills are
//! pulled, never assumed: positions change when a fill comes back, not
//! when an order goes out.

mod paper;

pub use paper::PaperExecution;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::strategy::{OrderIntent, Side};

pub type OrderId = Uuid;

/// Upstream order state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderStatus {
    Pending,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    /// Submission deadline elapsed without an answer; must be reconciled
    /// by polling before any further orders on the same key
    Unknown,
}

/// Handle returned by a submission
#[derive(Debug, Clone)]
pub struct OrderHandle {
    pub id: OrderId,
    pub status: OrderStatus,
}

impl OrderHandle {
    pub fn new(id: OrderId, status: OrderStatus) -> Self {
        Self { id, status }
    }
}

/// A confirmed execution
#[derive(Debug, Clone, Serialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub market_id: String,
    pub token_id: String,
    pub side: Side,
    pub price: Decimal,
    pub shares: Decimal,
    pub fees: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Venue execution interface
///
/// Order ids are assigned by the caller before submission, so an order
/// whose submission timed out can still be reconciled with `status`.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Submit an order under a caller-assigned id; the returned handle
    /// reflects immediate state only
    async fn submit(&self, id: OrderId, intent: &OrderIntent) -> anyhow::Result<OrderHandle>;

    /// Cancel a resting order; false when it was already gone
    async fn cancel(&self, id: OrderId) -> anyhow::Result<bool>;

    /// Poll upstream order state, used to reconcile ambiguous submissions
    async fn status(&self, id: OrderId) -> anyhow::Result<OrderStatus>;

    /// Take all fills confirmed since the last drain
    async fn drain_fills(&self) -> anyhow::Result<Vec<Fill>>;
}
