//! Real-time price feed
//!
//! Push-based price updates for tracked outcome tokens, with connection
//! lifecycle events surfaced so the engine can count reconnects and fall
//! back to its polling cadence while disconnected.

mod clob;

pub use clob::ClobStream;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::market::PriceUpdate;

/// Events emitted by a price stream
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Socket established; the subscription for the current token set has
    /// been sent
    Connected,
    Reconnecting { attempt: u32 },
    /// Gave up reconnecting; polling cadence carries on alone
    Disconnected,
    Price(PriceUpdate),
}

/// Trait for price stream implementations
#[async_trait]
pub trait PriceStream: Send + Sync {
    /// Start streaming for a token set
    async fn subscribe(&self, token_ids: Vec<String>) -> anyhow::Result<mpsc::Receiver<StreamEvent>>;

    /// Replace the subscribed token set; applies to the live socket and to
    /// every reconnect after it
    async fn update_tokens(&self, token_ids: Vec<String>) -> anyhow::Result<()>;
}
