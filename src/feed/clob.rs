//! CLOB market-channel WebSocket stream
//!
//! One connection for all tracked tokens. On every (re)connect the current
//! token set is re-subscribed, so a reconnect after a market refresh picks
//! up exactly the tokens tracked now, not the set from connect time.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{PriceStream, StreamEvent};
use crate::config::StreamConfig;
use crate::market::PriceUpdate;

pub struct ClobStream {
    config: StreamConfig,
    tokens: Arc<RwLock<Vec<String>>>,
    /// Commands to the live socket task; `Some` while a loop is running
    command_tx: RwLock<Option<mpsc::Sender<Command>>>,
}

enum Command {
    Resubscribe(Vec<String>),
}

impl ClobStream {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            tokens: Arc::new(RwLock::new(Vec::new())),
            command_tx: RwLock::new(None),
        }
    }

    async fn run_loop(
        config: StreamConfig,
        tokens: Arc<RwLock<Vec<String>>>,
        tx: mpsc::Sender<StreamEvent>,
        mut command_rx: mpsc::Receiver<Command>,
    ) {
        let mut attempts = 0u32;
        let mut delay = Duration::from_millis(config.initial_reconnect_delay_ms);

        loop {
            match Self::connect_and_stream(&config, &tokens, &tx, &mut command_rx).await {
                Ok(()) => {
                    // clean close: receiver dropped or command channel closed
                    let _ = tx.send(StreamEvent::Disconnected).await;
                    return;
                }
                Err(err) => {
                    attempts += 1;
                    tracing::warn!(
                        error = %err,
                        attempt = attempts,
                        "price stream error, reconnecting"
                    );

                    if config.max_reconnect_attempts > 0
                        && attempts >= config.max_reconnect_attempts
                    {
                        tracing::error!("price stream exhausted reconnect attempts");
                        let _ = tx.send(StreamEvent::Disconnected).await;
                        return;
                    }
                    if tx.is_closed() {
                        return;
                    }

                    let _ = tx.send(StreamEvent::Reconnecting { attempt: attempts }).await;
                    sleep(delay).await;
                    delay =
                        (delay * 2).min(Duration::from_millis(config.max_reconnect_delay_ms));
                }
            }
        }
    }

    async fn connect_and_stream(
        config: &StreamConfig,
        tokens: &Arc<RwLock<Vec<String>>>,
        tx: &mpsc::Sender<StreamEvent>,
        command_rx: &mut mpsc::Receiver<Command>,
    ) -> anyhow::Result<()> {
        tracing::info!(url = %config.ws_url, "connecting price stream");
        let (ws_stream, _) = connect_async(&config.ws_url).await?;
        let (mut write, mut read) = ws_stream.split();

        // subscribe the token set as tracked right now
        let current = tokens.read().await.clone();
        write
            .send(Message::Text(subscription_message(&current)))
            .await?;
        tracing::info!(token_count = current.len(), "price stream subscribed");

        if tx.send(StreamEvent::Connected).await.is_err() {
            return Ok(());
        }

        let mut ping_interval = tokio::time::interval(Duration::from_secs(10));
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            for update in parse_price_events(&text) {
                                if tx.send(StreamEvent::Price(update)).await.is_err() {
                                    return Ok(());
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            anyhow::bail!("server closed connection");
                        }
                        Some(Err(err)) => return Err(err.into()),
                        None => anyhow::bail!("stream ended"),
                        _ => {}
                    }
                }

                cmd = command_rx.recv() => {
                    match cmd {
                        Some(Command::Resubscribe(new_tokens)) => {
                            write
                                .send(Message::Text(subscription_message(&new_tokens)))
                                .await?;
                            tracing::info!(
                                token_count = new_tokens.len(),
                                "price stream resubscribed"
                            );
                        }
                        None => return Ok(()),
                    }
                }

                _ = ping_interval.tick() => {
                    write.send(Message::Ping(Vec::new())).await?;
                }
            }
        }
    }
}

#[async_trait]
impl PriceStream for ClobStream {
    async fn subscribe(
        &self,
        token_ids: Vec<String>,
    ) -> anyhow::Result<mpsc::Receiver<StreamEvent>> {
        *self.tokens.write().await = token_ids;

        let (event_tx, event_rx) = mpsc::channel(1024);
        let (command_tx, command_rx) = mpsc::channel(16);
        *self.command_tx.write().await = Some(command_tx);

        let config = self.config.clone();
        let tokens = Arc::clone(&self.tokens);
        tokio::spawn(async move {
            Self::run_loop(config, tokens, event_tx, command_rx).await;
        });

        Ok(event_rx)
    }

    async fn update_tokens(&self, token_ids: Vec<String>) -> anyhow::Result<()> {
        *self.tokens.write().await = token_ids.clone();
        if let Some(tx) = self.command_tx.read().await.as_ref() {
            // socket task gone means the next subscribe picks the set up
            let _ = tx.send(Command::Resubscribe(token_ids)).await;
        }
        Ok(())
    }
}

fn subscription_message(tokens: &[String]) -> String {
    json!({
        "type": "market",
        "assets_ids": tokens,
    })
    .to_string()
}

/// Parse a market-channel payload into price updates
///
/// The channel delivers both single events and batched arrays; price
/// information arrives as `price_change` and `last_trade_price` events.
fn parse_price_events(text: &str) -> Vec<PriceUpdate> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let events: Vec<serde_json::Value> = match value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };

    events
        .into_iter()
        .filter_map(|event| {
            let parsed: ClobEvent = serde_json::from_value(event).ok()?;
            match parsed.event_type.as_str() {
                "price_change" | "last_trade_price" => {
                    let price = Decimal::from_str(parsed.price.as_deref()?).ok()?;
                    Some(PriceUpdate {
                        token_id: parsed.asset_id?,
                        price,
                        timestamp: Utc::now(),
                    })
                }
                _ => None,
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ClobEvent {
    #[serde(default)]
    event_type: String,
    asset_id: Option<String>,
    price: Option<String>,
}
