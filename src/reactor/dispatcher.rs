//! Per-key event serialization
//!
//! Invariants:
//! - at most one event in flight per key
//! - at most one pending event per key; a newer event replaces it
//! - a key with an unreconciled ambiguous order submits no further orders
//!   until a status poll settles it

use std::collections::HashMap;
use std::sync::Mutex;

use super::MarketEvent;
use crate::execution::OrderId;

/// Serialization key for reactive work
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub market_id: String,
    pub token_id: String,
}

#[derive(Default)]
struct KeyState {
    in_flight: bool,
    pending: Option<MarketEvent>,
    /// Order whose submission deadline elapsed without an answer
    unreconciled: Option<OrderId>,
}

/// Decision returned by [`KeyedDispatcher::admit`]
#[derive(Debug)]
pub enum Admission {
    /// Caller processes the event now
    Process(MarketEvent),
    /// Event parked behind in-flight work (replacing any older parked one)
    Queued,
}

/// Gatekeeper enforcing per-key serialization
#[derive(Default)]
pub struct KeyedDispatcher {
    keys: Mutex<HashMap<EventKey, KeyState>>,
}

impl KeyedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer an event for a key
    pub fn admit(&self, key: &EventKey, event: MarketEvent) -> Admission {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        let state = keys.entry(key.clone()).or_default();

        if state.in_flight {
            if state.pending.is_some() {
                tracing::trace!(
                    market_id = %key.market_id,
                    token_id = %key.token_id,
                    "superseding pending event"
                );
            }
            state.pending = Some(event);
            Admission::Queued
        } else {
            state.in_flight = true;
            Admission::Process(event)
        }
    }

    /// Mark a key's in-flight work done; returns the parked event to
    /// process next, if any, keeping the key in flight in that case
    pub fn complete(&self, key: &EventKey) -> Option<MarketEvent> {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        let state = keys.entry(key.clone()).or_default();
        match state.pending.take() {
            Some(event) => Some(event),
            None => {
                state.in_flight = false;
                None
            }
        }
    }

    /// Record an ambiguous order on a key
    pub fn mark_unreconciled(&self, key: &EventKey, order_id: OrderId) {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        keys.entry(key.clone()).or_default().unreconciled = Some(order_id);
        tracing::warn!(
            market_id = %key.market_id,
            token_id = %key.token_id,
            order_id = %order_id,
            "order outcome ambiguous, key blocked for new orders"
        );
    }

    /// The ambiguous order blocking a key, if any
    pub fn unreconciled(&self, key: &EventKey) -> Option<OrderId> {
        let keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        keys.get(key).and_then(|s| s.unreconciled)
    }

    /// Clear the block after a successful status poll
    pub fn reconcile(&self, key: &EventKey) {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = keys.get_mut(key) {
            state.unreconciled = None;
        }
    }

    /// Drop state for markets no longer tracked
    pub fn retain_markets(&self, keep: impl Fn(&str) -> bool) {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        keys.retain(|key, _| keep(&key.market_id));
    }
}
