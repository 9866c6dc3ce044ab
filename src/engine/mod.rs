//! Engine orchestration
//!
//! One engine instance owns the shared caches and drives three loops: the
//! scheduled evaluation cycle, the day-of observation poller, and the
//! reactive event path fed by the price stream. All order flow funnels
//! through `submit_intent`, which enforces the per-key ambiguity block.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Timelike, Utc};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};

use crate::config::Config;
use crate::execution::{ExecutionClient, OrderHandle, OrderId, OrderStatus, PaperExecution};
use crate::feed::{ClobStream, PriceStream, StreamEvent};
use crate::forecast::{ForecastCache, ForecastProvider, WeatherClient};
use crate::market::lifecycle::{LifecycleTracker, MarketPhase};
use crate::market::{GammaDiscovery, MarketDataSource, MarketStore, TemperatureMarket};
use crate::reactor::{Admission, EventKey, KeyedDispatcher, MarketEvent};
use crate::risk::{CircuitBreaker, KellySizer, PositionBook};
use crate::strategy::{
    partition_outcomes, IntentReason, MarketMaker, OrderIntent, Owner, PositionTaker, Side,
};
use crate::telemetry::metrics as tel;
use crate::telemetry::{EngineMetrics, MetricsSnapshot};

#[derive(Debug, Default, Clone)]
struct OpenQuotes {
    bid: Option<OrderId>,
    ask: Option<OrderId>,
}

pub struct Engine {
    cfg: Config,
    store: MarketStore,
    forecasts: ForecastCache,
    book: Mutex<PositionBook>,
    breaker: Mutex<CircuitBreaker>,
    lifecycle: Mutex<LifecycleTracker>,
    taker: PositionTaker,
    maker: MarketMaker,
    /// Resting maker quotes per token, for cancel-and-replace
    quotes: Mutex<HashMap<String, OpenQuotes>>,
    /// Last observed daily max per market on its target day
    observed: Mutex<HashMap<String, f64>>,
    dispatcher: KeyedDispatcher,
    metrics: Arc<EngineMetrics>,
    discovery: Arc<dyn MarketDataSource>,
    weather: Arc<dyn ForecastProvider>,
    stream: Arc<dyn PriceStream>,
    exec: Arc<dyn ExecutionClient>,
    shutdown_tx: watch::Sender<bool>,
}

impl Engine {
    pub fn new(
        cfg: Config,
        discovery: Arc<dyn MarketDataSource>,
        weather: Arc<dyn ForecastProvider>,
        stream: Arc<dyn PriceStream>,
        exec: Arc<dyn ExecutionClient>,
    ) -> Arc<Self> {
        let sizer = KellySizer::new(
            cfg.risk.kelly_fraction,
            cfg.risk.max_position_size,
            cfg.risk.min_order_size,
        );
        let taker = PositionTaker::new(
            cfg.taker.clone(),
            sizer,
            cfg.edge.min_edge,
            cfg.risk.max_exposure_per_market,
            cfg.engine.bankroll,
        );
        let maker = MarketMaker::new(cfg.maker.clone());
        let forecasts = ForecastCache::new(cfg.forecast.cache_ttl_secs);
        let lifecycle = LifecycleTracker::new(cfg.engine.advance_days, cfg.maker.enabled);
        let (shutdown_tx, _) = watch::channel(false);

        Arc::new(Self {
            store: MarketStore::new(),
            forecasts,
            book: Mutex::new(PositionBook::new()),
            breaker: Mutex::new(CircuitBreaker::new()),
            lifecycle: Mutex::new(lifecycle),
            taker,
            maker,
            quotes: Mutex::new(HashMap::new()),
            observed: Mutex::new(HashMap::new()),
            dispatcher: KeyedDispatcher::new(),
            metrics: EngineMetrics::new(),
            discovery,
            weather,
            stream,
            exec,
            shutdown_tx,
            cfg,
        })
    }

    /// Build an engine with the production collaborators
    pub fn from_config(cfg: Config) -> anyhow::Result<Arc<Self>> {
        let discovery = Arc::new(GammaDiscovery::new(cfg.discovery.clone())?);
        let weather = Arc::new(WeatherClient::new(cfg.forecast.clone())?);
        let stream = Arc::new(ClobStream::new(cfg.stream.clone()));
        let exec = Arc::new(PaperExecution::new(cfg.execution.fee_rate));
        Ok(Self::new(cfg, discovery, weather, stream, exec))
    }

    /// Run until `stop` is called
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let stream_rx = self.stream.subscribe(Vec::new()).await?;
        let (event_tx, mut event_rx) = mpsc::channel::<MarketEvent>(1024);

        {
            let engine = Arc::clone(&self);
            tokio::spawn(async move {
                engine.listen_stream(stream_rx, event_tx).await;
            });
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut cycle = interval(Duration::from_secs(self.cfg.engine.check_interval_secs));
        cycle.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut day_of = interval(Duration::from_secs(self.cfg.engine.day_of_interval_secs));
        day_of.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!("engine started");
        loop {
            tokio::select! {
                _ = cycle.tick() => {
                    self.run_cycle().await;
                }
                _ = day_of.tick() => {
                    self.poll_observations().await;
                }
                Some(event) = event_rx.recv() => {
                    let engine = Arc::clone(&self);
                    tokio::spawn(async move {
                        engine.handle_event(event).await;
                    });
                }
                _ = shutdown_rx.changed() => {
                    tracing::info!("engine stopping");
                    break;
                }
            }
        }

        // no maker quote survives the process
        let tokens: Vec<String> = self.quotes.lock().await.keys().cloned().collect();
        for token in tokens {
            self.cancel_quotes(&token).await;
        }
        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Highest lifecycle phase reached for a market
    pub async fn phase(&self, market_id: &str) -> Option<MarketPhase> {
        self.lifecycle.lock().await.reached_phase(market_id)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn listen_stream(
        &self,
        mut rx: mpsc::Receiver<StreamEvent>,
        event_tx: mpsc::Sender<MarketEvent>,
    ) {
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Price(update) => {
                    let _ = event_tx.send(MarketEvent::Price(update)).await;
                }
                StreamEvent::Connected => {
                    tracing::info!("price stream connected");
                }
                StreamEvent::Reconnecting { attempt } => {
                    self.metrics.stream_reconnect();
                    tel::record_reconnect();
                    tracing::warn!(attempt, "price stream reconnecting");
                }
                StreamEvent::Disconnected => {
                    tracing::warn!("price stream down, polling cadence continues alone");
                }
            }
        }
    }

    /// Scheduled evaluation cycle
    async fn run_cycle(&self) {
        let today = Utc::now().date_naive();
        {
            let mut book = self.book.lock().await;
            if book.roll_day(today) {
                tracing::info!(day = %today, "trading day rolled");
            }
        }

        match self.discovery.snapshot().await {
            Ok(markets) => {
                let dropped = self.store.replace_all(markets).await;
                if dropped > 0 {
                    tracing::warn!(dropped, "snapshot contained invalid markets");
                }
                let tokens = self.store.tracked_tokens().await;
                if let Err(err) = self.stream.update_tokens(tokens).await {
                    tracing::warn!(error = %err, "stream resubscription failed");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "market snapshot failed, using cached set");
            }
        }

        let markets = self.store.all().await;
        tel::set_active_markets(markets.len());

        let ids: HashSet<String> = markets.iter().map(|m| m.market_id.clone()).collect();
        self.lifecycle.lock().await.retain(|id| ids.contains(id));
        self.dispatcher.retain_markets(|id| ids.contains(id));
        self.forecasts
            .retain_dates(|d| markets.iter().any(|m| m.target_date == *d))
            .await;

        for market in markets {
            let days = market.days_until_target(today);
            if !market.resolved && (0..=self.cfg.engine.advance_days).contains(&days) {
                match self.weather.forecast(market.target_date, days).await {
                    Ok(forecast) => self.forecasts.insert(forecast).await,
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            market_id = %market.market_id,
                            "forecast refresh failed"
                        );
                    }
                }
            }
            self.evaluate_market(&market, today).await;
        }

        self.apply_fills().await;
    }

    /// Phase-driven evaluation of one market
    async fn evaluate_market(&self, market: &TemperatureMarket, today: NaiveDate) {
        let past_settlement = self.past_settlement(market, today);
        let phases = self
            .lifecycle
            .lock()
            .await
            .evaluate(market, today, past_settlement);

        if phases.contains(&MarketPhase::Resolved) {
            self.retire_market(market).await;
            return;
        }
        if phases.contains(&MarketPhase::WaitingResolution)
            || phases.contains(&MarketPhase::DayOfMonitoring)
        {
            // no scheduled trading; day-of action comes from observations
            self.cancel_market_quotes(market).await;
            return;
        }
        if phases.contains(&MarketPhase::Scanning) {
            return;
        }

        // scheduled trading goes through the reactive path so it holds
        // the same per-token key as pushed updates
        for outcome in &market.outcomes {
            self.handle_event(MarketEvent::Refresh {
                market_id: market.market_id.clone(),
                token_id: outcome.token_id.clone(),
            })
            .await;
        }
    }

    /// Reactive path entry: serialize per key, process, drain pending
    async fn handle_event(&self, event: MarketEvent) {
        let market_id = match &event {
            MarketEvent::Price(update) => {
                match self.store.market_for_token(&update.token_id).await {
                    Some(id) => id,
                    None => {
                        tracing::debug!(
                            token_id = %update.token_id,
                            "price update for unmapped token dropped"
                        );
                        return;
                    }
                }
            }
            MarketEvent::Refresh { market_id, .. } => market_id.clone(),
            MarketEvent::Observation { market_id, .. } => market_id.clone(),
        };

        let key = event.key(&market_id);
        let Admission::Process(mut current) = self.dispatcher.admit(&key, event) else {
            return;
        };
        loop {
            self.process_event(&key, current).await;
            match self.dispatcher.complete(&key) {
                Some(next) => current = next,
                None => break,
            }
        }
    }

    async fn process_event(&self, key: &EventKey, event: MarketEvent) {
        self.metrics.event_processed();
        match event {
            MarketEvent::Price(update) => {
                if self.store.apply_price(&update).await.is_none() {
                    return;
                }
                self.book
                    .lock()
                    .await
                    .mark(&key.market_id, &update.token_id, update.price);
                self.evaluate_token(key).await;
            }
            MarketEvent::Refresh { .. } => {
                self.evaluate_token(key).await;
            }
            MarketEvent::Observation { observed_max, .. } => {
                self.correct_buckets(key, observed_max).await;
            }
        }
    }

    /// Re-evaluate one outcome under its owning strategy
    ///
    /// Runs with the (market, token) key held, whether the trigger was a
    /// pushed price or a scheduled refresh.
    async fn evaluate_token(&self, key: &EventKey) {
        let Some(market) = self.store.get(&key.market_id).await else {
            return;
        };
        let today = Utc::now().date_naive();
        let forecast = match self.forecasts.get_fresh(market.target_date, Utc::now()).await {
            Ok(f) => f,
            Err(err) => {
                tracing::debug!(
                    error = %err,
                    market_id = %key.market_id,
                    "evaluation skipped without fresh forecast"
                );
                return;
            }
        };
        let past_settlement = self.past_settlement(&market, today);
        let phases = self
            .lifecycle
            .lock()
            .await
            .evaluate(&market, today, past_settlement);

        let Some(idx) = market
            .outcomes
            .iter()
            .position(|o| o.token_id == key.token_id)
        else {
            return;
        };
        if !self.breaker_allows(&market, today).await {
            return;
        }
        let owners = partition_outcomes(&market, forecast.max_temp, self.cfg.taker.neighbor_span);
        let positioning = phases.contains(&MarketPhase::Positioning);

        match owners[idx] {
            Owner::PositionTaker if positioning => {
                self.metrics.edge_observed();
                let days = market.days_until_target(today);
                let intents: Vec<OrderIntent> = {
                    let book = self.book.lock().await;
                    self.taker.plan(&market, &forecast, days, &book)
                }
                .into_iter()
                .filter(|i| i.token_id == key.token_id)
                .collect();
                for intent in intents {
                    self.submit_intent(key, intent).await;
                }
            }
            Owner::MarketMaker if phases.contains(&MarketPhase::MarketMaking) => {
                self.refresh_quotes(&market, idx, &forecast).await;
            }
            _ => {}
        }

        if positioning {
            // a cost-justified move out of this bucket submits both legs
            // under the held token's key, like a day-of correction
            let moves = {
                let book = self.book.lock().await;
                self.taker.rebalance(&market, &forecast, &book)
            };
            for pair in moves.chunks(2) {
                if pair.len() == 2 && pair[0].token_id == key.token_id {
                    self.submit_intent(key, pair[0].clone()).await;
                    self.submit_intent(key, pair[1].clone()).await;
                }
            }
        }
        self.apply_fills().await;
    }

    /// Check circuit-breaker limits for a market; false halts it for the day
    async fn breaker_allows(&self, market: &TemperatureMarket, today: NaiveDate) -> bool {
        let (daily_pnl, worst_inventory) = {
            let book = self.book.lock().await;
            let worst = market
                .outcomes
                .iter()
                .map(|o| book.inventory(&market.market_id, &o.token_id))
                .max_by(|a, b| a.abs().cmp(&b.abs()))
                .unwrap_or_default();
            (book.daily_pnl(&market.market_id), worst)
        };
        tel::set_market_daily_pnl(&market.market_id, daily_pnl);

        let (halted, newly_tripped) = {
            let mut breaker = self.breaker.lock().await;
            let already = breaker.is_tripped(&market.market_id, today);
            let halted = breaker
                .check(
                    &market.market_id,
                    daily_pnl,
                    self.cfg.maker.max_daily_loss,
                    worst_inventory,
                    self.cfg.maker.max_inventory,
                    today,
                )
                .is_some();
            (halted, halted && !already)
        };
        if newly_tripped {
            self.metrics.breaker_trip();
        }
        if halted {
            self.cancel_market_quotes(market).await;
        }
        !halted
    }

    /// Day-of forced correction: the observed max left a held bucket
    ///
    /// Closes the wrong bucket and opens the bucket containing the
    /// observation, both as market orders, bypassing edge and sizing
    /// checks. Speed beats price here.
    async fn correct_buckets(&self, key: &EventKey, observed_max: f64) {
        let Some(market) = self.store.get(&key.market_id).await else {
            return;
        };
        let Some(correct_idx) = market.primary_bucket(observed_max) else {
            tracing::warn!(
                market_id = %key.market_id,
                observed_max,
                "observed max outside ladder, no correction possible"
            );
            return;
        };
        let correct = market.outcomes[correct_idx].clone();

        let held: Vec<(String, Decimal, Decimal)> = {
            let book = self.book.lock().await;
            book.positions_for_market(&key.market_id)
                .into_iter()
                .filter(|p| p.shares > Decimal::ZERO)
                .map(|p| (p.token_id.clone(), p.shares, p.mark_price))
                .collect()
        };

        for (token_id, shares, mark) in held {
            let Some(outcome) = market.outcome_by_token(&token_id) else {
                continue;
            };
            if outcome.range.contains(observed_max) {
                continue;
            }

            let notional = shares * mark;
            tracing::info!(
                market_id = %market.market_id,
                from = %outcome.range.label,
                to = %correct.range.label,
                observed_max,
                notional = %notional,
                "observed max left held bucket, forcing correction"
            );

            let close = OrderIntent::market(
                &market.market_id,
                &token_id,
                Side::Sell,
                notional,
                mark,
                IntentReason::BucketCorrection,
            );
            let open = OrderIntent::market(
                &market.market_id,
                &correct.token_id,
                Side::Buy,
                notional,
                correct.price,
                IntentReason::BucketCorrection,
            );
            self.submit_intent(key, close).await;
            self.submit_intent(key, open).await;
        }
        self.apply_fills().await;
    }

    /// Cancel-and-replace the quote pair for one maker-owned outcome
    async fn refresh_quotes(
        &self,
        market: &TemperatureMarket,
        idx: usize,
        forecast: &crate::forecast::Forecast,
    ) {
        let token_id = market.outcomes[idx].token_id.clone();
        let inventory = self
            .book
            .lock()
            .await
            .inventory(&market.market_id, &token_id);

        let pair = self.maker.quotes_for(market, idx, forecast, inventory);

        // both legs replaced together; the caller holds the key, so no
        // partial pair is ever observable from another event
        self.cancel_quotes(&token_id).await;
        let Some(pair) = pair else {
            return;
        };

        let key = EventKey {
            market_id: market.market_id.clone(),
            token_id: token_id.clone(),
        };
        let mut open = OpenQuotes::default();
        if let Some(bid) = pair.bid {
            open.bid = self.submit_intent(&key, bid).await.map(|h| h.id);
        }
        if let Some(ask) = pair.ask {
            open.ask = self.submit_intent(&key, ask).await.map(|h| h.id);
        }
        self.quotes.lock().await.insert(token_id, open);
    }

    async fn cancel_quotes(&self, token_id: &str) {
        let open = self.quotes.lock().await.remove(token_id);
        if let Some(open) = open {
            for id in [open.bid, open.ask].into_iter().flatten() {
                if let Err(err) = self.exec.cancel(id).await {
                    tracing::warn!(error = %err, order_id = %id, "quote cancel failed");
                }
            }
        }
    }

    async fn cancel_market_quotes(&self, market: &TemperatureMarket) {
        for outcome in &market.outcomes {
            self.cancel_quotes(&outcome.token_id).await;
        }
    }

    async fn retire_market(&self, market: &TemperatureMarket) {
        tracing::info!(market_id = %market.market_id, "retiring resolved market");
        self.lifecycle.lock().await.mark_resolved(&market.market_id);
        self.cancel_market_quotes(market).await;
        self.store.remove(&market.market_id).await;
        self.observed.lock().await.remove(&market.market_id);
        self.book.lock().await.drop_market(&market.market_id);
    }

    /// Submit an intent under the per-key ambiguity discipline
    ///
    /// A tripped breaker drops everything for the market, corrections
    /// included. A key with an unreconciled order submits nothing until a
    /// status poll settles the old order. A submission that outlives its
    /// deadline becomes the key's unreconciled order.
    async fn submit_intent(&self, key: &EventKey, intent: OrderIntent) -> Option<OrderHandle> {
        let today = Utc::now().date_naive();
        if self.breaker.lock().await.is_tripped(&key.market_id, today) {
            tracing::warn!(
                market_id = %key.market_id,
                token_id = %intent.token_id,
                reason = ?intent.reason,
                "market halted by circuit breaker, intent dropped"
            );
            return None;
        }
        if !self.try_reconcile(key).await {
            tracing::warn!(
                market_id = %key.market_id,
                token_id = %key.token_id,
                "key blocked on unreconciled order, intent dropped"
            );
            return None;
        }

        let order_id = OrderId::new_v4();
        let deadline = Duration::from_millis(self.cfg.execution.submit_deadline_ms);
        match timeout(deadline, self.exec.submit(order_id, &intent)).await {
            Ok(Ok(handle)) => {
                self.metrics.order_placed();
                tel::record_order(&key.market_id);
                tracing::info!(
                    order_id = %handle.id,
                    token_id = %intent.token_id,
                    side = ?intent.side,
                    size = %intent.size,
                    reason = ?intent.reason,
                    "order submitted"
                );
                Some(handle)
            }
            Ok(Err(err)) => {
                tracing::error!(
                    error = %err,
                    token_id = %intent.token_id,
                    "order submission failed"
                );
                None
            }
            Err(_) => {
                self.dispatcher.mark_unreconciled(key, order_id);
                Some(OrderHandle::new(order_id, OrderStatus::Unknown))
            }
        }
    }

    /// Clear a key's ambiguity block if the upstream state is now known
    async fn try_reconcile(&self, key: &EventKey) -> bool {
        let Some(order_id) = self.dispatcher.unreconciled(key) else {
            return true;
        };
        match self.exec.status(order_id).await {
            Ok(OrderStatus::Unknown) => false,
            Ok(status) => {
                tracing::info!(
                    order_id = %order_id,
                    status = ?status,
                    "ambiguous order reconciled"
                );
                self.dispatcher.reconcile(key);
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, order_id = %order_id, "reconciliation poll failed");
                false
            }
        }
    }

    /// Poll observed temperatures for markets on their target day
    async fn poll_observations(&self) {
        let today = Utc::now().date_naive();
        for market in self.store.all().await {
            if market.resolved
                || market.days_until_target(today) != 0
                || self.past_settlement(&market, today)
            {
                continue;
            }

            match self.weather.observed_max(market.target_date).await {
                Ok(Some(max)) => {
                    let changed = {
                        let mut observed = self.observed.lock().await;
                        let moved = observed
                            .get(&market.market_id)
                            .is_none_or(|last| (max - last).abs() >= self.cfg.forecast.change_threshold);
                        if moved {
                            observed.insert(market.market_id.clone(), max);
                        }
                        moved
                    };
                    if changed {
                        tracing::info!(
                            market_id = %market.market_id,
                            observed_max = max,
                            "observed daily max moved"
                        );
                        let event = MarketEvent::Observation {
                            market_id: market.market_id.clone(),
                            observed_max: max,
                        };
                        self.handle_event(event).await;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!(error = %err, market_id = %market.market_id, "observation poll failed");
                }
            }
        }
    }

    /// Pull confirmed fills into the book
    async fn apply_fills(&self) {
        match self.exec.drain_fills().await {
            Ok(fills) => {
                if fills.is_empty() {
                    return;
                }
                let mut book = self.book.lock().await;
                for fill in &fills {
                    tracing::info!(
                        order_id = %fill.order_id,
                        token_id = %fill.token_id,
                        side = ?fill.side,
                        shares = %fill.shares,
                        price = %fill.price,
                        "fill applied"
                    );
                    book.apply_fill(fill);
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "draining fills failed");
            }
        }
    }

    /// Whether the daily high is locked in for a market's target day
    fn past_settlement(&self, market: &TemperatureMarket, today: NaiveDate) -> bool {
        market.days_until_target(today) == 0
            && Utc::now().hour() >= self.cfg.engine.settlement_hour
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::Forecast;
    use crate::market::tests::ladder;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex as StdMutex;

    struct FixedDiscovery {
        markets: StdMutex<Vec<TemperatureMarket>>,
    }

    #[async_trait]
    impl MarketDataSource for FixedDiscovery {
        async fn snapshot(&self) -> anyhow::Result<Vec<TemperatureMarket>> {
            Ok(self.markets.lock().unwrap().clone())
        }
    }

    struct FixedWeather {
        max_temp: f64,
        observed: Option<f64>,
    }

    #[async_trait]
    impl ForecastProvider for FixedWeather {
        async fn forecast(&self, date: chrono::NaiveDate, days_ahead: i64) -> anyhow::Result<Forecast> {
            Ok(Forecast {
                date,
                max_temp: self.max_temp,
                confidence: crate::forecast::horizon_confidence(days_ahead),
                fetched_at: Utc::now(),
            })
        }

        async fn observed_max(&self, _date: chrono::NaiveDate) -> anyhow::Result<Option<f64>> {
            Ok(self.observed)
        }
    }

    struct NullStream;

    #[async_trait]
    impl PriceStream for NullStream {
        async fn subscribe(
            &self,
            _token_ids: Vec<String>,
        ) -> anyhow::Result<mpsc::Receiver<StreamEvent>> {
            let (_tx, rx) = mpsc::channel(8);
            Ok(rx)
        }

        async fn update_tokens(&self, _token_ids: Vec<String>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn test_config() -> Config {
        let toml = r#"
            [engine]
            bankroll = 1000.0

            [discovery]

            [forecast]
            api_key = "test"

            [edge]

            [risk]

            [execution]
            mode = "paper"

            [telemetry]
            metrics_port = 0
            log_level = "debug"
        "#;
        Config::from_toml(toml).unwrap()
    }

    fn market_with_target(days_from_today: i64) -> TemperatureMarket {
        let mut market = ladder();
        market.target_date = Utc::now().date_naive() + chrono::Duration::days(days_from_today);
        market
    }

    fn engine_with(
        markets: Vec<TemperatureMarket>,
        weather: FixedWeather,
    ) -> (Arc<Engine>, Arc<PaperExecution>) {
        let exec = Arc::new(PaperExecution::new(dec!(0.001)));
        let engine = Engine::new(
            test_config(),
            Arc::new(FixedDiscovery {
                markets: StdMutex::new(markets),
            }),
            Arc::new(weather),
            Arc::new(NullStream),
            exec.clone(),
        );
        (engine, exec)
    }

    #[tokio::test]
    async fn test_cycle_positions_on_edge() {
        let market = market_with_target(1);
        let (engine, _exec) = engine_with(
            vec![market],
            FixedWeather {
                max_temp: 62.0,
                observed: None,
            },
        );

        engine.run_cycle().await;

        // entries were placed and filled by the paper engine
        let snapshot = engine.metrics();
        assert!(snapshot.orders_placed > 0);
        let book = engine.book.lock().await;
        assert!(book.market_exposure("mkt-1") > Decimal::ZERO);
        assert!(book.position("mkt-1", "t-6162").is_some());
    }

    #[tokio::test]
    async fn test_cycle_skips_scanning_markets() {
        // target five days out is beyond the advance window of three
        let market = market_with_target(5);
        let (engine, _exec) = engine_with(
            vec![market],
            FixedWeather {
                max_temp: 62.0,
                observed: None,
            },
        );

        engine.run_cycle().await;

        assert_eq!(engine.metrics().orders_placed, 0);
        assert_eq!(
            engine.phase("mkt-1").await,
            Some(MarketPhase::Scanning)
        );
    }

    #[tokio::test]
    async fn test_burst_of_price_events_collapses() {
        let market = market_with_target(1);
        let (engine, _exec) = engine_with(
            vec![market],
            FixedWeather {
                max_temp: 62.0,
                observed: None,
            },
        );
        engine.run_cycle().await;

        // a burst for one token is processed serially per key
        for price in [dec!(0.21), dec!(0.22), dec!(0.23)] {
            engine
                .handle_event(MarketEvent::Price(crate::market::PriceUpdate {
                    token_id: "t-6162".to_string(),
                    price,
                    timestamp: Utc::now(),
                }))
                .await;
        }

        assert_eq!(engine.store.price_of("t-6162").await, Some(dec!(0.23)));
        assert!(engine.metrics().events_processed >= 3);
    }

    #[tokio::test]
    async fn test_unmapped_token_dropped() {
        let market = market_with_target(1);
        let (engine, _exec) = engine_with(
            vec![market],
            FixedWeather {
                max_temp: 62.0,
                observed: None,
            },
        );
        engine.run_cycle().await;
        let processed = engine.metrics().events_processed;

        engine
            .handle_event(MarketEvent::Price(crate::market::PriceUpdate {
                token_id: "no-such-token".to_string(),
                price: dec!(0.50),
                timestamp: Utc::now(),
            }))
            .await;

        assert_eq!(engine.metrics().events_processed, processed);
    }

    #[tokio::test]
    async fn test_day_of_correction_closes_wrong_bucket() {
        let market = market_with_target(0);
        let (engine, exec) = engine_with(
            vec![market],
            FixedWeather {
                max_temp: 62.0,
                observed: Some(65.5),
            },
        );
        engine.run_cycle().await;

        // seed a position in the 61-62 bucket via a direct fill
        {
            let mut book = engine.book.lock().await;
            book.apply_fill(&crate::execution::Fill {
                order_id: OrderId::new_v4(),
                market_id: "mkt-1".to_string(),
                token_id: "t-6162".to_string(),
                side: Side::Buy,
                price: dec!(0.20),
                shares: dec!(100),
                fees: dec!(0),
                timestamp: Utc::now(),
            });
        }

        // observed max 65.5 lands in the 65-66 bucket
        engine
            .handle_event(MarketEvent::Observation {
                market_id: "mkt-1".to_string(),
                observed_max: 65.5,
            })
            .await;

        let book = engine.book.lock().await;
        assert!(book.position("mkt-1", "t-6162").is_none());
        assert!(book.position("mkt-1", "t-6566").is_some());
        drop(book);
        let _ = exec;
    }

    #[tokio::test]
    async fn test_breaker_trip_halts_all_order_flow_for_the_day() {
        let market = market_with_target(1);
        let (engine, _exec) = engine_with(
            vec![market],
            FixedWeather {
                max_temp: 62.0,
                observed: None,
            },
        );
        engine.run_cycle().await;

        // force a realized loss past the 50 USDC daily limit
        {
            let mut book = engine.book.lock().await;
            for (side, price) in [(Side::Buy, dec!(0.90)), (Side::Sell, dec!(0.20))] {
                book.apply_fill(&crate::execution::Fill {
                    order_id: OrderId::new_v4(),
                    market_id: "mkt-1".to_string(),
                    token_id: "t-6566".to_string(),
                    side,
                    price,
                    shares: dec!(100),
                    fees: dec!(0),
                    timestamp: Utc::now(),
                });
            }
        }

        let placed = engine.metrics().orders_placed;
        engine.run_cycle().await;
        assert_eq!(engine.metrics().breaker_trips, 1);
        assert_eq!(engine.metrics().orders_placed, placed);

        // the reactive path is halted too
        engine
            .handle_event(MarketEvent::Price(crate::market::PriceUpdate {
                token_id: "t-6162".to_string(),
                price: dec!(0.10),
                timestamp: Utc::now(),
            }))
            .await;
        assert_eq!(engine.metrics().orders_placed, placed);

        // and so is the day-of correction
        engine
            .handle_event(MarketEvent::Observation {
                market_id: "mkt-1".to_string(),
                observed_max: 65.5,
            })
            .await;
        assert_eq!(engine.metrics().orders_placed, placed);
    }

    #[tokio::test]
    async fn test_quote_refresh_cancels_the_stale_pair() {
        let mut market = market_with_target(1);
        // primary priced at its adjusted probability: no taker entries
        market.outcomes[1].price = dec!(0.85);
        // sub-penny wing leaves the maker room for a passive ask
        market.outcomes[4].price = dec!(0.005);
        let (engine, exec) = engine_with(
            vec![market],
            FixedWeather {
                max_temp: 62.0,
                observed: None,
            },
        );

        engine.run_cycle().await;
        let first = engine.quotes.lock().await.clone();
        let resting: Vec<OrderId> = first
            .values()
            .flat_map(|open| [open.bid, open.ask])
            .flatten()
            .collect();
        assert!(!resting.is_empty());
        for id in &resting {
            assert_eq!(exec.status(*id).await.unwrap(), OrderStatus::Pending);
        }

        engine.run_cycle().await;
        let second = engine.quotes.lock().await.clone();
        for id in &resting {
            assert_eq!(exec.status(*id).await.unwrap(), OrderStatus::Cancelled);
        }
        // every quoted token was re-quoted, never left half-replaced
        for (token, open) in &first {
            let replacement = second.get(token).unwrap();
            assert_eq!(open.bid.is_some(), replacement.bid.is_some());
            assert_eq!(open.ask.is_some(), replacement.ask.is_some());
        }
    }

    struct SlowExec {
        in_flight: StdMutex<HashMap<String, u32>>,
        peak: StdMutex<HashMap<String, u32>>,
    }

    impl SlowExec {
        fn new() -> Self {
            Self {
                in_flight: StdMutex::new(HashMap::new()),
                peak: StdMutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl ExecutionClient for SlowExec {
        async fn submit(
            &self,
            order_id: OrderId,
            intent: &OrderIntent,
        ) -> anyhow::Result<OrderHandle> {
            {
                let mut in_flight = self.in_flight.lock().unwrap();
                let count = in_flight.entry(intent.token_id.clone()).or_insert(0);
                *count += 1;
                let mut peak = self.peak.lock().unwrap();
                let seen = peak.entry(intent.token_id.clone()).or_insert(0);
                *seen = (*seen).max(*count);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            *self
                .in_flight
                .lock()
                .unwrap()
                .get_mut(&intent.token_id)
                .unwrap() -= 1;
            Ok(OrderHandle::new(order_id, OrderStatus::Filled))
        }

        async fn cancel(&self, _order_id: OrderId) -> anyhow::Result<bool> {
            Ok(true)
        }

        async fn status(&self, _order_id: OrderId) -> anyhow::Result<OrderStatus> {
            Ok(OrderStatus::Filled)
        }

        async fn drain_fills(&self) -> anyhow::Result<Vec<crate::execution::Fill>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_cycle_and_price_event_never_overlap_on_a_token() {
        let market = market_with_target(1);
        let exec = Arc::new(SlowExec::new());
        let engine = Engine::new(
            test_config(),
            Arc::new(FixedDiscovery {
                markets: StdMutex::new(vec![market]),
            }),
            Arc::new(FixedWeather {
                max_temp: 62.0,
                observed: None,
            }),
            Arc::new(NullStream),
            exec.clone(),
        );

        tokio::join!(engine.run_cycle(), async {
            // land mid-cycle, once the store is populated
            tokio::time::sleep(Duration::from_millis(2)).await;
            engine
                .handle_event(MarketEvent::Price(crate::market::PriceUpdate {
                    token_id: "t-6162".to_string(),
                    price: dec!(0.21),
                    timestamp: Utc::now(),
                }))
                .await;
        });

        let peak = exec.peak.lock().unwrap();
        assert!(!peak.is_empty());
        assert!(peak.values().all(|seen| *seen <= 1));
    }
}
