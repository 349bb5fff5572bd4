//! Decision scheduler.
//!
//! Drives the periodic decision cycle: refresh account state, fetch
//! market data for every instrument in parallel, then evaluate
//! instruments one at a time so each decision sees the positions the
//! previous one opened.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::domain::entities::account::AccountState;
use crate::domain::entities::instrument::Instrument;
use crate::domain::errors::EngineError;
use crate::domain::repositories::exchange_client::{ExchangeClient, ExchangeError};
use crate::domain::repositories::notifier::{EngineEvent, Notifier};
use crate::domain::services::indicator_engine::{IndicatorEngine, Readiness};
use crate::domain::services::market_window::MarketWindow;
use crate::domain::services::mode::ModeTable;
use crate::domain::services::orchestrator::PositionOrchestrator;
use crate::domain::services::risk_sizer::RiskSizer;
use crate::domain::services::signal_scorer::SignalScorer;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    /// Consecutive transient failures tolerated for one instrument
    /// (or for the wholesale account refresh) before a CycleError
    /// event fires.
    pub max_consecutive_failures: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            poll_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
            max_consecutive_failures: 3,
        }
    }
}

pub struct DecisionScheduler {
    exchange: Arc<dyn ExchangeClient>,
    notifier: Arc<dyn Notifier>,
    orchestrator: PositionOrchestrator,
    indicator_engine: IndicatorEngine,
    scorer: SignalScorer,
    sizer: RiskSizer,
    mode_table: ModeTable,
    instruments: Vec<Instrument>,
    window: MarketWindow,
    config: SchedulerConfig,
    consecutive_failures: u32,
    instrument_failures: HashMap<String, u32>,
}

impl DecisionScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        notifier: Arc<dyn Notifier>,
        orchestrator: PositionOrchestrator,
        indicator_engine: IndicatorEngine,
        scorer: SignalScorer,
        sizer: RiskSizer,
        mode_table: ModeTable,
        instruments: Vec<Instrument>,
        window: MarketWindow,
        config: SchedulerConfig,
    ) -> Self {
        DecisionScheduler {
            exchange,
            notifier,
            orchestrator,
            indicator_engine,
            scorer,
            sizer,
            mode_table,
            instruments,
            window,
            config,
            consecutive_failures: 0,
            instrument_failures: HashMap::new(),
        }
    }

    /// Run cycles until the shutdown signal flips.
    ///
    /// Shutdown is only honored between cycles; a cycle in flight
    /// completes so the book is never left with an unresolved
    /// submission.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            exchange = self.exchange.name(),
            instruments = self.instruments.len(),
            interval_secs = self.config.poll_interval.as_secs(),
            "decision scheduler started"
        );
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("shutdown requested, stopping scheduler");
                        break;
                    }
                }
            }
        }
    }

    /// One full decision cycle. Per-instrument problems are contained
    /// and tracked against that instrument's own failure streak; only
    /// wholesale failures (balance or position refresh) count toward
    /// the cycle-level streak.
    pub async fn run_cycle(&mut self) {
        match self.cycle_inner().await {
            Ok(()) => {
                self.consecutive_failures = 0;
            }
            Err(err) => {
                self.consecutive_failures += 1;
                error!(
                    failures = self.consecutive_failures,
                    error = %err,
                    "decision cycle failed"
                );
                if self.consecutive_failures >= self.config.max_consecutive_failures {
                    self.emit(EngineEvent::CycleError {
                        symbol: "*".to_string(),
                        consecutive_failures: self.consecutive_failures,
                        message: err.to_string(),
                    })
                    .await;
                }
            }
        }
    }

    async fn cycle_inner(&mut self) -> Result<(), EngineError> {
        self.orchestrator.reap_exits().await?;

        let balance = self
            .exchange
            .get_balance()
            .await
            .map_err(|source| EngineError::Transient {
                symbol: "*".to_string(),
                source,
            })?;
        let venue_positions =
            self.exchange
                .get_open_positions()
                .await
                .map_err(|source| EngineError::Transient {
                    symbol: "*".to_string(),
                    source,
                })?;
        self.orchestrator.reconcile(venue_positions);

        let (mode, _) = self.mode_table.select(balance);
        debug!(balance, mode = %mode, "account refreshed");
        self.emit(EngineEvent::BalanceUpdate { balance, mode }).await;

        let fetch_failures = self.refresh_market_data().await;
        self.evaluate_instruments(balance, &fetch_failures).await;
        Ok(())
    }

    /// Fetch candle history for all instruments concurrently, each
    /// bounded by the fetch timeout. A failed or slow fetch leaves that
    /// instrument's window stale and sits it out this cycle; the
    /// failure is returned so the evaluation pass can count it against
    /// the instrument's streak.
    async fn refresh_market_data(&mut self) -> HashMap<String, String> {
        let limit = self.window.retention().max(self.indicator_engine.min_lookback());
        let fetch_timeout = self.config.fetch_timeout;
        let fetches: Vec<_> = self
            .instruments
            .iter()
            .map(|instrument| {
                let exchange = Arc::clone(&self.exchange);
                let symbol = instrument.symbol.clone();
                async move {
                    let result = tokio::time::timeout(
                        fetch_timeout,
                        exchange.get_price_history(&symbol, limit),
                    )
                    .await;
                    let flattened = match result {
                        Ok(inner) => inner,
                        Err(_) => {
                            Err(ExchangeError::Timeout(fetch_timeout.as_millis() as u64))
                        }
                    };
                    (symbol, flattened)
                }
            })
            .collect();

        let results = join_all(fetches).await;
        let mut failed = HashMap::new();
        for (symbol, result) in results {
            match result {
                Ok(history) if history.is_empty() => {
                    debug!(symbol = %symbol, "venue returned no candles");
                }
                Ok(history) => {
                    self.window.replace(&symbol, history);
                }
                Err(err) => {
                    warn!(symbol = %symbol, error = %err, "market data fetch failed, window stale");
                    failed.insert(symbol, err.to_string());
                }
            }
        }
        failed
    }

    /// Evaluate instruments in configuration order. Serial on purpose:
    /// the second decision must see the position the first one opened,
    /// or the per-mode cap could be breached within a single cycle.
    async fn evaluate_instruments(&mut self, balance: f64, fetch_failures: &HashMap<String, String>) {
        let instruments = self.instruments.clone();
        for instrument in &instruments {
            let symbol = instrument.symbol.clone();
            if let Some(message) = fetch_failures.get(&symbol) {
                self.note_instrument_failure(&symbol, message.clone()).await;
                continue;
            }
            match self.evaluate_one(instrument, balance).await {
                Ok(()) => {
                    self.instrument_failures.remove(&symbol);
                }
                Err(err) => {
                    warn!(symbol = %symbol, error = %err, "instrument skipped this cycle");
                    self.note_instrument_failure(&symbol, err.to_string()).await;
                }
            }
        }
    }

    /// Extend the instrument's failure streak and raise a CycleError
    /// once it reaches the configured threshold. The streak keeps
    /// counting so the alert repeats on every further failed cycle.
    async fn note_instrument_failure(&mut self, symbol: &str, message: String) {
        let streak = self.instrument_failures.entry(symbol.to_string()).or_insert(0);
        *streak += 1;
        let streak = *streak;
        if streak >= self.config.max_consecutive_failures {
            self.emit(EngineEvent::CycleError {
                symbol: symbol.to_string(),
                consecutive_failures: streak,
                message,
            })
            .await;
        }
    }

    async fn evaluate_one(
        &mut self,
        instrument: &Instrument,
        balance: f64,
    ) -> Result<(), EngineError> {
        let symbol = instrument.symbol.as_str();
        let candles = self.window.candles(symbol);
        let snapshot = match self.indicator_engine.compute(candles) {
            Readiness::Ready(snapshot) => snapshot,
            Readiness::NotReady(reason) => {
                debug!(symbol = %symbol, %reason, "indicators not ready");
                return Ok(());
            }
        };

        let signal = self.scorer.score(symbol, &snapshot);
        if !signal.is_actionable() {
            debug!(
                symbol = %symbol,
                confidence = signal.confidence.value(),
                "no directional signal"
            );
            return Ok(());
        }

        // Rebuilt per instrument: earlier submissions in this same
        // cycle must count against the cap and the heat limit.
        let account = AccountState {
            available_balance: balance,
            equity: balance,
            open_positions: self.orchestrator.open_positions(),
        };
        let (_, params) = self.mode_table.select(balance);

        match self.sizer.size(&signal, params, &account, instrument) {
            Ok(intent) => {
                info!(
                    symbol = %symbol,
                    direction = %signal.direction,
                    confidence = signal.confidence.value(),
                    leverage = intent.leverage,
                    "submitting order intent"
                );
                self.orchestrator.submit(intent).await
            }
            Err(reason) => {
                info!(symbol = %symbol, veto = reason.tag(), %reason, "signal vetoed");
                self.emit(EngineEvent::Vetoed {
                    symbol: symbol.to_string(),
                    reason,
                })
                .await;
                Ok(())
            }
        }
    }

    async fn emit(&self, event: EngineEvent) {
        if let Err(message) = self.notifier.notify(event).await {
            warn!(%message, "notifier failed, continuing");
        }
    }
}
