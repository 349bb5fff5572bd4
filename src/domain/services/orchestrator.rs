//! Position orchestrator.
//!
//! Sole writer of the open position book. Every entry and exit flows
//! through here, so an instrument can never hold two positions and a
//! veto elsewhere can never be overridden by a stale submission.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::entities::order_intent::OrderIntent;
use crate::domain::entities::position::Position;
use crate::domain::errors::EngineError;
use crate::domain::repositories::exchange_client::{ExchangeClient, ExchangeError, OrderOutcome};
use crate::domain::repositories::notifier::{EngineEvent, Notifier};
use crate::domain::value_objects::price::Price;

/// Lifecycle of one instrument's exposure.
///
/// Flat is represented by absence from the book. Pending exists only
/// for the duration of a submission await; no decision logic ever
/// observes it across cycles.
#[derive(Debug, Clone)]
enum PositionState {
    Pending,
    Open(Position),
}

pub struct PositionOrchestrator {
    exchange: Arc<dyn ExchangeClient>,
    notifier: Arc<dyn Notifier>,
    book: HashMap<String, PositionState>,
    submit_timeout: Duration,
}

impl PositionOrchestrator {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        notifier: Arc<dyn Notifier>,
        submit_timeout: Duration,
    ) -> Self {
        PositionOrchestrator {
            exchange,
            notifier,
            book: HashMap::new(),
            submit_timeout,
        }
    }

    /// Open positions, keyed by symbol. Pending submissions are not
    /// positions and are excluded.
    pub fn open_positions(&self) -> HashMap<String, Position> {
        self.book
            .iter()
            .filter_map(|(symbol, state)| match state {
                PositionState::Open(position) => Some((symbol.clone(), position.clone())),
                PositionState::Pending => None,
            })
            .collect()
    }

    pub fn has_exposure(&self, symbol: &str) -> bool {
        self.book.contains_key(symbol)
    }

    /// Adopt the venue's view of open positions.
    ///
    /// Called at cycle start so positions closed out-of-band (manual
    /// intervention, liquidation) disappear from the book before any
    /// decision reads it. Pending entries are preserved untouched.
    pub fn reconcile(&mut self, venue_positions: Vec<Position>) {
        let venue: HashMap<String, Position> = venue_positions
            .into_iter()
            .map(|p| (p.symbol.clone(), p))
            .collect();

        self.book.retain(|symbol, state| match state {
            PositionState::Pending => true,
            PositionState::Open(_) => {
                let still_open = venue.contains_key(symbol);
                if !still_open {
                    info!(symbol = %symbol, "position no longer open at venue, dropping");
                }
                still_open
            }
        });

        for (symbol, position) in venue {
            self.book
                .entry(symbol)
                .or_insert(PositionState::Open(position));
        }
    }

    /// Submit an entry order and track it to a terminal state.
    ///
    /// The instrument is marked pending for the duration of the await;
    /// a fill promotes it to open at the venue's fill price, while a
    /// rejection or timeout returns it to flat.
    pub async fn submit(&mut self, intent: OrderIntent) -> Result<(), EngineError> {
        let symbol = intent.symbol.clone();
        if self.book.contains_key(&symbol) {
            warn!(symbol = %symbol, "refusing to submit over existing exposure");
            return Ok(());
        }

        self.book.insert(symbol.clone(), PositionState::Pending);

        let outcome =
            tokio::time::timeout(self.submit_timeout, self.exchange.place_order(&intent)).await;

        match outcome {
            Ok(Ok(OrderOutcome::Filled { fill_price })) => {
                match self.position_from_fill(&intent, fill_price) {
                    Ok(position) => {
                        info!(
                            symbol = %symbol,
                            side = %position.side,
                            fill_price,
                            leverage = position.leverage,
                            "position opened"
                        );
                        self.book
                            .insert(symbol.clone(), PositionState::Open(position.clone()));
                        self.emit(EngineEvent::TradeOpened { position, intent }).await;
                        Ok(())
                    }
                    Err(message) => {
                        // Fill so far from the intent that the stops no
                        // longer bracket it. Unwind rather than hold an
                        // unprotected position.
                        warn!(symbol = %symbol, fill_price, %message, "unprotectable fill, closing");
                        self.book.remove(&symbol);
                        self.exchange
                            .close_position(&symbol)
                            .await
                            .map_err(|source| EngineError::Transient {
                                symbol: symbol.clone(),
                                source,
                            })?;
                        Ok(())
                    }
                }
            }
            Ok(Ok(OrderOutcome::Rejected { reason })) => {
                info!(symbol = %symbol, %reason, "order rejected by venue");
                self.book.remove(&symbol);
                Ok(())
            }
            Ok(Err(source)) => {
                self.book.remove(&symbol);
                Err(EngineError::Transient { symbol, source })
            }
            Err(_) => {
                self.book.remove(&symbol);
                let millis = self.submit_timeout.as_millis() as u64;
                Err(EngineError::Transient {
                    symbol,
                    source: ExchangeError::Timeout(millis),
                })
            }
        }
    }

    /// Collect exits the venue triggered on its own and retire them
    /// from the book.
    pub async fn reap_exits(&mut self) -> Result<(), EngineError> {
        let exits = self
            .exchange
            .triggered_exits()
            .await
            .map_err(|source| EngineError::Transient {
                symbol: "*".to_string(),
                source,
            })?;

        for exit in exits {
            if self.book.remove(&exit.symbol).is_some() {
                info!(
                    symbol = %exit.symbol,
                    exit_price = exit.exit_price,
                    realized_pnl = exit.realized_pnl,
                    "protective exit triggered"
                );
            } else {
                warn!(symbol = %exit.symbol, "venue reported exit for untracked position");
            }
            self.emit(EngineEvent::TradeClosed {
                symbol: exit.symbol,
                exit_price: exit.exit_price,
                realized_pnl: exit.realized_pnl,
            })
            .await;
        }
        Ok(())
    }

    /// Close one position at market, by decision rather than by stop.
    pub async fn close(&mut self, symbol: &str, exit_price: f64) -> Result<(), EngineError> {
        let state = self.book.remove(symbol);
        let Some(PositionState::Open(position)) = state else {
            warn!(symbol = %symbol, "close requested for instrument without an open position");
            return Ok(());
        };

        self.exchange
            .close_position(symbol)
            .await
            .map_err(|source| EngineError::Transient {
                symbol: symbol.to_string(),
                source,
            })?;

        let realized_pnl = match Price::new(exit_price) {
            Ok(price) => position.unrealized_pnl(price),
            Err(_) => 0.0,
        };
        info!(symbol = %symbol, exit_price, realized_pnl, "position closed");
        self.emit(EngineEvent::TradeClosed {
            symbol: symbol.to_string(),
            exit_price,
            realized_pnl,
        })
        .await;
        Ok(())
    }

    /// Rebuild the position entity around the actual fill price,
    /// keeping the intent's relative stop distances.
    fn position_from_fill(&self, intent: &OrderIntent, fill_price: f64) -> Result<Position, String> {
        let entry = Price::new(fill_price)?;
        let stop_ratio = intent.stop_loss_price.value() / intent.entry_price.value();
        let tp_ratio = intent.take_profit_price.value() / intent.entry_price.value();
        let stop = Price::new(fill_price * stop_ratio)?;
        let take_profit = Price::new(fill_price * tp_ratio)?;
        Position::new(
            intent.symbol.clone(),
            intent.side,
            entry,
            intent.quantity,
            intent.leverage,
            stop,
            take_profit,
            Utc::now(),
        )
    }

    /// Notification failures are logged and swallowed; reporting never
    /// blocks trading.
    async fn emit(&self, event: EngineEvent) {
        if let Err(message) = self.notifier.notify(event).await {
            warn!(%message, "notifier failed, continuing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::position::PositionSide;
    use crate::domain::repositories::exchange_client::{ExchangeResult, TriggeredExit};
    use crate::domain::services::indicators::Candle;
    use crate::domain::value_objects::{confidence::Confidence, quantity::Quantity};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedExchange {
        outcome: Mutex<Option<ExchangeResult<OrderOutcome>>>,
        exits: Mutex<Vec<TriggeredExit>>,
        closed: Mutex<Vec<String>>,
    }

    impl ScriptedExchange {
        fn filling_at(price: f64) -> Self {
            ScriptedExchange {
                outcome: Mutex::new(Some(Ok(OrderOutcome::Filled { fill_price: price }))),
                exits: Mutex::new(Vec::new()),
                closed: Mutex::new(Vec::new()),
            }
        }

        fn rejecting(reason: &str) -> Self {
            ScriptedExchange {
                outcome: Mutex::new(Some(Ok(OrderOutcome::Rejected {
                    reason: reason.to_string(),
                }))),
                exits: Mutex::new(Vec::new()),
                closed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExchangeClient for ScriptedExchange {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn get_balance(&self) -> ExchangeResult<f64> {
            Ok(100.0)
        }

        async fn get_open_positions(&self) -> ExchangeResult<Vec<Position>> {
            Ok(Vec::new())
        }

        async fn get_price_history(
            &self,
            _symbol: &str,
            _limit: usize,
        ) -> ExchangeResult<Vec<Candle>> {
            Ok(Vec::new())
        }

        async fn place_order(&self, _intent: &OrderIntent) -> ExchangeResult<OrderOutcome> {
            self.outcome
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Ok(OrderOutcome::Rejected {
                    reason: "no scripted outcome".to_string(),
                }))
        }

        async fn close_position(&self, symbol: &str) -> ExchangeResult<()> {
            self.closed.lock().unwrap().push(symbol.to_string());
            Ok(())
        }

        async fn triggered_exits(&self) -> ExchangeResult<Vec<TriggeredExit>> {
            Ok(std::mem::take(&mut *self.exits.lock().unwrap()))
        }
    }

    struct RecordingNotifier {
        events: Mutex<Vec<EngineEvent>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn new() -> Self {
            RecordingNotifier {
                events: Mutex::new(Vec::new()),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, event: EngineEvent) -> Result<(), String> {
            self.events.lock().unwrap().push(event);
            if self.fail {
                Err("notifier down".to_string())
            } else {
                Ok(())
            }
        }
    }

    fn intent() -> OrderIntent {
        OrderIntent {
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Long,
            quantity: Quantity::new(0.1).unwrap(),
            leverage: 2.0,
            entry_price: Price::new(100.0).unwrap(),
            stop_loss_price: Price::new(97.0).unwrap(),
            take_profit_price: Price::new(106.0).unwrap(),
            confidence: Confidence::new(0.8).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_fill_opens_position_and_notifies() {
        let exchange = Arc::new(ScriptedExchange::filling_at(100.5));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut orchestrator = PositionOrchestrator::new(
            exchange,
            notifier.clone(),
            Duration::from_secs(1),
        );

        orchestrator.submit(intent()).await.unwrap();

        let positions = orchestrator.open_positions();
        assert_eq!(positions.len(), 1);
        let position = &positions["BTCUSDT"];
        assert_eq!(position.entry_price.value(), 100.5);
        // Stops track the fill, preserving the intent's distances.
        assert!((position.stop_loss_price.value() - 100.5 * 0.97).abs() < 1e-9);

        let events = notifier.events.lock().unwrap();
        assert!(matches!(events[0], EngineEvent::TradeOpened { .. }));
    }

    #[tokio::test]
    async fn test_rejection_returns_to_flat() {
        let exchange = Arc::new(ScriptedExchange::rejecting("insufficient margin"));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut orchestrator = PositionOrchestrator::new(
            exchange,
            notifier,
            Duration::from_secs(1),
        );

        orchestrator.submit(intent()).await.unwrap();
        assert!(orchestrator.open_positions().is_empty());
        assert!(!orchestrator.has_exposure("BTCUSDT"));
    }

    #[tokio::test]
    async fn test_duplicate_submission_is_refused() {
        let exchange = Arc::new(ScriptedExchange::filling_at(100.0));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut orchestrator = PositionOrchestrator::new(
            exchange,
            notifier.clone(),
            Duration::from_secs(1),
        );

        orchestrator.submit(intent()).await.unwrap();
        orchestrator.submit(intent()).await.unwrap();

        assert_eq!(orchestrator.open_positions().len(), 1);
        let events = notifier.events.lock().unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_triggered_exit_retires_position() {
        let exchange = Arc::new(ScriptedExchange::filling_at(100.0));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut orchestrator = PositionOrchestrator::new(
            exchange.clone(),
            notifier.clone(),
            Duration::from_secs(1),
        );

        orchestrator.submit(intent()).await.unwrap();
        exchange.exits.lock().unwrap().push(TriggeredExit {
            symbol: "BTCUSDT".to_string(),
            exit_price: 106.0,
            realized_pnl: 0.6,
        });

        orchestrator.reap_exits().await.unwrap();
        assert!(orchestrator.open_positions().is_empty());

        let events = notifier.events.lock().unwrap();
        assert!(matches!(
            events.last(),
            Some(EngineEvent::TradeClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_abort() {
        let exchange = Arc::new(ScriptedExchange::filling_at(100.0));
        let mut notifier = RecordingNotifier::new();
        notifier.fail = true;
        let mut orchestrator = PositionOrchestrator::new(
            exchange,
            Arc::new(notifier),
            Duration::from_secs(1),
        );

        orchestrator.submit(intent()).await.unwrap();
        assert_eq!(orchestrator.open_positions().len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_drops_externally_closed_positions() {
        let exchange = Arc::new(ScriptedExchange::filling_at(100.0));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut orchestrator = PositionOrchestrator::new(
            exchange,
            notifier,
            Duration::from_secs(1),
        );

        orchestrator.submit(intent()).await.unwrap();
        assert!(orchestrator.has_exposure("BTCUSDT"));

        // Venue reports nothing open: position was liquidated or
        // closed manually.
        orchestrator.reconcile(Vec::new());
        assert!(!orchestrator.has_exposure("BTCUSDT"));
    }

    #[tokio::test]
    async fn test_explicit_close_reports_pnl() {
        let exchange = Arc::new(ScriptedExchange::filling_at(100.0));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut orchestrator = PositionOrchestrator::new(
            exchange.clone(),
            notifier.clone(),
            Duration::from_secs(1),
        );

        orchestrator.submit(intent()).await.unwrap();
        orchestrator.close("BTCUSDT", 105.0).await.unwrap();

        assert!(orchestrator.open_positions().is_empty());
        assert_eq!(exchange.closed.lock().unwrap().as_slice(), ["BTCUSDT"]);
        let events = notifier.events.lock().unwrap();
        match events.last() {
            Some(EngineEvent::TradeClosed { realized_pnl, .. }) => {
                assert!((realized_pnl - 0.5).abs() < 1e-9);
            }
            other => panic!("expected TradeClosed, got {:?}", other),
        }
    }
}
