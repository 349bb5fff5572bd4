//! In-memory venue simulation.
//!
//! Fills every order at the latest close, tracks protective levels
//! against subsequent candles, and settles realized PnL into the
//! simulated balance. Used by the binary's paper mode and by the
//! end-to-end tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::domain::entities::order_intent::OrderIntent;
use crate::domain::entities::position::Position;
use crate::domain::repositories::exchange_client::{
    ExchangeClient, ExchangeError, ExchangeResult, OrderOutcome, TriggeredExit,
};
use crate::domain::services::indicators::Candle;
use crate::domain::value_objects::price::Price;

struct PaperState {
    balance: f64,
    histories: HashMap<String, Vec<Candle>>,
    positions: HashMap<String, Position>,
    pending_exits: Vec<TriggeredExit>,
}

pub struct PaperExchange {
    state: Mutex<PaperState>,
}

impl PaperExchange {
    pub fn new(initial_balance: f64) -> Self {
        PaperExchange {
            state: Mutex::new(PaperState {
                balance: initial_balance,
                histories: HashMap::new(),
                positions: HashMap::new(),
                pending_exits: Vec::new(),
            }),
        }
    }

    /// Replace the scripted candle history for one instrument.
    pub fn load_history(&self, symbol: &str, candles: Vec<Candle>) {
        let mut state = self.state.lock().unwrap();
        state.histories.insert(symbol.to_string(), candles);
    }

    /// Append one candle and check open positions against it. A candle
    /// whose range crosses a stop-loss or take-profit retires the
    /// position at that level and settles the PnL.
    pub fn push_candle(&self, symbol: &str, candle: Candle) {
        let mut state = self.state.lock().unwrap();

        let exit = state.positions.get(symbol).and_then(|position| {
            if position.stop_loss_hit(candle.low) || position.stop_loss_hit(candle.high) {
                Some(position.stop_loss_price)
            } else if position.take_profit_hit(candle.high)
                || position.take_profit_hit(candle.low)
            {
                Some(position.take_profit_price)
            } else {
                None
            }
        });

        if let Some(exit_price) = exit {
            if let Some(position) = state.positions.remove(symbol) {
                let realized_pnl = position.unrealized_pnl(exit_price);
                state.balance += realized_pnl;
                debug!(symbol = %symbol, exit_price = exit_price.value(), realized_pnl, "paper exit");
                state.pending_exits.push(TriggeredExit {
                    symbol: symbol.to_string(),
                    exit_price: exit_price.value(),
                    realized_pnl,
                });
            }
        }

        state
            .histories
            .entry(symbol.to_string())
            .or_default()
            .push(candle);
    }

    fn last_close(state: &PaperState, symbol: &str) -> Option<Price> {
        state
            .histories
            .get(symbol)
            .and_then(|candles| candles.last())
            .map(|candle| candle.close)
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    fn name(&self) -> &str {
        "paper"
    }

    async fn get_balance(&self) -> ExchangeResult<f64> {
        Ok(self.state.lock().unwrap().balance)
    }

    async fn get_open_positions(&self) -> ExchangeResult<Vec<Position>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .positions
            .values()
            .cloned()
            .collect())
    }

    async fn get_price_history(&self, symbol: &str, limit: usize) -> ExchangeResult<Vec<Candle>> {
        let state = self.state.lock().unwrap();
        let candles = state.histories.get(symbol).cloned().unwrap_or_default();
        let start = candles.len().saturating_sub(limit);
        Ok(candles[start..].to_vec())
    }

    async fn place_order(&self, intent: &OrderIntent) -> ExchangeResult<OrderOutcome> {
        let mut state = self.state.lock().unwrap();

        if state.positions.contains_key(&intent.symbol) {
            return Ok(OrderOutcome::Rejected {
                reason: "position already open".to_string(),
            });
        }
        if intent.required_margin() > state.balance {
            return Ok(OrderOutcome::Rejected {
                reason: "insufficient margin".to_string(),
            });
        }

        let fill_price = Self::last_close(&state, &intent.symbol).unwrap_or(intent.entry_price);
        let position = Position::new(
            intent.symbol.clone(),
            intent.side,
            fill_price,
            intent.quantity,
            intent.leverage,
            intent.stop_loss_price,
            intent.take_profit_price,
            Utc::now(),
        )
        .map_err(ExchangeError::OrderPlacementFailed)?;

        state.positions.insert(intent.symbol.clone(), position);
        Ok(OrderOutcome::Filled {
            fill_price: fill_price.value(),
        })
    }

    async fn close_position(&self, symbol: &str) -> ExchangeResult<()> {
        let mut state = self.state.lock().unwrap();
        let position = state
            .positions
            .remove(symbol)
            .ok_or_else(|| ExchangeError::CloseFailed {
                symbol: symbol.to_string(),
                message: "no open position".to_string(),
            })?;
        if let Some(price) = Self::last_close(&state, symbol) {
            state.balance += position.unrealized_pnl(price);
        }
        Ok(())
    }

    async fn triggered_exits(&self) -> ExchangeResult<Vec<TriggeredExit>> {
        Ok(std::mem::take(
            &mut self.state.lock().unwrap().pending_exits,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::position::PositionSide;
    use crate::domain::value_objects::{confidence::Confidence, quantity::Quantity};
    use chrono::{Duration, Utc};

    fn candle(close: f64) -> Candle {
        Candle::new(close, close + 0.5, close - 0.5, close, 1000.0, Utc::now()).unwrap()
    }

    fn intent(symbol: &str) -> OrderIntent {
        OrderIntent {
            symbol: symbol.to_string(),
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
    async fn test_fill_at_last_close() {
        let exchange = PaperExchange::new(100.0);
        exchange.load_history("BTCUSDT", vec![candle(100.0), candle(101.0)]);

        let outcome = exchange.place_order(&intent("BTCUSDT")).await.unwrap();
        match outcome {
            OrderOutcome::Filled { fill_price } => assert_eq!(fill_price, 101.0),
            other => panic!("expected fill, got {:?}", other),
        }
        assert_eq!(exchange.get_open_positions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_duplicate_and_oversized() {
        let exchange = PaperExchange::new(100.0);
        exchange.load_history("BTCUSDT", vec![candle(100.0)]);
        exchange.place_order(&intent("BTCUSDT")).await.unwrap();

        let dup = exchange.place_order(&intent("BTCUSDT")).await.unwrap();
        assert!(matches!(dup, OrderOutcome::Rejected { .. }));

        let poor = PaperExchange::new(1.0);
        poor.load_history("ETHUSDT", vec![candle(100.0)]);
        let outcome = poor.place_order(&intent("ETHUSDT")).await.unwrap();
        assert!(matches!(outcome, OrderOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_take_profit_candle_settles_position() {
        let exchange = PaperExchange::new(100.0);
        exchange.load_history("BTCUSDT", vec![candle(100.0)]);
        exchange.place_order(&intent("BTCUSDT")).await.unwrap();

        // High of 107 crosses the 106 take-profit.
        let trigger = Candle::new(
            105.0,
            107.0,
            104.0,
            106.5,
            1000.0,
            Utc::now() + Duration::minutes(1),
        )
        .unwrap();
        exchange.push_candle("BTCUSDT", trigger);

        let exits = exchange.triggered_exits().await.unwrap();
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].exit_price, 106.0);
        assert!((exits[0].realized_pnl - 0.6).abs() < 1e-9);
        assert!(exchange.get_open_positions().await.unwrap().is_empty());
        // PnL settled into the balance.
        assert!((exchange.get_balance().await.unwrap() - 100.6).abs() < 1e-9);
        // Exits are reported once.
        assert!(exchange.triggered_exits().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manual_close_settles_at_last_price() {
        let exchange = PaperExchange::new(100.0);
        exchange.load_history("BTCUSDT", vec![candle(100.0)]);
        exchange.place_order(&intent("BTCUSDT")).await.unwrap();
        exchange.push_candle("BTCUSDT", candle(102.0));

        exchange.close_position("BTCUSDT").await.unwrap();
        assert!((exchange.get_balance().await.unwrap() - 100.2).abs() < 1e-9);
    }
}
