//! Notifier backed by the tracing subscriber.
//!
//! The default reporting sink: every engine event becomes one
//! structured log line. It never fails, which also makes it the
//! quietest possible stand-in when no external channel is configured.

use async_trait::async_trait;
use tracing::{error, info};

use crate::domain::repositories::notifier::{EngineEvent, Notifier};

#[derive(Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        LogNotifier
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: EngineEvent) -> Result<(), String> {
        match event {
            EngineEvent::TradeOpened { position, intent } => {
                info!(
                    symbol = %position.symbol,
                    side = %position.side,
                    entry = position.entry_price.value(),
                    quantity = position.quantity.value(),
                    leverage = position.leverage,
                    confidence = intent.confidence.value(),
                    "trade opened"
                );
            }
            EngineEvent::TradeClosed {
                symbol,
                exit_price,
                realized_pnl,
            } => {
                info!(symbol = %symbol, exit_price, realized_pnl, "trade closed");
            }
            EngineEvent::Vetoed { symbol, reason } => {
                info!(symbol = %symbol, veto = reason.tag(), %reason, "trade vetoed");
            }
            EngineEvent::CycleError {
                symbol,
                consecutive_failures,
                message,
            } => {
                error!(symbol = %symbol, consecutive_failures, %message, "decision cycles failing");
            }
            EngineEvent::BalanceUpdate { balance, mode } => {
                info!(balance, mode = %mode, "balance refreshed");
            }
        }
        Ok(())
    }
}
