//! Notifier trait.
//!
//! Outbound, fire-and-forget event reporting. A notifier failure must
//! never abort a decision cycle; callers log the error and move on.

use async_trait::async_trait;

use crate::domain::entities::order_intent::OrderIntent;
use crate::domain::entities::position::Position;
use crate::domain::errors::VetoReason;
use crate::domain::services::mode::Mode;

/// Everything the engine reports to the outside world.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    TradeOpened {
        position: Position,
        intent: OrderIntent,
    },
    TradeClosed {
        symbol: String,
        exit_price: f64,
        realized_pnl: f64,
    },
    Vetoed {
        symbol: String,
        reason: VetoReason,
    },
    /// Raised once the same instrument has failed several cycles in a
    /// row. Wholesale refresh failures report under the symbol `*`.
    CycleError {
        symbol: String,
        consecutive_failures: u32,
        message: String,
    },
    BalanceUpdate {
        balance: f64,
        mode: Mode,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: EngineEvent) -> Result<(), String>;
}
