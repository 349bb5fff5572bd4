//! Exchange client trait.
//!
//! Common interface for every venue implementation. The decision
//! pipeline only ever talks to this trait, so the paper exchange used
//! in tests and a live connector are interchangeable.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::order_intent::OrderIntent;
use crate::domain::entities::position::Position;
use crate::domain::services::indicators::Candle;

pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Errors that can occur during exchange operations. All variants are
/// transient from the scheduler's point of view: they fail one
/// instrument for one cycle and are retried next cycle.
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    #[error("order placement failed: {0}")]
    OrderPlacementFailed(String),

    #[error("balance query failed: {0}")]
    BalanceQueryFailed(String),

    #[error("market data query failed for {symbol}: {message}")]
    MarketDataFailed { symbol: String, message: String },

    #[error("position close failed for {symbol}: {message}")]
    CloseFailed { symbol: String, message: String },

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("request timed out after {0} ms")]
    Timeout(u64),
}

/// Terminal result of an order submission. There is no partial-fill
/// state at this level: the venue either opened the position at a fill
/// price or declined it.
#[derive(Debug, Clone)]
pub enum OrderOutcome {
    Filled { fill_price: f64 },
    Rejected { reason: String },
}

/// A protective exit the venue has triggered since the last poll.
#[derive(Debug, Clone)]
pub struct TriggeredExit {
    pub symbol: String,
    pub exit_price: f64,
    pub realized_pnl: f64,
}

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Venue name for logs.
    fn name(&self) -> &str;

    /// Available balance in quote currency.
    async fn get_balance(&self) -> ExchangeResult<f64>;

    /// Positions currently open at the venue.
    async fn get_open_positions(&self) -> ExchangeResult<Vec<Position>>;

    /// The most recent `limit` closed candles for one instrument,
    /// oldest first.
    async fn get_price_history(&self, symbol: &str, limit: usize) -> ExchangeResult<Vec<Candle>>;

    /// Submit an entry order together with its protective levels.
    async fn place_order(&self, intent: &OrderIntent) -> ExchangeResult<OrderOutcome>;

    /// Close an open position at market.
    async fn close_position(&self, symbol: &str) -> ExchangeResult<()>;

    /// Exits the venue triggered on its own (stop-loss or take-profit)
    /// since the previous call. Consuming: each exit is reported once.
    async fn triggered_exits(&self) -> ExchangeResult<Vec<TriggeredExit>>;
}
