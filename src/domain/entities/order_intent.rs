use crate::domain::entities::position::PositionSide;
use crate::domain::value_objects::{confidence::Confidence, price::Price, quantity::Quantity};

/// A fully specified, not-yet-submitted instruction to open a position.
///
/// Producing an intent has no side effects; submission belongs to the
/// orchestrator and the exchange collaborator behind it.
#[derive(Debug, Clone)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Quantity,
    pub leverage: f64,
    pub entry_price: Price,
    pub stop_loss_price: Price,
    pub take_profit_price: Price,
    pub confidence: Confidence,
}

impl OrderIntent {
    pub fn notional_value(&self) -> f64 {
        self.entry_price.value() * self.quantity.value()
    }

    pub fn required_margin(&self) -> f64 {
        self.notional_value() / self.leverage
    }
}

impl std::fmt::Display for OrderIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} qty {} @ {} lev {:.1}x sl {} tp {}",
            self.side,
            self.symbol,
            self.quantity,
            self.entry_price,
            self.leverage,
            self.stop_loss_price,
            self.take_profit_price
        )
    }
}
