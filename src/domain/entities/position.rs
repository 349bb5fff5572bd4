use crate::domain::value_objects::{price::Price, quantity::Quantity};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn opposite(&self) -> PositionSide {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

/// An open leveraged position.
///
/// A position is only constructed with both protective levels in place;
/// there is no way to represent a live position without a stop-loss and
/// a take-profit.
#[derive(Debug, Clone)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Price,
    pub quantity: Quantity,
    pub leverage: f64,
    pub stop_loss_price: Price,
    pub take_profit_price: Price,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        side: PositionSide,
        entry_price: Price,
        quantity: Quantity,
        leverage: f64,
        stop_loss_price: Price,
        take_profit_price: Price,
        opened_at: DateTime<Utc>,
    ) -> Result<Self, String> {
        if leverage < 1.0 || !leverage.is_finite() {
            return Err("Leverage must be at least 1x".to_string());
        }
        if quantity.is_zero() {
            return Err("Position quantity must be positive".to_string());
        }
        // Stops must sit on the correct side of entry for the direction.
        let (stop_ok, tp_ok) = match side {
            PositionSide::Long => (
                stop_loss_price < entry_price,
                take_profit_price > entry_price,
            ),
            PositionSide::Short => (
                stop_loss_price > entry_price,
                take_profit_price < entry_price,
            ),
        };
        if !stop_ok {
            return Err(format!(
                "Stop-loss {} on wrong side of entry {} for {}",
                stop_loss_price, entry_price, side
            ));
        }
        if !tp_ok {
            return Err(format!(
                "Take-profit {} on wrong side of entry {} for {}",
                take_profit_price, entry_price, side
            ));
        }
        Ok(Position {
            symbol: symbol.into(),
            side,
            entry_price,
            quantity,
            leverage,
            stop_loss_price,
            take_profit_price,
            opened_at,
        })
    }

    pub fn notional_value(&self) -> f64 {
        self.entry_price.value() * self.quantity.value()
    }

    /// Loss realized if the stop-loss fills exactly at its level.
    pub fn risk_amount(&self) -> f64 {
        (self.entry_price.value() - self.stop_loss_price.value()).abs() * self.quantity.value()
    }

    pub fn unrealized_pnl(&self, current_price: Price) -> f64 {
        let diff = match self.side {
            PositionSide::Long => current_price.value() - self.entry_price.value(),
            PositionSide::Short => self.entry_price.value() - current_price.value(),
        };
        diff * self.quantity.value()
    }

    pub fn stop_loss_hit(&self, current_price: Price) -> bool {
        match self.side {
            PositionSide::Long => current_price <= self.stop_loss_price,
            PositionSide::Short => current_price >= self.stop_loss_price,
        }
    }

    pub fn take_profit_hit(&self, current_price: Price) -> bool {
        match self.side {
            PositionSide::Long => current_price >= self.take_profit_price,
            PositionSide::Short => current_price <= self.take_profit_price,
        }
    }
}
