use serde::Deserialize;

/// Immutable reference data for one tradable market.
///
/// Loaded once at startup and read-only thereafter. Quantities are
/// expressed in base units, `min_order_size` in quote (USD) notional,
/// matching futures exchange conventions.
#[derive(Debug, Clone, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub tick_size: f64,
    pub quantity_step: f64,
    pub min_order_size: f64,
    pub max_leverage: f64,
}

impl Instrument {
    pub fn new(
        symbol: impl Into<String>,
        tick_size: f64,
        quantity_step: f64,
        min_order_size: f64,
        max_leverage: f64,
    ) -> Result<Self, String> {
        if tick_size <= 0.0 || !tick_size.is_finite() {
            return Err("tick_size must be positive and finite".to_string());
        }
        if quantity_step <= 0.0 || !quantity_step.is_finite() {
            return Err("quantity_step must be positive and finite".to_string());
        }
        if min_order_size < 0.0 || !min_order_size.is_finite() {
            return Err("min_order_size must be non-negative and finite".to_string());
        }
        if max_leverage < 1.0 || !max_leverage.is_finite() {
            return Err("max_leverage must be at least 1x".to_string());
        }
        Ok(Instrument {
            symbol: symbol.into(),
            tick_size,
            quantity_step,
            min_order_size,
            max_leverage,
        })
    }

    /// Floor a raw quantity to the instrument's order increment.
    /// Sizing always rounds down so risk never exceeds the budget.
    /// The small tolerance keeps exact step multiples from losing a
    /// whole step to float division (0.3 / 3.0 lands just under 0.1).
    pub fn round_quantity(&self, quantity: f64) -> f64 {
        if quantity <= 0.0 || !quantity.is_finite() {
            return 0.0;
        }
        ((quantity / self.quantity_step) + 1e-9).floor() * self.quantity_step
    }

    /// Round a price to the nearest tick.
    pub fn round_price(&self, price: f64) -> f64 {
        (price / self.tick_size).round() * self.tick_size
    }
}
