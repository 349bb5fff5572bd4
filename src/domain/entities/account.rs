use std::collections::HashMap;

use crate::domain::entities::position::Position;

/// Snapshot of the account at the start of a decision cycle.
///
/// Only the position orchestrator writes to the live account; everyone
/// else receives an immutable snapshot valid for one cycle. Sizing
/// against a snapshot older than one cycle is a bug.
#[derive(Debug, Clone, Default)]
pub struct AccountState {
    pub available_balance: f64,
    pub equity: f64,
    /// Open positions keyed by symbol. The map key doubles as the
    /// one-position-per-instrument invariant.
    pub open_positions: HashMap<String, Position>,
}

impl AccountState {
    pub fn new(available_balance: f64, equity: f64) -> Self {
        AccountState {
            available_balance,
            equity,
            open_positions: HashMap::new(),
        }
    }

    pub fn open_position_count(&self) -> usize {
        self.open_positions.len()
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.open_positions.contains_key(symbol)
    }

    /// Portfolio heat: the fraction of the balance lost if every open
    /// position is stopped out at its stop-loss. With per-trade risk at
    /// 2-3%, a 10% heat limit caps exposure well before margin does.
    pub fn portfolio_heat(&self) -> f64 {
        if self.available_balance <= 0.0 {
            return 0.0;
        }
        let total_at_risk: f64 = self
            .open_positions
            .values()
            .map(|p| p.risk_amount())
            .sum();
        total_at_risk / self.available_balance
    }
}
