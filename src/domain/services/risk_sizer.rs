use tracing::debug;

use crate::domain::entities::account::AccountState;
use crate::domain::entities::instrument::Instrument;
use crate::domain::entities::order_intent::OrderIntent;
use crate::domain::entities::position::PositionSide;
use crate::domain::errors::VetoReason;
use crate::domain::services::mode::ModeParams;
use crate::domain::services::signal_scorer::{Signal, SignalDirection};
use crate::domain::value_objects::{price::Price, quantity::Quantity};

/// Risk policy shared across modes.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Stop-loss distance from entry, as a fraction of entry price.
    pub stop_loss_pct: f64,
    /// Take-profit distance from entry, as a fraction of entry price.
    pub take_profit_pct: f64,
    /// Maximum total open notional relative to balance.
    pub portfolio_heat_limit: f64,
    /// Realized volatility at which leverage is pinned to the range floor.
    pub volatility_ceiling: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            stop_loss_pct: 0.03,
            take_profit_pct: 0.06,
            portfolio_heat_limit: 0.10,
            volatility_ceiling: 0.06,
        }
    }
}

/// Turns an actionable signal into a bounded-risk order intent, or a
/// veto naming exactly which rule declined it.
///
/// Sizing never places orders; the produced intent is side-effect-free
/// and handed to the orchestrator for submission.
pub struct RiskSizer {
    config: RiskConfig,
}

impl RiskSizer {
    pub fn new(config: RiskConfig) -> Self {
        RiskSizer { config }
    }

    pub fn size(
        &self,
        signal: &Signal,
        params: &ModeParams,
        account: &AccountState,
        instrument: &Instrument,
    ) -> Result<OrderIntent, VetoReason> {
        // A hold carries no direction to trade. The scorer caps hold
        // confidence below every actionable threshold, but a directly
        // constructed signal must gate out here rather than panic.
        let side = match signal.direction {
            SignalDirection::Long => PositionSide::Long,
            SignalDirection::Short => PositionSide::Short,
            SignalDirection::Hold => {
                return Err(VetoReason::BelowThreshold {
                    confidence: signal.confidence.value(),
                    threshold: params.normal_confidence_threshold,
                })
            }
        };

        // 1. Confidence gate. High-variance signals are promoted to the
        //    stricter tier; there is exactly one extra tier, never a
        //    ladder of ad hoc levels.
        let threshold = if signal.high_variance {
            params.high_confidence_threshold
        } else {
            params.normal_confidence_threshold
        };
        if !signal.confidence.meets(threshold) {
            return Err(VetoReason::BelowThreshold {
                confidence: signal.confidence.value(),
                threshold,
            });
        }

        // 2. Concurrent position cap for the mode in force this cycle.
        let open = account.open_position_count();
        if open >= params.max_positions {
            return Err(VetoReason::PositionCap {
                open,
                max: params.max_positions,
            });
        }

        // 3. One position per instrument, ever.
        if account.has_position(&signal.symbol) {
            return Err(VetoReason::DuplicateInstrument {
                symbol: signal.symbol.clone(),
            });
        }

        // 4. Portfolio heat: total stop-loss risk already on the book.
        let heat = account.portfolio_heat();
        if heat >= self.config.portfolio_heat_limit {
            return Err(VetoReason::PortfolioHeat {
                heat,
                limit: self.config.portfolio_heat_limit,
            });
        }

        // 5. Size from risk budget over stop distance, floored to the
        //    instrument increment.
        let entry = instrument.round_price(signal.snapshot.last_close);
        let risk_amount = params.risk_per_trade_pct * account.available_balance;
        let risk_per_unit = entry * self.config.stop_loss_pct;
        let raw_quantity = if risk_per_unit > 0.0 {
            risk_amount / risk_per_unit
        } else {
            0.0
        };
        let quantity = instrument.round_quantity(raw_quantity);
        let notional = quantity * entry;
        if quantity <= 0.0 || notional < instrument.min_order_size {
            return Err(VetoReason::BelowMinimumSize {
                notional,
                min: instrument.min_order_size,
            });
        }

        let leverage = self.select_leverage(signal, params, instrument);

        let (stop_loss, take_profit) = match side {
            PositionSide::Long => (
                entry * (1.0 - self.config.stop_loss_pct),
                entry * (1.0 + self.config.take_profit_pct),
            ),
            PositionSide::Short => (
                entry * (1.0 + self.config.stop_loss_pct),
                entry * (1.0 - self.config.take_profit_pct),
            ),
        };

        let intent = OrderIntent {
            symbol: signal.symbol.clone(),
            side,
            quantity: Quantity::new(quantity)
                .map_err(|_| VetoReason::BelowMinimumSize {
                    notional,
                    min: instrument.min_order_size,
                })?,
            leverage,
            entry_price: price_or_min_veto(entry, notional, instrument)?,
            stop_loss_price: price_or_min_veto(
                instrument.round_price(stop_loss),
                notional,
                instrument,
            )?,
            take_profit_price: price_or_min_veto(
                instrument.round_price(take_profit),
                notional,
                instrument,
            )?,
            confidence: signal.confidence,
        };

        debug!(
            symbol = %intent.symbol,
            side = %intent.side,
            quantity = %intent.quantity,
            leverage = intent.leverage,
            "sized order intent"
        );
        Ok(intent)
    }

    /// Pick leverage inside the mode range.
    ///
    /// Linear in confidence above the normal threshold, discounted by
    /// realized volatility toward the range floor. Both directions are
    /// monotonic: more volatility never raises leverage, more
    /// confidence never lowers it. Rounded to one decimal.
    fn select_leverage(
        &self,
        signal: &Signal,
        params: &ModeParams,
        instrument: &Instrument,
    ) -> f64 {
        let span = 1.0 - params.normal_confidence_threshold;
        let confidence_factor = if span > 0.0 {
            ((signal.confidence.value() - params.normal_confidence_threshold) / span)
                .clamp(0.0, 1.0)
        } else {
            0.0
        };

        let volatility_factor = if self.config.volatility_ceiling > 0.0 {
            (1.0 - signal.snapshot.realized_volatility / self.config.volatility_ceiling)
                .clamp(0.0, 1.0)
        } else {
            0.0
        };

        let range = params.leverage_max - params.leverage_min;
        let leverage = params.leverage_min + range * confidence_factor * volatility_factor;
        let leverage = leverage.min(instrument.max_leverage).max(1.0);
        (leverage * 10.0).round() / 10.0
    }
}

fn price_or_min_veto(
    value: f64,
    notional: f64,
    instrument: &Instrument,
) -> Result<Price, VetoReason> {
    Price::new(value).map_err(|_| VetoReason::BelowMinimumSize {
        notional,
        min: instrument.min_order_size,
    })
}
