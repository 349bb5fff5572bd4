use chrono::{DateTime, Utc};

use crate::domain::errors::NotReadyReason;
use crate::domain::services::indicators::{
    BollingerBands, Candle, Indicator, RealizedVolatility, VolumeZScore, EMA, MACD, RSI,
};

/// Derived indicator values for one instrument at one instant.
///
/// Immutable once produced; the engine regenerates a fresh snapshot
/// every cycle. Every field is guaranteed finite.
#[derive(Debug, Clone)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub macd_histogram: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    /// Latest close position within the Bollinger bands (%B).
    pub bollinger_pctb: f64,
    pub volume_zscore: f64,
    pub realized_volatility: f64,
    pub last_close: f64,
    pub computed_at: DateTime<Utc>,
}

/// Either a usable snapshot or an explicit not-ready marker. Keeping
/// this as a tagged variant means "not enough data" can never be read
/// as a directional signal downstream.
#[derive(Debug, Clone)]
pub enum Readiness {
    NotReady(NotReadyReason),
    Ready(IndicatorSnapshot),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready(_))
    }
}

/// Smoothing conventions, fixed at configuration time.
#[derive(Debug, Clone)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    pub bollinger_std_dev: f64,
    pub volatility_period: usize,
    pub volume_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        IndicatorConfig {
            rsi_period: 14,
            ema_fast_period: 9,
            ema_slow_period: 21,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_period: 20,
            bollinger_std_dev: 2.0,
            volatility_period: 20,
            volume_period: 20,
        }
    }
}

/// Pure function of a candle window: no state survives between calls.
pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Self {
        IndicatorEngine { config }
    }

    /// Minimum window length for the slowest indicator to settle.
    pub fn min_lookback(&self) -> usize {
        let c = &self.config;
        let macd_need = c.macd_slow + c.macd_signal;
        [
            c.rsi_period + 1,
            c.ema_slow_period + 1,
            macd_need,
            c.bollinger_period,
            c.volatility_period + 1,
            c.volume_period,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    pub fn compute(&self, candles: &[Candle]) -> Readiness {
        let need = self.min_lookback();
        if candles.len() < need {
            return Readiness::NotReady(NotReadyReason::InsufficientHistory {
                have: candles.len(),
                need,
            });
        }

        let c = &self.config;

        let rsi_values = RSI::new(c.rsi_period).calculate(candles);
        let rsi = match rsi_values.last() {
            Some(&v) if v.is_finite() => v,
            _ => return not_ready("rsi"),
        };

        let ema_fast = match EMA::new(c.ema_fast_period).calculate(candles).last() {
            Some(&v) if v.is_finite() => v,
            _ => return not_ready("ema_fast"),
        };
        let ema_slow = match EMA::new(c.ema_slow_period).calculate(candles).last() {
            Some(&v) if v.is_finite() => v,
            _ => return not_ready("ema_slow"),
        };

        let macd_histogram = match MACD::new(c.macd_fast, c.macd_slow, c.macd_signal)
            .histogram(candles)
        {
            Some(v) if v.is_finite() => v,
            _ => return not_ready("macd"),
        };

        let bollinger_pctb = match BollingerBands::new(c.bollinger_period, c.bollinger_std_dev)
            .percent_b(candles)
        {
            Some(v) if v.is_finite() => v,
            _ => return not_ready("bollinger"),
        };

        let realized_volatility = match RealizedVolatility::new(c.volatility_period).latest(candles)
        {
            Some(v) if v.is_finite() => v,
            _ => return not_ready("realized_volatility"),
        };

        let volume_zscore = match VolumeZScore::new(c.volume_period).latest(candles) {
            Some(v) if v.is_finite() => v,
            _ => return not_ready("volume_zscore"),
        };

        // Window is non-empty here; the last close is what risk sizing
        // will treat as the entry reference.
        let last_close = candles[candles.len() - 1].close.value();

        Readiness::Ready(IndicatorSnapshot {
            rsi,
            macd_histogram,
            ema_fast,
            ema_slow,
            bollinger_pctb,
            volume_zscore,
            realized_volatility,
            last_close,
            computed_at: Utc::now(),
        })
    }
}

fn not_ready(indicator: &'static str) -> Readiness {
    Readiness::NotReady(NotReadyReason::NonFiniteIndicator { indicator })
}
