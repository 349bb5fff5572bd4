use thiserror::Error;

use crate::domain::repositories::exchange_client::ExchangeError;

/// A deliberate, rule-driven refusal to trade. A veto is not a failure:
/// it is the risk sizer doing its job, surfaced as an informational
/// event rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub enum VetoReason {
    /// Signal confidence did not reach the applicable threshold tier.
    BelowThreshold { confidence: f64, threshold: f64 },
    /// Account already holds the maximum concurrent positions for the mode.
    PositionCap { open: usize, max: usize },
    /// An open position already exists for this instrument.
    DuplicateInstrument { symbol: String },
    /// Sized quantity fell below the instrument's minimum order size.
    BelowMinimumSize { notional: f64, min: f64 },
    /// Aggregate stop-loss risk on the book exceeds the heat limit.
    PortfolioHeat { heat: f64, limit: f64 },
}

impl VetoReason {
    /// Stable machine-readable tag for logs and notifications.
    pub fn tag(&self) -> &'static str {
        match self {
            VetoReason::BelowThreshold { .. } => "below-threshold",
            VetoReason::PositionCap { .. } => "position-cap",
            VetoReason::DuplicateInstrument { .. } => "duplicate-instrument",
            VetoReason::BelowMinimumSize { .. } => "below-minimum-size",
            VetoReason::PortfolioHeat { .. } => "portfolio-heat",
        }
    }
}

impl std::fmt::Display for VetoReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VetoReason::BelowThreshold {
                confidence,
                threshold,
            } => write!(
                f,
                "below-threshold: confidence {:.3} < threshold {:.3}",
                confidence, threshold
            ),
            VetoReason::PositionCap { open, max } => {
                write!(f, "position-cap: {} open, {} max", open, max)
            }
            VetoReason::DuplicateInstrument { symbol } => {
                write!(f, "duplicate-instrument: {} already has a position", symbol)
            }
            VetoReason::BelowMinimumSize { notional, min } => write!(
                f,
                "below-minimum-size: notional {:.4} < minimum {:.4}",
                notional, min
            ),
            VetoReason::PortfolioHeat { heat, limit } => write!(
                f,
                "portfolio-heat: {:.1}% exceeds limit {:.1}%",
                heat * 100.0,
                limit * 100.0
            ),
        }
    }
}

/// Why an instrument could not produce an indicator snapshot this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum NotReadyReason {
    /// Window shorter than the slowest indicator lookback.
    InsufficientHistory { have: usize, need: usize },
    /// An indicator produced a non-finite value (flat range, zero volume).
    NonFiniteIndicator { indicator: &'static str },
}

impl std::fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotReadyReason::InsufficientHistory { have, need } => {
                write!(f, "insufficient history: have {}, need {}", have, need)
            }
            NotReadyReason::NonFiniteIndicator { indicator } => {
                write!(f, "non-finite output from {}", indicator)
            }
        }
    }
}

/// Top-level engine error taxonomy.
///
/// NotReady and Transient are per-instrument and never abort the cycle;
/// Config halts the scheduler at startup, never mid-run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{symbol} not ready: {reason}")]
    NotReady {
        symbol: String,
        reason: NotReadyReason,
    },

    #[error("transient failure for {symbol}: {source}")]
    Transient {
        symbol: String,
        #[source]
        source: ExchangeError,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Startup-time configuration failures. These are fatal: the scheduler
/// refuses to start rather than trade with broken risk parameters.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("no instruments configured")]
    NoInstruments,

    #[error("invalid {field}: {message}")]
    InvalidField { field: &'static str, message: String },

    #[error("mode {mode}: high confidence threshold {high} below normal threshold {normal}")]
    InvertedThresholds { mode: &'static str, normal: f64, high: f64 },

    #[error("mode {mode}: leverage range {min}..{max} is empty or below 1x")]
    InvalidLeverageRange { mode: &'static str, min: f64, max: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_veto_tags_are_stable() {
        let veto = VetoReason::BelowThreshold {
            confidence: 0.6,
            threshold: 0.7,
        };
        assert_eq!(veto.tag(), "below-threshold");
        assert_eq!(
            VetoReason::PositionCap { open: 2, max: 2 }.tag(),
            "position-cap"
        );
        assert_eq!(
            VetoReason::DuplicateInstrument {
                symbol: "BTCUSDT".to_string()
            }
            .tag(),
            "duplicate-instrument"
        );
        assert_eq!(
            VetoReason::BelowMinimumSize {
                notional: 1.0,
                min: 5.0
            }
            .tag(),
            "below-minimum-size"
        );
    }

    #[test]
    fn test_veto_display_carries_context() {
        let veto = VetoReason::BelowThreshold {
            confidence: 0.60,
            threshold: 0.70,
        };
        let msg = veto.to_string();
        assert!(msg.contains("0.600"));
        assert!(msg.contains("0.700"));
    }

    #[test]
    fn test_not_ready_display() {
        let reason = NotReadyReason::InsufficientHistory { have: 10, need: 35 };
        assert_eq!(reason.to_string(), "insufficient history: have 10, need 35");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvertedThresholds {
            mode: "moderate",
            normal: 0.7,
            high: 0.6,
        };
        assert!(err.to_string().contains("below normal threshold"));
    }
}
