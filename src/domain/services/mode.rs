use crate::domain::errors::ConfigError;

/// Fixed parameter bundle carried by an operating mode.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeParams {
    pub max_positions: usize,
    pub normal_confidence_threshold: f64,
    pub high_confidence_threshold: f64,
    pub leverage_min: f64,
    pub leverage_max: f64,
    pub risk_per_trade_pct: f64,
}

impl ModeParams {
    pub fn validate(&self, mode: &'static str) -> Result<(), ConfigError> {
        for (field, value) in [
            ("normal_confidence_threshold", self.normal_confidence_threshold),
            ("high_confidence_threshold", self.high_confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) || !value.is_finite() {
                return Err(ConfigError::InvalidField {
                    field,
                    message: format!("{} must be in [0, 1], got {}", mode, value),
                });
            }
        }
        if self.high_confidence_threshold < self.normal_confidence_threshold {
            return Err(ConfigError::InvertedThresholds {
                mode,
                normal: self.normal_confidence_threshold,
                high: self.high_confidence_threshold,
            });
        }
        if self.leverage_min < 1.0 || self.leverage_max < self.leverage_min {
            return Err(ConfigError::InvalidLeverageRange {
                mode,
                min: self.leverage_min,
                max: self.leverage_max,
            });
        }
        if self.max_positions == 0 {
            return Err(ConfigError::InvalidField {
                field: "max_positions",
                message: format!("{} must allow at least one position", mode),
            });
        }
        if self.risk_per_trade_pct <= 0.0 || self.risk_per_trade_pct > 0.25 {
            return Err(ConfigError::InvalidField {
                field: "risk_per_trade_pct",
                message: format!(
                    "{} must be in (0, 0.25], got {}",
                    mode, self.risk_per_trade_pct
                ),
            });
        }
        Ok(())
    }
}

/// Operating mode implied by account balance.
///
/// Selection is a pure function of balance recomputed every cycle: no
/// mode state survives between cycles. A balance oscillating around the
/// boundary will toggle the mode every cycle; that is the documented,
/// accepted behavior rather than a defect, and no hysteresis is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Moderate,
    Optimized,
}

impl Mode {
    /// Balance at or above the threshold selects Optimized.
    pub fn for_balance(balance: f64, optimized_threshold: f64) -> Mode {
        if balance >= optimized_threshold {
            Mode::Optimized
        } else {
            Mode::Moderate
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Moderate => "moderate",
            Mode::Optimized => "optimized",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Both parameter bundles plus the balance boundary between them.
#[derive(Debug, Clone)]
pub struct ModeTable {
    pub optimized_balance_threshold: f64,
    pub moderate: ModeParams,
    pub optimized: ModeParams,
}

impl Default for ModeTable {
    fn default() -> Self {
        // Defaults follow the small-account brackets the strategy was
        // tuned for: conservative under $20, looser at or above.
        ModeTable {
            optimized_balance_threshold: 20.0,
            moderate: ModeParams {
                max_positions: 2,
                normal_confidence_threshold: 0.70,
                high_confidence_threshold: 0.80,
                leverage_min: 1.5,
                leverage_max: 4.0,
                risk_per_trade_pct: 0.02,
            },
            optimized: ModeParams {
                max_positions: 3,
                normal_confidence_threshold: 0.65,
                high_confidence_threshold: 0.75,
                leverage_min: 2.0,
                leverage_max: 6.0,
                risk_per_trade_pct: 0.03,
            },
        }
    }
}

impl ModeTable {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.optimized_balance_threshold <= 0.0 || !self.optimized_balance_threshold.is_finite()
        {
            return Err(ConfigError::InvalidField {
                field: "optimized_balance_threshold",
                message: format!("must be positive, got {}", self.optimized_balance_threshold),
            });
        }
        self.moderate.validate("moderate")?;
        self.optimized.validate("optimized")?;
        Ok(())
    }

    pub fn select(&self, balance: f64) -> (Mode, &ModeParams) {
        let mode = Mode::for_balance(balance, self.optimized_balance_threshold);
        (mode, self.params(mode))
    }

    pub fn params(&self, mode: Mode) -> &ModeParams {
        match mode {
            Mode::Moderate => &self.moderate,
            Mode::Optimized => &self.optimized,
        }
    }

    /// Lowest confidence threshold any mode will act on. The signal
    /// scorer caps deadlocked votes strictly below this.
    pub fn lowest_actionable_threshold(&self) -> f64 {
        self.moderate
            .normal_confidence_threshold
            .min(self.optimized.normal_confidence_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_selection_is_pure_branch() {
        assert_eq!(Mode::for_balance(15.0, 20.0), Mode::Moderate);
        assert_eq!(Mode::for_balance(19.99, 20.0), Mode::Moderate);
        assert_eq!(Mode::for_balance(20.0, 20.0), Mode::Optimized);
        assert_eq!(Mode::for_balance(25.0, 20.0), Mode::Optimized);
    }

    #[test]
    fn test_mode_selection_deterministic() {
        for balance in [0.0, 5.0, 19.999, 20.0, 1000.0] {
            assert_eq!(
                Mode::for_balance(balance, 20.0),
                Mode::for_balance(balance, 20.0)
            );
        }
    }

    #[test]
    fn test_table_select_carries_params() {
        let table = ModeTable::default();
        let (mode, params) = table.select(15.0);
        assert_eq!(mode, Mode::Moderate);
        assert_eq!(params.max_positions, 2);
        assert_eq!(params.normal_confidence_threshold, 0.70);

        let (mode, params) = table.select(25.0);
        assert_eq!(mode, Mode::Optimized);
        assert_eq!(params.max_positions, 3);
    }

    #[test]
    fn test_default_table_validates() {
        assert!(ModeTable::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut table = ModeTable::default();
        table.moderate.high_confidence_threshold = 0.60;
        assert!(matches!(
            table.validate(),
            Err(ConfigError::InvertedThresholds { .. })
        ));
    }

    #[test]
    fn test_bad_leverage_range_rejected() {
        let mut table = ModeTable::default();
        table.optimized.leverage_min = 5.0;
        table.optimized.leverage_max = 3.0;
        assert!(matches!(
            table.validate(),
            Err(ConfigError::InvalidLeverageRange { .. })
        ));
    }

    #[test]
    fn test_zero_positions_rejected() {
        let mut table = ModeTable::default();
        table.moderate.max_positions = 0;
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_zero_risk_per_trade_rejected() {
        let mut table = ModeTable::default();
        table.moderate.risk_per_trade_pct = 0.0;
        assert!(matches!(
            table.validate(),
            Err(ConfigError::InvalidField {
                field: "risk_per_trade_pct",
                ..
            })
        ));
    }

    #[test]
    fn test_lowest_actionable_threshold() {
        let table = ModeTable::default();
        assert_eq!(table.lowest_actionable_threshold(), 0.65);
    }
}
