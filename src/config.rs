use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::domain::entities::instrument::Instrument;
use crate::domain::errors::ConfigError;
use crate::domain::services::indicator_engine::IndicatorConfig;
use crate::domain::services::mode::{ModeParams, ModeTable};
use crate::domain::services::risk_sizer::RiskConfig;
use crate::domain::services::scheduler::SchedulerConfig;
use crate::domain::services::signal_scorer::ScorerConfig;

/// Engine configuration, layered in three steps: built-in defaults,
/// an optional JSON file, then environment variable overrides.
///
/// Operational knobs (intervals, timeouts) degrade gracefully: a bad
/// value logs a warning and keeps the default. Risk parameters do not:
/// `validate` refuses to start the engine on any inconsistency there.
#[derive(Clone)]
pub struct EngineConfig {
    pub instruments: Vec<Instrument>,
    pub initial_balance: f64,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub submit_timeout: Duration,
    pub candle_retention: usize,
    pub max_consecutive_failures: u32,
    pub mode_table: ModeTable,
    pub risk: RiskConfig,
    pub indicators: IndicatorConfig,
    pub scorer: ScorerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            instruments: vec![
                Instrument {
                    symbol: "BTCUSDT".to_string(),
                    tick_size: 0.1,
                    quantity_step: 0.001,
                    min_order_size: 5.0,
                    max_leverage: 20.0,
                },
                Instrument {
                    symbol: "ETHUSDT".to_string(),
                    tick_size: 0.01,
                    quantity_step: 0.01,
                    min_order_size: 5.0,
                    max_leverage: 20.0,
                },
            ],
            initial_balance: 15.0,
            poll_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
            submit_timeout: Duration::from_secs(15),
            candle_retention: 120,
            max_consecutive_failures: 3,
            mode_table: ModeTable::default(),
            risk: RiskConfig::default(),
            indicators: IndicatorConfig::default(),
            scorer: ScorerConfig::default(),
        }
    }
}

/// File-level shape. Every field optional so a partial file only
/// overrides what it names.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    instruments: Option<Vec<Instrument>>,
    initial_balance: Option<f64>,
    poll_interval_secs: Option<u64>,
    fetch_timeout_secs: Option<u64>,
    submit_timeout_secs: Option<u64>,
    candle_retention: Option<usize>,
    max_consecutive_failures: Option<u32>,
    optimized_balance_threshold: Option<f64>,
    moderate: Option<ModeParamsFile>,
    optimized: Option<ModeParamsFile>,
    stop_loss_pct: Option<f64>,
    take_profit_pct: Option<f64>,
    portfolio_heat_limit: Option<f64>,
    volatility_ceiling: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ModeParamsFile {
    max_positions: Option<usize>,
    normal_confidence_threshold: Option<f64>,
    high_confidence_threshold: Option<f64>,
    leverage_min: Option<f64>,
    leverage_max: Option<f64>,
    risk_per_trade_pct: Option<f64>,
}

impl ModeParamsFile {
    fn apply(&self, params: &mut ModeParams) {
        if let Some(v) = self.max_positions {
            params.max_positions = v;
        }
        if let Some(v) = self.normal_confidence_threshold {
            params.normal_confidence_threshold = v;
        }
        if let Some(v) = self.high_confidence_threshold {
            params.high_confidence_threshold = v;
        }
        if let Some(v) = self.leverage_min {
            params.leverage_min = v;
        }
        if let Some(v) = self.leverage_max {
            params.leverage_max = v;
        }
        if let Some(v) = self.risk_per_trade_pct {
            params.risk_per_trade_pct = v;
        }
    }
}

impl EngineConfig {
    /// Defaults, then the JSON file if present, then the environment.
    pub fn load(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
        let mut config = EngineConfig::default();
        if let Some(path) = path {
            config.apply_file(path)?;
        }
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidField {
            field: "config_file",
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        let file: ConfigFile =
            serde_json::from_str(&raw).map_err(|e| ConfigError::InvalidField {
                field: "config_file",
                message: format!("cannot parse {}: {}", path.display(), e),
            })?;

        if let Some(instruments) = file.instruments {
            self.instruments = instruments;
        }
        if let Some(v) = file.initial_balance {
            self.initial_balance = v;
        }
        if let Some(v) = file.poll_interval_secs {
            self.poll_interval = Duration::from_secs(v);
        }
        if let Some(v) = file.fetch_timeout_secs {
            self.fetch_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.submit_timeout_secs {
            self.submit_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.candle_retention {
            self.candle_retention = v;
        }
        if let Some(v) = file.max_consecutive_failures {
            self.max_consecutive_failures = v;
        }
        if let Some(v) = file.optimized_balance_threshold {
            self.mode_table.optimized_balance_threshold = v;
        }
        if let Some(moderate) = file.moderate {
            moderate.apply(&mut self.mode_table.moderate);
        }
        if let Some(optimized) = file.optimized {
            optimized.apply(&mut self.mode_table.optimized);
        }
        if let Some(v) = file.stop_loss_pct {
            self.risk.stop_loss_pct = v;
        }
        if let Some(v) = file.take_profit_pct {
            self.risk.take_profit_pct = v;
        }
        if let Some(v) = file.portfolio_heat_limit {
            self.risk.portfolio_heat_limit = v;
        }
        if let Some(v) = file.volatility_ceiling {
            self.risk.volatility_ceiling = v;
        }
        Ok(())
    }

    /// Environment overrides for operational knobs. Invalid values log
    /// a warning and keep whatever was already set.
    fn apply_env(&mut self) {
        if let Ok(raw) = std::env::var("POLL_INTERVAL_SECS") {
            match raw.parse::<u64>() {
                Ok(value) if value > 0 => self.poll_interval = Duration::from_secs(value),
                _ => warn!(
                    "invalid POLL_INTERVAL_SECS '{}', keeping {}s",
                    raw,
                    self.poll_interval.as_secs()
                ),
            }
        }
        if let Ok(raw) = std::env::var("FETCH_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(value) if value > 0 => self.fetch_timeout = Duration::from_secs(value),
                _ => warn!(
                    "invalid FETCH_TIMEOUT_SECS '{}', keeping {}s",
                    raw,
                    self.fetch_timeout.as_secs()
                ),
            }
        }
        if let Ok(raw) = std::env::var("INITIAL_BALANCE") {
            match raw.parse::<f64>() {
                Ok(value) if value > 0.0 && value.is_finite() => self.initial_balance = value,
                _ => warn!(
                    "invalid INITIAL_BALANCE '{}', keeping {}",
                    raw, self.initial_balance
                ),
            }
        }
        if let Ok(raw) = std::env::var("OPTIMIZED_BALANCE_THRESHOLD") {
            match raw.parse::<f64>() {
                Ok(value) if value > 0.0 && value.is_finite() => {
                    self.mode_table.optimized_balance_threshold = value
                }
                _ => warn!(
                    "invalid OPTIMIZED_BALANCE_THRESHOLD '{}', keeping {}",
                    raw, self.mode_table.optimized_balance_threshold
                ),
            }
        }
    }

    /// Risk-parameter consistency. Failures here are fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instruments.is_empty() {
            return Err(ConfigError::NoInstruments);
        }
        self.mode_table.validate()?;
        if !(0.0..1.0).contains(&self.risk.stop_loss_pct) || self.risk.stop_loss_pct == 0.0 {
            return Err(ConfigError::InvalidField {
                field: "stop_loss_pct",
                message: format!("must be in (0, 1), got {}", self.risk.stop_loss_pct),
            });
        }
        if self.risk.take_profit_pct <= 0.0 || !self.risk.take_profit_pct.is_finite() {
            return Err(ConfigError::InvalidField {
                field: "take_profit_pct",
                message: format!("must be positive, got {}", self.risk.take_profit_pct),
            });
        }
        if !(0.0..=1.0).contains(&self.risk.portfolio_heat_limit) {
            return Err(ConfigError::InvalidField {
                field: "portfolio_heat_limit",
                message: format!("must be in [0, 1], got {}", self.risk.portfolio_heat_limit),
            });
        }
        if self.risk.volatility_ceiling <= 0.0 {
            return Err(ConfigError::InvalidField {
                field: "volatility_ceiling",
                message: format!("must be positive, got {}", self.risk.volatility_ceiling),
            });
        }
        // A deadlocked vote must cap strictly below anything a mode
        // would act on, or Hold signals could become trades.
        let floor = self.mode_table.lowest_actionable_threshold();
        if self.scorer.deadlock_cap > floor {
            return Err(ConfigError::InvalidField {
                field: "deadlock_cap",
                message: format!(
                    "cap {} exceeds the lowest actionable threshold {}",
                    self.scorer.deadlock_cap, floor
                ),
            });
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: self.poll_interval,
            fetch_timeout: self.fetch_timeout,
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }
}
