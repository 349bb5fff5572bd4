use chrono::{DateTime, Utc};

use crate::domain::value_objects::price::Price;

/// One OHLCV observation for an instrument.
#[derive(Debug, Clone)]
pub struct Candle {
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

impl Candle {
    pub fn new(
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, String> {
        if !volume.is_finite() || volume < 0.0 {
            return Err("Volume must be non-negative and finite".to_string());
        }
        Ok(Candle {
            open: Price::new(open)?,
            high: Price::new(high)?,
            low: Price::new(low)?,
            close: Price::new(close)?,
            volume,
            timestamp,
        })
    }
}

pub trait Indicator {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64>;
}

pub struct EMA {
    pub period: usize,
}

impl EMA {
    pub fn new(period: usize) -> Self {
        EMA { period }
    }

    pub fn calculate_on_values(&self, values: &[f64]) -> Vec<f64> {
        if values.is_empty() || self.period == 0 {
            return vec![];
        }
        let mut ema_values = Vec::with_capacity(values.len());
        let multiplier = 2.0 / (self.period as f64 + 1.0);

        // First EMA is seeded with an SMA of the initial window.
        let initial_count = self.period.min(values.len());
        let sum: f64 = values[..initial_count].iter().sum();
        let mut ema = sum / initial_count as f64;
        ema_values.push(ema);

        for &val in values.iter().skip(self.period) {
            ema = (val - ema) * multiplier + ema;
            ema_values.push(ema);
        }

        ema_values
    }
}

impl Indicator for EMA {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close.value()).collect();
        self.calculate_on_values(&closes)
    }
}

pub struct RSI {
    pub period: usize,
}

impl RSI {
    pub fn new(period: usize) -> Self {
        RSI { period }
    }
}

impl Indicator for RSI {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if self.period == 0 || candles.len() < self.period + 1 {
            return vec![];
        }
        let mut gains = Vec::new();
        let mut losses = Vec::new();

        for i in 1..candles.len() {
            let change = candles[i].close.value() - candles[i - 1].close.value();
            if change > 0.0 {
                gains.push(change);
                losses.push(0.0);
            } else {
                gains.push(0.0);
                losses.push(change.abs());
            }
        }

        let mut rsi_values = Vec::new();
        for i in self.period..=gains.len() {
            let start_idx = i - self.period;
            let end_idx = i - 1;
            let avg_gain = gains[start_idx..=end_idx].iter().sum::<f64>() / self.period as f64;
            let avg_loss = losses[start_idx..=end_idx].iter().sum::<f64>() / self.period as f64;
            // A lossless window saturates straight to 100 instead of
            // going through a finite RS stand-in.
            let rsi = if avg_loss == 0.0 {
                100.0
            } else {
                let rs = avg_gain / avg_loss;
                100.0 - (100.0 / (1.0 + rs))
            };
            rsi_values.push(rsi);
        }

        rsi_values
    }
}

#[derive(Debug, Clone)]
pub struct BollingerBandsValues {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub struct BollingerBands {
    pub period: usize,
    pub std_dev: f64,
}

impl BollingerBands {
    pub fn new(period: usize, std_dev: f64) -> Self {
        BollingerBands { period, std_dev }
    }

    pub fn calculate_detailed(&self, candles: &[Candle]) -> BollingerBandsValues {
        if self.period == 0 || candles.len() < self.period {
            return BollingerBandsValues {
                upper: vec![],
                middle: vec![],
                lower: vec![],
            };
        }

        let mut upper = Vec::new();
        let mut middle = Vec::new();
        let mut lower = Vec::new();

        for i in self.period..=candles.len() {
            let slice = &candles[i - self.period..i];
            let sma = slice.iter().map(|c| c.close.value()).sum::<f64>() / self.period as f64;
            let variance = slice
                .iter()
                .map(|c| (c.close.value() - sma).powi(2))
                .sum::<f64>()
                / self.period as f64;
            let std = variance.sqrt();

            upper.push(sma + self.std_dev * std);
            middle.push(sma);
            lower.push(sma - self.std_dev * std);
        }

        BollingerBandsValues {
            upper,
            middle,
            lower,
        }
    }

    /// Position of the latest close inside the bands (%B).
    /// Returns None for a degenerate (flat) band rather than dividing by
    /// zero; callers treat that as not-ready.
    pub fn percent_b(&self, candles: &[Candle]) -> Option<f64> {
        let bands = self.calculate_detailed(candles);
        let upper = *bands.upper.last()?;
        let lower = *bands.lower.last()?;
        let close = candles.last()?.close.value();
        let width = upper - lower;
        if width <= f64::EPSILON {
            return None;
        }
        Some((close - lower) / width)
    }
}

impl Indicator for BollingerBands {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        self.calculate_detailed(candles).middle
    }
}

pub struct MACD {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
}

impl MACD {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        MACD {
            fast_period,
            slow_period,
            signal_period,
        }
    }

    /// Latest MACD histogram value (MACD line minus signal line).
    pub fn histogram(&self, candles: &[Candle]) -> Option<f64> {
        let fast = EMA::new(self.fast_period).calculate(candles);
        let slow = EMA::new(self.slow_period).calculate(candles);
        if fast.is_empty() || slow.is_empty() {
            return None;
        }
        // The slow EMA series is shorter; align from the tail.
        let len = fast.len().min(slow.len());
        let macd_line: Vec<f64> = fast[fast.len() - len..]
            .iter()
            .zip(&slow[slow.len() - len..])
            .map(|(f, s)| f - s)
            .collect();

        let signal = EMA::new(self.signal_period).calculate_on_values(&macd_line);
        let last_macd = *macd_line.last()?;
        let last_signal = *signal.last()?;
        Some(last_macd - last_signal)
    }
}

impl Indicator for MACD {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        let fast = EMA::new(self.fast_period).calculate(candles);
        let slow = EMA::new(self.slow_period).calculate(candles);
        let len = fast.len().min(slow.len());
        if len == 0 {
            return vec![];
        }
        fast[fast.len() - len..]
            .iter()
            .zip(&slow[slow.len() - len..])
            .map(|(f, s)| f - s)
            .collect()
    }
}

/// Standard deviation of simple returns over the window tail.
pub struct RealizedVolatility {
    pub period: usize,
}

impl RealizedVolatility {
    pub fn new(period: usize) -> Self {
        RealizedVolatility { period }
    }

    /// Returns None when history is too short or any close is zero.
    pub fn latest(&self, candles: &[Candle]) -> Option<f64> {
        if candles.len() < self.period + 1 || self.period < 2 {
            return None;
        }
        let tail = &candles[candles.len() - self.period - 1..];
        let mut returns = Vec::with_capacity(self.period);
        for pair in tail.windows(2) {
            let prev = pair[0].close.value();
            if prev <= f64::EPSILON {
                return None;
            }
            returns.push((pair[1].close.value() - prev) / prev);
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance =
            returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
        Some(variance.sqrt())
    }
}

/// Z-score of the latest volume against the window tail.
pub struct VolumeZScore {
    pub period: usize,
}

impl VolumeZScore {
    pub fn new(period: usize) -> Self {
        VolumeZScore { period }
    }

    /// Returns None when history is too short or the volume series is
    /// degenerate (all zero / constant), which callers must treat as
    /// not-ready rather than a neutral reading.
    pub fn latest(&self, candles: &[Candle]) -> Option<f64> {
        if candles.len() < self.period || self.period < 2 {
            return None;
        }
        let tail = &candles[candles.len() - self.period..];
        let volumes: Vec<f64> = tail.iter().map(|c| c.volume).collect();
        let mean = volumes.iter().sum::<f64>() / volumes.len() as f64;
        let variance =
            volumes.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / volumes.len() as f64;
        let std = variance.sqrt();
        if std <= f64::EPSILON {
            return None;
        }
        Some((volumes[volumes.len() - 1] - mean) / std)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(close: f64, volume: f64) -> Candle {
        Candle::new(close, close + 1.0, close - 1.0, close, volume, Utc::now()).unwrap()
    }

    fn rising_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| candle(100.0 + i as f64, 1000.0 + 10.0 * i as f64))
            .collect()
    }

    #[test]
    fn test_candle_rejects_negative_volume() {
        assert!(Candle::new(1.0, 2.0, 0.5, 1.5, -1.0, Utc::now()).is_err());
    }

    #[test]
    fn test_ema_calculation() {
        let candles = rising_candles(10);
        let ema = EMA::new(3);
        let values = ema.calculate(&candles);
        assert!(!values.is_empty());
        // Rising closes keep the EMA below the latest close.
        assert!(*values.last().unwrap() < candles.last().unwrap().close.value());
    }

    #[test]
    fn test_rsi_all_gains_saturates() {
        let candles = rising_candles(20);
        let rsi = RSI::new(14);
        let values = rsi.calculate(&candles);
        assert!(!values.is_empty());
        assert!((values.last().unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_insufficient_history() {
        let candles = rising_candles(5);
        assert!(RSI::new(14).calculate(&candles).is_empty());
    }

    #[test]
    fn test_bollinger_percent_b_in_band() {
        let candles = rising_candles(25);
        let bb = BollingerBands::new(20, 2.0);
        let pctb = bb.percent_b(&candles).unwrap();
        assert!(pctb.is_finite());
    }

    #[test]
    fn test_bollinger_percent_b_flat_series_is_none() {
        let candles: Vec<Candle> = (0..25).map(|_| candle(100.0, 1000.0)).collect();
        let bb = BollingerBands::new(20, 2.0);
        assert!(bb.percent_b(&candles).is_none());
    }

    #[test]
    fn test_macd_histogram_positive_in_uptrend() {
        let candles = rising_candles(60);
        let macd = MACD::new(12, 26, 9);
        let hist = macd.histogram(&candles).unwrap();
        assert!(hist.is_finite());
    }

    #[test]
    fn test_realized_volatility_flat_is_zero() {
        let candles: Vec<Candle> = (0..30).map(|_| candle(100.0, 1000.0)).collect();
        let vol = RealizedVolatility::new(20).latest(&candles).unwrap();
        assert!(vol.abs() < 1e-12);
    }

    #[test]
    fn test_realized_volatility_insufficient() {
        let candles = rising_candles(5);
        assert!(RealizedVolatility::new(20).latest(&candles).is_none());
    }

    #[test]
    fn test_volume_zscore_spike_is_positive() {
        let mut candles: Vec<Candle> = (0..19).map(|i| candle(100.0 + i as f64, 1000.0)).collect();
        candles.push(candle(120.0, 5000.0));
        let z = VolumeZScore::new(20).latest(&candles).unwrap();
        assert!(z > 2.0);
    }

    #[test]
    fn test_volume_zscore_constant_volume_is_none() {
        let candles: Vec<Candle> = (0..20).map(|_| candle(100.0, 1000.0)).collect();
        assert!(VolumeZScore::new(20).latest(&candles).is_none());
    }
}
