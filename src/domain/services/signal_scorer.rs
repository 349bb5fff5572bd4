use chrono::{DateTime, Utc};

use crate::domain::services::indicator_engine::IndicatorSnapshot;
use crate::domain::value_objects::confidence::Confidence;

/// Directional call for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDirection {
    Long,
    Short,
    /// No directional conviction; never sized.
    Hold,
}

impl std::fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalDirection::Long => write!(f, "LONG"),
            SignalDirection::Short => write!(f, "SHORT"),
            SignalDirection::Hold => write!(f, "HOLD"),
        }
    }
}

/// Scored signal produced once per cycle per instrument and consumed
/// within that cycle.
#[derive(Debug, Clone)]
pub struct Signal {
    pub symbol: String,
    pub direction: SignalDirection,
    pub confidence: Confidence,
    /// Set when the instrument looks unstable (volatile or illiquid);
    /// the risk sizer holds these to the stricter threshold tier.
    pub high_variance: bool,
    pub snapshot: IndicatorSnapshot,
    pub generated_at: DateTime<Utc>,
}

impl Signal {
    pub fn is_actionable(&self) -> bool {
        self.direction != SignalDirection::Hold
    }
}

#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// Deadlocked votes never reach this confidence; keep it below the
    /// lowest normal threshold of any mode.
    pub deadlock_cap: f64,
    /// Realized volatility above this marks the signal high-variance.
    pub high_variance_volatility: f64,
    /// Volume z-score below this negates volume confirmation.
    pub volume_confirmation_z: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        ScorerConfig {
            deadlock_cap: 0.50,
            high_variance_volatility: 0.04,
            volume_confirmation_z: -1.0,
        }
    }
}

const MAX_VOTES: f64 = 4.0;

/// Combines indicator votes into a direction and a confidence.
///
/// Strictly deterministic: the same snapshot always yields the same
/// signal, so behavior is testable and replayable.
pub struct SignalScorer {
    config: ScorerConfig,
}

impl SignalScorer {
    pub fn new(config: ScorerConfig) -> Self {
        SignalScorer { config }
    }

    pub fn score(&self, symbol: &str, snapshot: &IndicatorSnapshot) -> Signal {
        let votes = [
            trend_vote(snapshot),
            momentum_vote(snapshot),
            macd_vote(snapshot),
            band_vote(snapshot),
        ];
        let net: i32 = votes.iter().sum();

        let direction = match net.signum() {
            1 => SignalDirection::Long,
            -1 => SignalDirection::Short,
            _ => SignalDirection::Hold,
        };

        let strength = net.unsigned_abs() as f64 / MAX_VOTES;
        let mut raw = 0.45 + 0.55 * strength;

        // Volume is a confirmation input, never a direction source:
        // expanding volume modestly boosts conviction, drying volume
        // dampens it.
        if snapshot.volume_zscore >= 0.5 {
            raw *= 1.05;
        } else if snapshot.volume_zscore <= -0.5 {
            raw *= 0.90;
        }

        // A deadlocked vote must never fabricate an actionable call.
        if direction == SignalDirection::Hold {
            raw = raw.min(self.config.deadlock_cap - 0.01);
        }

        // raw is bounded by construction; clamped() guards the float
        // edge after the volume multiplier.
        let confidence = Confidence::clamped(raw)
            .unwrap_or_else(|_| Confidence::new(0.0).expect("zero confidence is valid"));

        let high_variance = snapshot.realized_volatility > self.config.high_variance_volatility
            || snapshot.volume_zscore < self.config.volume_confirmation_z;

        Signal {
            symbol: symbol.to_string(),
            direction,
            confidence,
            high_variance,
            snapshot: snapshot.clone(),
            generated_at: Utc::now(),
        }
    }
}

/// Fast EMA above slow EMA reads long, below reads short.
fn trend_vote(snapshot: &IndicatorSnapshot) -> i32 {
    if snapshot.ema_fast > snapshot.ema_slow {
        1
    } else if snapshot.ema_fast < snapshot.ema_slow {
        -1
    } else {
        0
    }
}

/// RSI about the midline, with the extremes read as exhaustion.
fn momentum_vote(snapshot: &IndicatorSnapshot) -> i32 {
    let rsi = snapshot.rsi;
    if rsi >= 70.0 {
        -1
    } else if rsi <= 30.0 {
        1
    } else if rsi > 55.0 {
        1
    } else if rsi < 45.0 {
        -1
    } else {
        0
    }
}

fn macd_vote(snapshot: &IndicatorSnapshot) -> i32 {
    if snapshot.macd_histogram > 0.0 {
        1
    } else if snapshot.macd_histogram < 0.0 {
        -1
    } else {
        0
    }
}

/// %B extremes read mean-reverting: stretched above the band is short
/// pressure, below the band is long pressure.
fn band_vote(snapshot: &IndicatorSnapshot) -> i32 {
    if snapshot.bollinger_pctb >= 0.85 {
        -1
    } else if snapshot.bollinger_pctb <= 0.15 {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            rsi: 50.0,
            macd_histogram: 0.0,
            ema_fast: 100.0,
            ema_slow: 100.0,
            bollinger_pctb: 0.5,
            volume_zscore: 0.0,
            realized_volatility: 0.01,
            last_close: 100.0,
            computed_at: Utc::now(),
        }
    }

    fn scorer() -> SignalScorer {
        SignalScorer::new(ScorerConfig::default())
    }

    #[test]
    fn test_aligned_bullish_votes_give_long() {
        let mut snap = snapshot();
        snap.ema_fast = 105.0;
        snap.rsi = 62.0;
        snap.macd_histogram = 1.2;
        let signal = scorer().score("BTCUSDT", &snap);
        assert_eq!(signal.direction, SignalDirection::Long);
        // 3 of 4 votes aligned.
        assert!(signal.confidence.value() > 0.70);
    }

    #[test]
    fn test_aligned_bearish_votes_give_short() {
        let mut snap = snapshot();
        snap.ema_fast = 95.0;
        snap.rsi = 38.0;
        snap.macd_histogram = -0.8;
        snap.bollinger_pctb = 0.9;
        let signal = scorer().score("ETHUSDT", &snap);
        assert_eq!(signal.direction, SignalDirection::Short);
        assert!(signal.confidence.value() > 0.9);
    }

    #[test]
    fn test_deadlocked_votes_hold_below_cap() {
        // Trend long, momentum short, others neutral: net zero.
        let mut snap = snapshot();
        snap.ema_fast = 105.0;
        snap.rsi = 40.0;
        let signal = scorer().score("BTCUSDT", &snap);
        assert_eq!(signal.direction, SignalDirection::Hold);
        assert!(signal.confidence.value() < 0.50);
    }

    #[test]
    fn test_all_neutral_holds() {
        let signal = scorer().score("BTCUSDT", &snapshot());
        assert_eq!(signal.direction, SignalDirection::Hold);
        assert!(!signal.is_actionable());
    }

    #[test]
    fn test_deterministic_for_identical_snapshot() {
        let mut snap = snapshot();
        snap.ema_fast = 103.0;
        snap.macd_histogram = 0.4;
        let a = scorer().score("BTCUSDT", &snap);
        let b = scorer().score("BTCUSDT", &snap);
        assert_eq!(a.direction, b.direction);
        assert_eq!(a.confidence.value(), b.confidence.value());
        assert_eq!(a.high_variance, b.high_variance);
    }

    #[test]
    fn test_volume_confirmation_boosts_confidence() {
        let mut base = snapshot();
        base.ema_fast = 105.0;
        base.rsi = 62.0;
        base.macd_histogram = 1.0;

        let quiet = scorer().score("BTCUSDT", &base);
        base.volume_zscore = 1.5;
        let confirmed = scorer().score("BTCUSDT", &base);
        assert!(confirmed.confidence.value() > quiet.confidence.value());
    }

    #[test]
    fn test_volume_never_flips_direction() {
        let mut snap = snapshot();
        snap.ema_fast = 105.0;
        snap.rsi = 62.0;
        snap.macd_histogram = 1.0;
        for z in [-3.0, -0.5, 0.0, 0.5, 3.0] {
            snap.volume_zscore = z;
            assert_eq!(
                scorer().score("BTCUSDT", &snap).direction,
                SignalDirection::Long
            );
        }
    }

    #[test]
    fn test_high_variance_flags() {
        let mut snap = snapshot();
        snap.realized_volatility = 0.06;
        assert!(scorer().score("BTCUSDT", &snap).high_variance);

        let mut snap = snapshot();
        snap.volume_zscore = -2.0;
        assert!(scorer().score("BTCUSDT", &snap).high_variance);

        assert!(!scorer().score("BTCUSDT", &snapshot()).high_variance);
    }

    #[test]
    fn test_oversold_extreme_reads_long() {
        let mut snap = snapshot();
        snap.rsi = 25.0;
        snap.bollinger_pctb = 0.05;
        let signal = scorer().score("BTCUSDT", &snap);
        assert_eq!(signal.direction, SignalDirection::Long);
    }
}
