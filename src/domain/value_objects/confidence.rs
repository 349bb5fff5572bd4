/// Directional confidence in [0.0, 1.0].
///
/// Construction clamps nothing: out-of-range or non-finite inputs are
/// rejected so a bad indicator value can never masquerade as certainty.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Confidence(f64);

impl Confidence {
    pub fn new(value: f64) -> Result<Self, String> {
        if !value.is_finite() {
            return Err("Confidence must be finite".to_string());
        }
        if (0.0..=1.0).contains(&value) {
            Ok(Confidence(value))
        } else {
            Err(format!("Confidence must be in [0, 1], got {}", value))
        }
    }

    /// Build from an unbounded score, clamping into [0, 1].
    /// Non-finite scores still fail.
    pub fn clamped(value: f64) -> Result<Self, String> {
        if !value.is_finite() {
            return Err("Confidence must be finite".to_string());
        }
        Ok(Confidence(value.clamp(0.0, 1.0)))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn meets(&self, threshold: f64) -> bool {
        self.0 >= threshold
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}
