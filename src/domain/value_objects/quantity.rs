#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Quantity(f64);

impl Quantity {
    pub fn new(value: f64) -> Result<Self, String> {
        if !value.is_finite() {
            return Err("Quantity must be finite".to_string());
        }
        if value >= 0.0 {
            Ok(Quantity(value))
        } else {
            Err("Quantity must be non-negative".to_string())
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }

    pub fn multiply(&self, factor: f64) -> Result<Quantity, String> {
        if !factor.is_finite() {
            return Err("Factor must be finite".to_string());
        }
        Quantity::new(self.0 * factor)
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_new_valid() {
        let qty = Quantity::new(100.0);
        assert!(qty.is_ok());
        assert_eq!(qty.unwrap().value(), 100.0);
    }

    #[test]
    fn test_quantity_new_negative() {
        let qty = Quantity::new(-5.0);
        assert!(qty.is_err());
        assert_eq!(qty.unwrap_err(), "Quantity must be non-negative");
    }

    #[test]
    fn test_quantity_new_zero() {
        let qty = Quantity::new(0.0).unwrap();
        assert!(qty.is_zero());
    }

    #[test]
    fn test_quantity_multiply() {
        let qty = Quantity::new(10.0).unwrap();
        let result = qty.multiply(2.5).unwrap();
        assert_eq!(result.value(), 25.0);
    }

    #[test]
    fn test_quantity_multiply_nan() {
        let qty = Quantity::new(10.0).unwrap();
        assert!(qty.multiply(f64::NAN).is_err());
    }
}
