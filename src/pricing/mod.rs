//! Pricing and margin decision core.
//!
//! - cheapest valid account quote (`selector`)
//! - comparable historical bookings (`matcher`)
//! - margin/history/floor reconciliation (`calculator`)
//! - required-margin inversion and the apply pass (`solver`)

pub mod calculator;
pub mod matcher;
pub mod selector;
pub mod solver;

pub use calculator::*;
pub use matcher::*;
pub use selector::*;
pub use solver::*;

use crate::error::PricingError;

/// Check that a margin percent lies in `[0, 100)`.
pub fn validate_margin(margin: f64) -> Result<f64, PricingError> {
    if margin.is_finite() && (0.0..100.0).contains(&margin) {
        Ok(margin)
    } else {
        Err(PricingError::InvalidMargin(margin))
    }
}

/// Round a dollar (or percent) amount to 2 decimals.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margin_bounds() {
        assert!(validate_margin(0.0).is_ok());
        assert!(validate_margin(99.99).is_ok());
        assert!(validate_margin(100.0).is_err());
        assert!(validate_margin(-0.01).is_err());
        assert!(validate_margin(f64::NAN).is_err());
    }

    #[test]
    fn round_cents_half_away_from_zero() {
        assert_eq!(round_cents(123.455_000_1), 123.46);
        assert_eq!(round_cents(10.0), 10.0);
        assert_eq!(round_cents(-2.345_1), -2.35);
    }
}
