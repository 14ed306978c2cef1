//! Quote price calculation.
//!
//! Pricing policy: never below the configured margin, never below recent market
//! evidence, never below the hard profit floor.
//!
//! ```text
//! standard = cost / (1 - margin/100)
//! final    = max(standard, historical)   (whichever are available)
//! final    = max(final, cost + floor)    (if a floor is configured)
//! ```

use crate::domain::{PriceBreakdown, PriceReason};
use crate::error::PricingError;
use crate::pricing::{round_cents, validate_margin};

/// Inputs to a single price calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceInputs {
    pub lowest_cost: f64,
    pub margin_percent: Option<f64>,
    pub historical_price: Option<f64>,
    pub profit_floor: Option<f64>,
}

/// Cost marked up so that `margin` percent of the resulting price is profit.
pub fn standard_price(cost: f64, margin: f64) -> Result<f64, PricingError> {
    if !(cost.is_finite() && cost > 0.0) {
        return Err(PricingError::InvalidBaseCost(cost));
    }
    if margin == 100.0 {
        return Err(PricingError::DivisionByZero);
    }
    let margin = validate_margin(margin)?;
    Ok(cost / (1.0 - margin / 100.0))
}

/// Margin percent implied by selling at `price` with cost `cost`.
pub fn implied_margin(cost: f64, price: f64) -> Option<f64> {
    if !(price.is_finite() && price > 0.0) {
        return None;
    }
    Some((price - cost) / price * 100.0)
}

/// Reconcile margin price, historical average, and profit floor into a final price.
pub fn calculate_price(inputs: &PriceInputs) -> Result<PriceBreakdown, PricingError> {
    let cost = inputs.lowest_cost;
    if !(cost.is_finite() && cost > 0.0) {
        return Err(PricingError::InvalidBaseCost(cost));
    }

    let standard = inputs
        .margin_percent
        .map(|m| standard_price(cost, m))
        .transpose()?
        .filter(|p| p.is_finite() && *p > 0.0);
    let historical = inputs.historical_price.filter(|p| p.is_finite() && *p > 0.0);

    let (mut final_price, mut reason) = match (standard, historical) {
        (Some(s), Some(h)) if h > s => (h, PriceReason::HistoricalAverage),
        (Some(s), Some(_)) => (s, PriceReason::StandardMargin),
        (Some(s), None) => (s, PriceReason::StandardMarginOnly),
        (None, Some(h)) => (h, PriceReason::HistoricalOnly),
        (None, None) => return Err(PricingError::NoValidPriceSource),
    };

    if let Some(floor) = inputs.profit_floor {
        if !floor.is_finite() || floor < 0.0 {
            return Err(PricingError::InvalidInput(format!(
                "profit floor must be finite and >= 0 (got {floor})"
            )));
        }
        if final_price - cost < floor {
            final_price = cost + floor;
            reason = PriceReason::ProfitFloor;
        }
    }

    Ok(PriceBreakdown {
        lowest_cost: cost,
        margin_percent: inputs.margin_percent,
        standard_price: standard,
        historical_price: historical,
        profit_floor: inputs.profit_floor,
        final_price: round_cents(final_price),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(cost: f64, margin: Option<f64>, historical: Option<f64>) -> PriceInputs {
        PriceInputs {
            lowest_cost: cost,
            margin_percent: margin,
            historical_price: historical,
            profit_floor: None,
        }
    }

    #[test]
    fn historical_wins_when_higher() {
        let out = calculate_price(&inputs(100.0, Some(20.0), Some(150.0))).unwrap();
        assert!((out.standard_price.unwrap() - 125.0).abs() < 1e-9);
        assert_eq!(out.final_price, 150.0);
        assert_eq!(out.reason, PriceReason::HistoricalAverage);
    }

    #[test]
    fn margin_wins_when_history_is_lower() {
        let out = calculate_price(&inputs(100.0, Some(20.0), Some(90.0))).unwrap();
        assert_eq!(out.final_price, 125.0);
        assert_eq!(out.reason, PriceReason::StandardMargin);
    }

    #[test]
    fn single_source_fallbacks() {
        let out = calculate_price(&inputs(100.0, Some(20.0), None)).unwrap();
        assert_eq!(out.reason, PriceReason::StandardMarginOnly);
        assert_eq!(out.final_price, 125.0);

        let out = calculate_price(&inputs(100.0, None, Some(140.0))).unwrap();
        assert_eq!(out.reason, PriceReason::HistoricalOnly);
        assert_eq!(out.final_price, 140.0);

        // A non-positive historical value counts as absent.
        let out = calculate_price(&inputs(100.0, Some(20.0), Some(0.0))).unwrap();
        assert_eq!(out.reason, PriceReason::StandardMarginOnly);
        assert!(out.historical_price.is_none());
    }

    #[test]
    fn no_price_source() {
        assert!(matches!(
            calculate_price(&inputs(100.0, None, None)),
            Err(PricingError::NoValidPriceSource)
        ));
    }

    #[test]
    fn invalid_cost_and_margins() {
        assert!(matches!(
            calculate_price(&inputs(0.0, Some(20.0), None)),
            Err(PricingError::InvalidBaseCost(_))
        ));
        assert!(matches!(
            calculate_price(&inputs(100.0, Some(100.0), None)),
            Err(PricingError::DivisionByZero)
        ));
        assert!(matches!(
            calculate_price(&inputs(100.0, Some(120.0), None)),
            Err(PricingError::InvalidMargin(_))
        ));
    }

    #[test]
    fn zero_margin_is_cost() {
        let out = calculate_price(&inputs(87.35, Some(0.0), None)).unwrap();
        assert_eq!(out.final_price, 87.35);
    }

    #[test]
    fn profit_floor_overrides() {
        let mut i = inputs(100.0, Some(5.0), Some(102.0));
        i.profit_floor = Some(25.0);
        let out = calculate_price(&i).unwrap();
        assert_eq!(out.final_price, 125.0);
        assert_eq!(out.reason, PriceReason::ProfitFloor);

        // Floor already satisfied: no override.
        i.profit_floor = Some(1.0);
        let out = calculate_price(&i).unwrap();
        assert_eq!(out.reason, PriceReason::StandardMargin);
        assert_eq!(out.final_price, 105.26);
    }

    #[test]
    fn final_price_is_rounded() {
        let out = calculate_price(&inputs(100.0, Some(33.0), None)).unwrap();
        // 100 / 0.67 = 149.2537...
        assert_eq!(out.final_price, 149.25);
    }

    #[test]
    fn margin_round_trip_over_grid() {
        for cost in [1.0, 57.3, 250.0, 4999.99] {
            for m in [0.0, 0.5, 12.5, 20.0, 45.0, 80.0, 99.0] {
                let price = standard_price(cost, m).unwrap();
                if m > 0.0 {
                    assert!(price > cost);
                } else {
                    assert!((price - cost).abs() < 1e-9);
                }
                let back = implied_margin(cost, price).unwrap();
                assert!((back - m).abs() < 1e-6, "cost={cost} m={m} back={back}");
            }
        }
    }
}
