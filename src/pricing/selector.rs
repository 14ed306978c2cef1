//! Minimum rate selection across carrier accounts.

use crate::domain::{CarrierQuote, QuoteOutcome};

/// The winning account and its cost.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedRate {
    pub account: String,
    pub cost: f64,
}

/// Pick the lowest strictly-positive cost, or `None` if no account qualifies.
///
/// Among equal lowest costs the first one encountered wins. Callers must not
/// depend on which account that is.
pub fn select_minimum_rate(quotes: &[CarrierQuote]) -> Option<SelectedRate> {
    let mut best: Option<&CarrierQuote> = None;
    let mut best_cost = f64::INFINITY;

    for q in quotes {
        let QuoteOutcome::Cost(cost) = q.outcome else { continue };
        if !(cost.is_finite() && cost > 0.0) {
            continue;
        }
        if cost < best_cost {
            best_cost = cost;
            best = Some(q);
        }
    }

    best.map(|q| SelectedRate {
        account: q.account.clone(),
        cost: best_cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(account: &str, outcome: QuoteOutcome) -> CarrierQuote {
        CarrierQuote {
            account: account.to_string(),
            outcome,
        }
    }

    #[test]
    fn picks_lowest_positive_cost() {
        let quotes = vec![
            quote("a", QuoteOutcome::Cost(180.0)),
            quote("b", QuoteOutcome::NoQuote),
            quote("c", QuoteOutcome::Cost(142.5)),
            quote("d", QuoteOutcome::Cost(0.0)),
            quote("e", QuoteOutcome::Cost(-10.0)),
        ];
        let best = select_minimum_rate(&quotes).unwrap();
        assert_eq!(best.account, "c");
        assert!((best.cost - 142.5).abs() < 1e-12);
    }

    #[test]
    fn no_valid_rate_when_everything_failed() {
        let quotes = vec![quote("a", QuoteOutcome::NoQuote), quote("b", QuoteOutcome::Cost(0.0))];
        assert!(select_minimum_rate(&quotes).is_none());
        assert!(select_minimum_rate(&[]).is_none());
    }

    #[test]
    fn tie_returns_one_of_the_lowest() {
        let quotes = vec![
            quote("a", QuoteOutcome::Cost(99.0)),
            quote("b", QuoteOutcome::Cost(99.0)),
            quote("c", QuoteOutcome::Cost(120.0)),
        ];
        let best = select_minimum_rate(&quotes).unwrap();
        assert!(best.account == "a" || best.account == "b");
        assert!((best.cost - 99.0).abs() < 1e-12);
    }
}
