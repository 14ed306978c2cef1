//! Historical price matching.
//!
//! A booking is "comparable" to a query when it was booked inside the recency
//! window, shares the zip3 lane, has the exact same class string, and its
//! weight sits inside the symmetric tolerance band around the query weight.
//!
//! Matching is deliberately coarse (zip3 + weight band) because history is
//! sparse at the 5-digit zip level.

use chrono::{Months, NaiveDate};

use crate::domain::{DEFAULT_RECENCY_MONTHS, DEFAULT_WEIGHT_TOLERANCE, HistoricalBooking};
use crate::pricing::round_cents;

/// Absolute slack (pounds) at the band endpoints. Covers the rounding left by
/// `w * (1 ± tol)` and nothing more.
const BAND_EPS_LBS: f64 = 1e-9;

/// What to look for in the ledger.
#[derive(Debug, Clone)]
pub struct HistoricalQuery<'a> {
    pub origin_zip: &'a str,
    pub dest_zip: &'a str,
    pub weight: f64,
    pub class: &'a str,
}

/// Recency window and weight band used for matching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchWindow {
    pub as_of: NaiveDate,
    pub recency_months: u32,
    pub weight_tolerance: f64,
}

impl MatchWindow {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            recency_months: DEFAULT_RECENCY_MONTHS,
            weight_tolerance: DEFAULT_WEIGHT_TOLERANCE,
        }
    }

    /// Earliest booked date still considered recent.
    pub fn cutoff(&self) -> NaiveDate {
        self.as_of
            .checked_sub_months(Months::new(self.recency_months))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Inclusive `[lo, hi]` weight band around `weight`.
    pub fn weight_band(&self, weight: f64) -> (f64, f64) {
        let lo = weight * (1.0 - self.weight_tolerance);
        let hi = weight * (1.0 + self.weight_tolerance);
        (lo - BAND_EPS_LBS, hi + BAND_EPS_LBS)
    }
}

/// Mean sale price of the comparable bookings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoricalMatch {
    /// Mean sale price, rounded to cents.
    pub average_price: f64,
    pub matched: usize,
}

/// First three characters of a zip, or `None` if it is too short.
pub fn zip3(zip: &str) -> Option<&str> {
    let zip = zip.trim();
    let end = zip.char_indices().nth(3).map(|(i, _)| i).unwrap_or(zip.len());
    if zip[..end].chars().count() < 3 {
        return None;
    }
    Some(&zip[..end])
}

/// Average the sale prices of bookings comparable to `query`.
///
/// Returns `None` ("no match") when either query zip is shorter than three
/// characters or nothing in the ledger qualifies.
pub fn find_historical_average(
    query: &HistoricalQuery<'_>,
    ledger: &[HistoricalBooking],
    window: &MatchWindow,
) -> Option<HistoricalMatch> {
    let origin = zip3(query.origin_zip)?;
    let dest = zip3(query.dest_zip)?;
    if !(query.weight.is_finite() && query.weight > 0.0) {
        return None;
    }

    let cutoff = window.cutoff();
    let (lo, hi) = window.weight_band(query.weight);
    let class = query.class.trim();

    let mut sum = 0.0;
    let mut matched = 0usize;
    for row in ledger {
        if row.booked_date < cutoff {
            continue;
        }
        if zip3(&row.origin_zip) != Some(origin) || zip3(&row.dest_zip) != Some(dest) {
            continue;
        }
        if row.class.trim() != class {
            continue;
        }
        if !(row.weight >= lo && row.weight <= hi) {
            continue;
        }
        if !(row.sale_price.is_finite() && row.sale_price > 0.0) {
            continue;
        }
        sum += row.sale_price;
        matched += 1;
    }

    if matched == 0 {
        return None;
    }

    Some(HistoricalMatch {
        average_price: round_cents(sum / matched as f64),
        matched,
    })
}
