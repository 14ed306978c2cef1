//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - passed between the pricing components in-memory
//! - exported to JSON/CSV for the reporting layer
//! - built directly in tests without touching the filesystem

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PricingError;

/// Default weight tolerance band (fraction of the requested weight).
pub const DEFAULT_WEIGHT_TOLERANCE: f64 = 0.10;

/// Default trailing window for historical lookups.
pub const DEFAULT_RECENCY_MONTHS: u32 = 12;

/// NMFC freight class codes accepted on a shipment.
pub const FREIGHT_CLASSES: [&str; 18] = [
    "50", "55", "60", "65", "70", "77.5", "85", "92.5", "100", "110", "125", "150", "175", "200", "250",
    "300", "400", "500",
];

/// A validated NMFC freight class code.
///
/// The code is kept as the exact string the user supplied (after trimming), since
/// historical matching compares classes by string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FreightClass(String);

impl FreightClass {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for FreightClass {
    type Err = PricingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        if FREIGHT_CLASSES.contains(&code) {
            Ok(Self(code.to_string()))
        } else {
            Err(PricingError::InvalidInput(format!(
                "unknown freight class '{code}' (expected one of {})",
                FREIGHT_CLASSES.join(", ")
            )))
        }
    }
}

impl TryFrom<String> for FreightClass {
    type Error = PricingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FreightClass> for String {
    fn from(value: FreightClass) -> Self {
        value.0
    }
}

impl fmt::Display for FreightClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Package dimensions in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

/// One shipment to be priced. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRequest {
    /// Optional caller reference (e.g. a row id from a shipments file).
    pub id: Option<String>,
    pub origin_zip: String,
    pub dest_zip: String,
    /// Weight in pounds.
    pub weight: f64,
    pub class: FreightClass,
    pub dimensions: Option<Dimensions>,
}

impl ShipmentRequest {
    /// Build a shipment, rejecting empty zips, non-positive weights and bad dimensions.
    ///
    /// Short zips are allowed here; they simply never match history.
    pub fn new(
        origin_zip: &str,
        dest_zip: &str,
        weight: f64,
        class: FreightClass,
        dimensions: Option<Dimensions>,
    ) -> Result<Self, PricingError> {
        let origin_zip = origin_zip.trim();
        let dest_zip = dest_zip.trim();
        if origin_zip.is_empty() || dest_zip.is_empty() {
            return Err(PricingError::InvalidInput("origin and destination zip are required".into()));
        }
        if !weight.is_finite() || weight <= 0.0 {
            return Err(PricingError::InvalidInput(format!(
                "weight must be finite and > 0 (got {weight})"
            )));
        }
        if let Some(d) = dimensions {
            let ok = [d.length, d.width, d.height].iter().all(|v| v.is_finite() && *v > 0.0);
            if !ok {
                return Err(PricingError::InvalidInput("dimensions must be finite and > 0".into()));
            }
        }
        Ok(Self {
            id: None,
            origin_zip: origin_zip.to_string(),
            dest_zip: dest_zip.to_string(),
            weight,
            class,
            dimensions,
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Short human label for logs and reports.
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("{}->{} {}lb c{}", self.origin_zip, self.dest_zip, self.weight, self.class),
        }
    }
}

/// Result of asking one carrier account for a price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "cost", rename_all = "snake_case")]
pub enum QuoteOutcome {
    Cost(f64),
    NoQuote,
}

impl QuoteOutcome {
    /// Normalize a provider answer: anything that isn't a finite positive cost is a `NoQuote`.
    pub fn from_provider(cost: Option<f64>) -> Self {
        match cost {
            Some(c) if c.is_finite() && c > 0.0 => QuoteOutcome::Cost(c),
            _ => QuoteOutcome::NoQuote,
        }
    }

    pub fn cost(self) -> Option<f64> {
        match self {
            QuoteOutcome::Cost(c) => Some(c),
            QuoteOutcome::NoQuote => None,
        }
    }
}

/// A per-account quote for a single shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierQuote {
    pub account: String,
    pub outcome: QuoteOutcome,
}

/// A past booking from the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalBooking {
    pub origin_zip: String,
    pub dest_zip: String,
    pub weight: f64,
    pub class: String,
    pub sale_price: f64,
    pub booked_date: NaiveDate,
}

/// A carrier account as loaded from the account store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountRecord {
    pub name: String,
    pub carrier: Option<String>,
    /// Margin percent in `[0, 100)`.
    pub margin: Option<f64>,
    /// Carrier-specific fields (credentials, account numbers). Never serialized.
    #[serde(skip)]
    pub extra: BTreeMap<String, String>,
    /// Backing file.
    pub path: PathBuf,
}

impl AccountRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            carrier: None,
            margin: None,
            extra: BTreeMap::new(),
            path: PathBuf::new(),
        }
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = Some(margin);
        self
    }

    pub fn with_carrier(mut self, carrier: impl Into<String>) -> Self {
        self.carrier = Some(carrier.into());
        self
    }
}

/// Which price source produced the final price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceReason {
    /// Both sources available; margin price was at least the historical average.
    StandardMargin,
    /// Both sources available; historical average was higher.
    HistoricalAverage,
    /// No usable history; margin price only.
    StandardMarginOnly,
    /// No usable margin; historical average only.
    HistoricalOnly,
    /// The profit floor raised the price.
    ProfitFloor,
}

impl PriceReason {
    pub fn code(self) -> &'static str {
        match self {
            PriceReason::StandardMargin => "standard_margin",
            PriceReason::HistoricalAverage => "historical_average",
            PriceReason::StandardMarginOnly => "standard_margin_only",
            PriceReason::HistoricalOnly => "historical_only",
            PriceReason::ProfitFloor => "profit_floor",
        }
    }
}

/// Calculator output: every intermediate value plus the reason code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub lowest_cost: f64,
    pub margin_percent: Option<f64>,
    pub standard_price: Option<f64>,
    pub historical_price: Option<f64>,
    pub profit_floor: Option<f64>,
    pub final_price: f64,
    pub reason: PriceReason,
}

/// Final pricing decision for one shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteDecision {
    pub shipment: ShipmentRequest,
    pub account: String,
    pub carrier: Option<String>,
    #[serde(flatten)]
    pub price: PriceBreakdown,
    /// Number of ledger rows behind `historical_price`.
    pub historical_matches: usize,
    /// Every account's outcome, in the order they were asked.
    pub quotes: Vec<CarrierQuote>,
}

/// Why a required margin could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotApplicableReason {
    ZeroDesiredAsp,
    NoProcessedShipments,
}

/// Required margin for a desired ASP. Negative values are valid and kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum RequiredMargin {
    Value(f64),
    NotApplicable(NotApplicableReason),
}

impl RequiredMargin {
    pub fn value(self) -> Option<f64> {
        match self {
            RequiredMargin::Value(v) => Some(v),
            RequiredMargin::NotApplicable(_) => None,
        }
    }
}

/// Why a shipment did not contribute to an account's average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The provider returned nothing usable (absent, non-positive, or timed out).
    NoQuote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipEvent {
    pub shipment_index: usize,
    pub shipment: String,
    pub reason: SkipReason,
}

/// Batch result for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginAnalysisResult {
    pub account: String,
    pub carrier: Option<String>,
    pub desired_asp: f64,
    pub average_cost: Option<f64>,
    pub required_margin: RequiredMargin,
    pub processed: usize,
    pub skipped: usize,
    pub skips: Vec<SkipEvent>,
}

/// What the apply pass does with a negative required margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NegativeMarginPolicy {
    /// Leave the account untouched and report it.
    Reject,
    /// Write a 0% margin.
    Clamp,
}

/// Knobs for single-shipment pricing.
///
/// This is derived from CLI flags (plus environment and defaults).
#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub as_of: NaiveDate,
    /// Margin used when the winning account has none of its own.
    pub default_margin: Option<f64>,
    pub weight_tolerance: f64,
    pub recency_months: u32,
    /// Minimum dollar profit per shipment.
    pub profit_floor: Option<f64>,
}

impl PricingConfig {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            default_margin: None,
            weight_tolerance: DEFAULT_WEIGHT_TOLERANCE,
            recency_months: DEFAULT_RECENCY_MONTHS,
            profit_floor: None,
        }
    }

    pub fn validate(&self) -> Result<(), PricingError> {
        if let Some(m) = self.default_margin {
            crate::pricing::validate_margin(m)?;
        }
        if !(self.weight_tolerance.is_finite() && (0.0..1.0).contains(&self.weight_tolerance)) {
            return Err(PricingError::InvalidInput(format!(
                "weight tolerance must be in [0, 1) (got {})",
                self.weight_tolerance
            )));
        }
        if let Some(floor) = self.profit_floor {
            if !floor.is_finite() || floor < 0.0 {
                return Err(PricingError::InvalidInput(format!(
                    "profit floor must be finite and >= 0 (got {floor})"
                )));
            }
        }
        Ok(())
    }
}

/// Knobs for batch analysis.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Upper bound on concurrent provider calls.
    pub workers: usize,
    /// Deadline per provider call; `None` waits indefinitely.
    pub quote_timeout: Option<Duration>,
    pub negative_policy: NegativeMarginPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            quote_timeout: None,
            negative_policy: NegativeMarginPolicy::Reject,
        }
    }
}
