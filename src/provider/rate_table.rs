//! File-backed quote provider driven by a CSV rate table.
//!
//! Schema (header names are case-insensitive):
//!
//! ```text
//! account,origin_zip3,dest_zip3,class,rate_per_cwt,min_charge
//! acme-ltl,303,100,70,38.50,145
//! acme-ltl,303,*,*,52.00,160
//! ```
//!
//! `*` matches anything. When several rows match, the most specific one wins
//! (fewest wildcards), then file order.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use tracing::debug;

use crate::domain::{AccountRecord, ShipmentRequest};
use crate::error::AppError;
use crate::io::ingest::{RowError, build_header_map, get_required, parse_non_negative, parse_positive};
use crate::pricing::zip3;
use crate::provider::QuoteProvider;

const WILDCARD: &str = "*";

/// One rate table line.
#[derive(Debug, Clone, PartialEq)]
pub struct RateRow {
    pub account: String,
    pub origin_zip3: String,
    pub dest_zip3: String,
    pub class: String,
    /// Dollars per hundred pounds.
    pub rate_per_cwt: f64,
    pub min_charge: f64,
}

impl RateRow {
    fn matches(&self, origin: &str, dest: &str, class: &str) -> bool {
        field_matches(&self.origin_zip3, origin) && field_matches(&self.dest_zip3, dest) && field_matches(&self.class, class)
    }

    fn specificity(&self) -> usize {
        [&self.origin_zip3, &self.dest_zip3, &self.class]
            .iter()
            .filter(|f| f.as_str() != WILDCARD)
            .count()
    }

    /// Linehaul cost for `weight` pounds, never below the minimum charge.
    pub fn cost(&self, weight: f64) -> f64 {
        (weight / 100.0 * self.rate_per_cwt).max(self.min_charge)
    }
}

fn field_matches(pattern: &str, value: &str) -> bool {
    pattern == WILDCARD || pattern == value
}

/// Rate rows grouped by account name.
#[derive(Debug, Clone, Default)]
pub struct RateTableProvider {
    by_account: HashMap<String, Vec<RateRow>>,
}

impl RateTableProvider {
    pub fn from_rows(rows: Vec<RateRow>) -> Self {
        let mut by_account: HashMap<String, Vec<RateRow>> = HashMap::new();
        for row in rows {
            by_account.entry(row.account.clone()).or_default().push(row);
        }
        Self { by_account }
    }

    /// Load a rate table CSV. Bad rows are returned alongside the provider.
    pub fn load(path: &Path) -> Result<(Self, Vec<RowError>), AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::new(2, format!("Failed to open rate table '{}': {e}", path.display())))?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let headers = reader
            .headers()
            .map_err(|e| AppError::new(2, format!("Failed to read rate table headers: {e}")))?
            .clone();
        let header_map = build_header_map(&headers);
        for col in ["account", "origin_zip3", "dest_zip3", "class", "rate_per_cwt"] {
            if !header_map.contains_key(col) {
                return Err(AppError::new(2, format!("Rate table is missing required column: `{col}`")));
            }
        }

        let mut rows = Vec::new();
        let mut row_errors = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let line = idx + 2;
            let parsed = result
                .map_err(|e| format!("CSV parse error: {e}"))
                .and_then(|record| {
                    let min_charge = match header_map.get("min_charge").and_then(|i| record.get(*i)) {
                        Some(s) if !s.trim().is_empty() => parse_non_negative(s, "min_charge")?,
                        _ => 0.0,
                    };
                    Ok(RateRow {
                        account: get_required(&record, &header_map, "account")?.to_string(),
                        origin_zip3: get_required(&record, &header_map, "origin_zip3")?.to_string(),
                        dest_zip3: get_required(&record, &header_map, "dest_zip3")?.to_string(),
                        class: get_required(&record, &header_map, "class")?.to_string(),
                        rate_per_cwt: parse_positive(get_required(&record, &header_map, "rate_per_cwt")?, "rate_per_cwt")?,
                        min_charge,
                    })
                });
            match parsed {
                Ok(row) => rows.push(row),
                Err(message) => row_errors.push(RowError { line, id: None, message }),
            }
        }

        debug!(rows = rows.len(), errors = row_errors.len(), path = %path.display(), "loaded rate table");
        Ok((Self::from_rows(rows), row_errors))
    }

    pub fn accounts(&self) -> impl Iterator<Item = &str> {
        self.by_account.keys().map(String::as_str)
    }
}

impl QuoteProvider for RateTableProvider {
    fn quote(&self, account: &AccountRecord, shipment: &ShipmentRequest) -> Option<f64> {
        let rows = self.by_account.get(&account.name)?;
        let origin = zip3(&shipment.origin_zip)?;
        let dest = zip3(&shipment.dest_zip)?;
        let class = shipment.class.as_str();

        let mut best: Option<&RateRow> = None;
        for row in rows.iter().filter(|r| r.matches(origin, dest, class)) {
            if best.is_none_or(|b| row.specificity() > b.specificity()) {
                best = Some(row);
            }
        }
        best.map(|row| row.cost(shipment.weight))
    }
}
