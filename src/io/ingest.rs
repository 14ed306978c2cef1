//! CSV ingest for the booking ledger and batch shipment files.
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Missing ledger is not an error**: no history simply means no match

use std::collections::HashMap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use tracing::{debug, warn};

use crate::domain::{Dimensions, FreightClass, HistoricalBooking, ShipmentRequest};
use crate::error::AppError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub id: Option<String>,
    pub message: String,
}

/// Loaded booking ledger.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    pub bookings: Vec<HistoricalBooking>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Loaded batch of shipments.
#[derive(Debug, Clone)]
pub struct ShipmentBatch {
    pub shipments: Vec<ShipmentRequest>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Accepted spellings per logical ledger column.
const LEDGER_COLUMNS: [(&str, &[&str]); 6] = [
    ("origin_zip", &["origin_zip", "origin"]),
    ("dest_zip", &["dest_zip", "destination_zip", "destination"]),
    ("weight", &["weight"]),
    ("class", &["class", "freight_class"]),
    ("sale_price", &["sale_price", "price"]),
    ("booked_date", &["booked_date", "date"]),
];

/// Load the booking ledger. A missing file yields an empty ledger.
pub fn load_ledger(path: &Path) -> Result<Ledger, AppError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "ledger not found; historical matching disabled");
            return Ok(Ledger::default());
        }
        Err(e) => {
            return Err(AppError::new(
                2,
                format!("Failed to open ledger '{}': {e}", path.display()),
            ));
        }
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read ledger headers: {e}")))?
        .clone();
    let header_map = resolve_aliases(&build_header_map(&headers), &LEDGER_COLUMNS, "ledger")?;

    let mut ledger = Ledger::default();
    for (idx, result) in reader.records().enumerate() {
        // +2: records() starts after the header line, and lines are 1-based.
        let line = idx + 2;
        ledger.rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                ledger.row_errors.push(RowError {
                    line,
                    id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_booking(&record, &header_map) {
            Ok(b) => ledger.bookings.push(b),
            Err(message) => ledger.row_errors.push(RowError { line, id: None, message }),
        }
    }

    debug!(
        rows_read = ledger.rows_read,
        bookings = ledger.bookings.len(),
        skipped = ledger.row_errors.len(),
        "loaded ledger"
    );
    Ok(ledger)
}

fn parse_booking(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<HistoricalBooking, String> {
    Ok(HistoricalBooking {
        origin_zip: get_required(record, header_map, "origin_zip")?.to_string(),
        dest_zip: get_required(record, header_map, "dest_zip")?.to_string(),
        weight: parse_positive(get_required(record, header_map, "weight")?, "weight")?,
        class: get_required(record, header_map, "class")?.to_string(),
        sale_price: parse_positive(get_required(record, header_map, "sale_price")?, "sale_price")?,
        booked_date: parse_date(get_required(record, header_map, "booked_date")?)?,
    })
}

const SHIPMENT_COLUMNS: [(&str, &[&str]); 4] = [
    ("origin_zip", &["origin_zip", "origin"]),
    ("dest_zip", &["dest_zip", "destination_zip", "destination"]),
    ("weight", &["weight"]),
    ("class", &["class", "freight_class"]),
];

/// Load a shipments CSV for batch analysis.
pub fn load_shipments(path: &Path) -> Result<ShipmentBatch, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open shipments CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read shipments headers: {e}")))?
        .clone();
    let header_map = resolve_aliases(&build_header_map(&headers), &SHIPMENT_COLUMNS, "shipments")?;

    let mut shipments = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let id = get_optional(&record, &header_map, "id").map(str::to_string);
        match parse_shipment(&record, &header_map) {
            Ok(s) => shipments.push(match &id {
                Some(id) => s.with_id(id.clone()),
                None => s.with_id(format!("line{line}")),
            }),
            Err(message) => row_errors.push(RowError { line, id, message }),
        }
    }

    if shipments.is_empty() {
        return Err(AppError::new(3, "No valid shipments remain after validation."));
    }

    Ok(ShipmentBatch {
        shipments,
        row_errors,
        rows_read,
    })
}

fn parse_shipment(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<ShipmentRequest, String> {
    let origin = get_required(record, header_map, "origin_zip")?;
    let dest = get_required(record, header_map, "dest_zip")?;
    let weight = parse_positive(get_required(record, header_map, "weight")?, "weight")?;
    let class: FreightClass = get_required(record, header_map, "class")?
        .parse()
        .map_err(|e: crate::error::PricingError| e.to_string())?;

    let dims = [
        get_optional(record, header_map, "length"),
        get_optional(record, header_map, "width"),
        get_optional(record, header_map, "height"),
    ];
    let dimensions = match dims {
        [None, None, None] => None,
        [Some(l), Some(w), Some(h)] => Some(Dimensions {
            length: parse_positive(l, "length")?,
            width: parse_positive(w, "width")?,
            height: parse_positive(h, "height")?,
        }),
        _ => return Err("Dimensions need all of `length`, `width`, `height`.".to_string()),
    };

    ShipmentRequest::new(origin, dest, weight, class, dimensions).map_err(|e| e.to_string())
}

pub(crate) fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

/// Map each logical column to the first alias present in the file, keeping any
/// other columns under their own names.
fn resolve_aliases(
    header_map: &HashMap<String, usize>,
    columns: &[(&str, &[&str])],
    what: &str,
) -> Result<HashMap<String, usize>, AppError> {
    let mut out = header_map.clone();
    for (canonical, aliases) in columns {
        let Some(idx) = aliases.iter().find_map(|a| header_map.get(*a)) else {
            return Err(AppError::new(
                2,
                format!("Missing required {what} column: `{canonical}` (accepted: {})", aliases.join(", ")),
            ));
        };
        out.insert(canonical.to_string(), *idx);
    }
    Ok(out)
}

pub(crate) fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

pub(crate) fn get_optional<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, String> {
    const FMTS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%m-%d-%Y"];
    for fmt in FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    Err(format!(
        "Invalid date '{s}'. Expected one of: YYYY-MM-DD, MM/DD/YYYY, YYYY/MM/DD, MM-DD-YYYY."
    ))
}

/// Parse a finite number, tolerating `$` and thousands separators.
fn parse_number(s: &str, name: &str) -> Result<f64, String> {
    let cleaned: String = s.trim().chars().filter(|c| *c != '$' && *c != ',').collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("Invalid `{name}` value '{s}'."))
}

pub(crate) fn parse_positive(s: &str, name: &str) -> Result<f64, String> {
    let v = parse_number(s, name)?;
    if v <= 0.0 {
        return Err(format!("`{name}` must be > 0 (got {v})."));
    }
    Ok(v)
}

pub(crate) fn parse_non_negative(s: &str, name: &str) -> Result<f64, String> {
    let v = parse_number(s, name)?;
    if v < 0.0 {
        return Err(format!("`{name}` must be >= 0 (got {v})."));
    }
    Ok(v)
}
