//! Export decisions and analysis results.
//!
//! CSV is meant for spreadsheets; JSON carries the full structured record
//! (including skip events) for downstream reporting.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::domain::{MarginAnalysisResult, RequiredMargin};
use crate::error::AppError;

#[derive(Debug, Serialize)]
struct AnalysisRow<'a> {
    account: &'a str,
    carrier: &'a str,
    desired_asp: f64,
    average_cost: Option<f64>,
    required_margin: Option<f64>,
    status: &'static str,
    processed: usize,
    skipped: usize,
}

/// Write one CSV row per account.
pub fn write_analysis_csv(path: &Path, results: &[MarginAnalysisResult]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;

    for r in results {
        let (required_margin, status) = match r.required_margin {
            RequiredMargin::Value(v) => (Some(v), "ok"),
            RequiredMargin::NotApplicable(_) => (None, "not_applicable"),
        };
        writer
            .serialize(AnalysisRow {
                account: &r.account,
                carrier: r.carrier.as_deref().unwrap_or(""),
                desired_asp: r.desired_asp,
                average_cost: r.average_cost,
                required_margin,
                status,
                processed: r.processed,
                skipped: r.skipped,
            })
            .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}

/// Pretty-printed JSON of any serializable result.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value).map_err(|e| AppError::new(4, format!("Failed to encode JSON: {e}")))
}

/// Write `value` as pretty JSON to `path`.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create JSON '{}': {e}", path.display())))?;
    let json = to_json(value)?;
    writeln!(file, "{json}").map_err(|e| AppError::new(2, format!("Failed to write JSON: {e}")))?;
    Ok(())
}
