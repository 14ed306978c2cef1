//! Reporting utilities: analysis summaries and formatted terminal output.

use crate::domain::{MarginAnalysisResult, RequiredMargin};

pub mod format;

pub use format::*;

/// Totals across one analysis run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisSummary {
    pub accounts: usize,
    pub solved: usize,
    pub not_applicable: usize,
    /// Accounts whose costs already exceed the desired ASP.
    pub negative: usize,
    pub processed: usize,
    pub skipped: usize,
}

pub fn summarize_analysis(results: &[MarginAnalysisResult]) -> AnalysisSummary {
    let mut s = AnalysisSummary {
        accounts: results.len(),
        ..AnalysisSummary::default()
    };
    for r in results {
        s.processed += r.processed;
        s.skipped += r.skipped;
        match r.required_margin {
            RequiredMargin::Value(v) => {
                s.solved += 1;
                if v < 0.0 {
                    s.negative += 1;
                }
            }
            RequiredMargin::NotApplicable(_) => s.not_applicable += 1,
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NotApplicableReason;

    fn result(margin: RequiredMargin, processed: usize, skipped: usize) -> MarginAnalysisResult {
        MarginAnalysisResult {
            account: "a".to_string(),
            carrier: None,
            desired_asp: 200.0,
            average_cost: None,
            required_margin: margin,
            processed,
            skipped,
            skips: Vec::new(),
        }
    }

    #[test]
    fn summary_counts() {
        let results = vec![
            result(RequiredMargin::Value(25.0), 4, 1),
            result(RequiredMargin::Value(-5.0), 5, 0),
            result(RequiredMargin::NotApplicable(NotApplicableReason::NoProcessedShipments), 0, 5),
        ];
        let s = summarize_analysis(&results);
        assert_eq!(s.accounts, 3);
        assert_eq!(s.solved, 2);
        assert_eq!(s.negative, 1);
        assert_eq!(s.not_applicable, 1);
        assert_eq!(s.processed, 9);
        assert_eq!(s.skipped, 6);
    }
}
