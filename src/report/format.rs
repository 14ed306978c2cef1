//! Formatted terminal output.
//!
//! Formatting lives here so the pricing code stays free of presentation and
//! output changes stay localized.

use crate::domain::{AccountRecord, MarginAnalysisResult, NotApplicableReason, QuoteDecision, QuoteOutcome, RequiredMargin};
use crate::pricing::{ApplyOutcome, target_sell};
use crate::report::summarize_analysis;

/// Format a single-shipment pricing decision.
pub fn format_quote_decision(d: &QuoteDecision) -> String {
    let mut out = String::new();
    let p = &d.price;

    out.push_str("=== fm - Quote ===\n");
    out.push_str(&format!("Shipment: {}\n", d.shipment.label()));
    if let Some(dims) = &d.shipment.dimensions {
        out.push_str(&format!("Dims: {}x{}x{} in\n", dims.length, dims.width, dims.height));
    }

    out.push_str("\nAccount quotes:\n");
    for q in &d.quotes {
        let chosen = if q.account == d.account { "*" } else { " " };
        let cost = match q.outcome {
            QuoteOutcome::Cost(c) => format!("{c:>10.2}"),
            QuoteOutcome::NoQuote => format!("{:>10}", "no quote"),
        };
        out.push_str(&format!("{chosen} {:<24} {cost}\n", truncate(&q.account, 24)));
    }

    out.push_str("\nPrice:\n");
    out.push_str(&format!(
        "- account   : {}{}\n",
        d.account,
        d.carrier.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
    ));
    out.push_str(&format!("- cost      : {:.2}\n", p.lowest_cost));
    out.push_str(&format!("- margin    : {}\n", opt_pct(p.margin_percent)));
    out.push_str(&format!("- standard  : {}\n", opt_money(p.standard_price)));
    out.push_str(&format!(
        "- historical: {} (matches={})\n",
        opt_money(p.historical_price),
        d.historical_matches
    ));
    if let Some(floor) = p.profit_floor {
        out.push_str(&format!("- floor     : {floor:.2}\n"));
    }
    out.push_str(&format!("- final     : {:.2} [{}]\n", p.final_price, p.reason.code()));
    out.push_str(&format!("- profit    : {:.2}\n", p.final_price - p.lowest_cost));

    if let Some(line) = runner_up_line(d) {
        out.push_str(&line);
    }

    out
}

/// What the next-cheapest account would earn at the winner's margin price.
fn runner_up_line(d: &QuoteDecision) -> Option<String> {
    let margin = d.price.margin_percent?;
    let (account, cost) = d
        .quotes
        .iter()
        .filter(|q| q.account != d.account)
        .filter_map(|q| q.outcome.cost().map(|c| (q.account.as_str(), c)))
        .min_by(|a, b| a.1.total_cmp(&b.1))?;
    let t = target_sell(d.price.lowest_cost, margin, cost).ok()?;
    Some(format!(
        "- runner-up : {account} at {cost:.2} would earn {:.2} at {:.2}\n",
        t.comparison_profit, t.target_sell
    ))
}

/// Format per-account analysis rows plus run totals.
pub fn format_analysis(results: &[MarginAnalysisResult]) -> String {
    let mut out = String::new();
    let desired = results.first().map(|r| r.desired_asp).unwrap_or_default();

    out.push_str(&format!("=== fm - Required margin (desired ASP {desired:.2}) ===\n"));
    out.push_str(
        format!(
            "{:<24} {:<10} {:>12} {:>14} {:>9} {:>8}\n",
            "account", "carrier", "avg_cost", "required_pct", "processed", "skipped"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<24} {:-<10} {:-<12} {:-<14} {:-<9} {:-<8}\n", "", "", "", "", "", "").trim_end());
    out.push('\n');

    for r in results {
        out.push_str(
            format!(
                "{:<24} {:<10} {:>12} {:>14} {:>9} {:>8}\n",
                truncate(&r.account, 24),
                truncate(r.carrier.as_deref().unwrap_or(""), 10),
                opt_money(r.average_cost),
                fmt_required(r.required_margin),
                r.processed,
                r.skipped,
            )
            .trim_end(),
        );
        out.push('\n');
    }

    let s = summarize_analysis(results);
    out.push_str(&format!(
        "\nAccounts: {} | solved={} negative={} n/a={} | quotes ok={} skipped={}\n",
        s.accounts, s.solved, s.negative, s.not_applicable, s.processed, s.skipped
    ));
    out
}

/// Format the outcome of an apply pass.
pub fn format_apply_outcomes(outcomes: &[ApplyOutcome]) -> String {
    let mut out = String::from("Apply:\n");
    for o in outcomes {
        let line = match o {
            ApplyOutcome::Applied { account, margin } => format!("  {account}: margin set to {margin:.2}%"),
            ApplyOutcome::NotApplicable { account, reason } => {
                format!("  {account}: unchanged ({})", not_applicable_text(*reason))
            }
            ApplyOutcome::RejectedNegative { account, margin } => {
                format!("  {account}: unchanged (negative margin {margin:.2}% rejected)")
            }
            ApplyOutcome::Failed { account, error } => format!("  {account}: FAILED ({error})"),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Format the account list.
pub fn format_accounts(records: &[AccountRecord]) -> String {
    let mut out = String::new();
    out.push_str(format!("{:<24} {:<10} {:>8} {:<}\n", "account", "carrier", "margin", "file").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<24} {:-<10} {:-<8} {:-<4}\n", "", "", "", "").trim_end());
    out.push('\n');
    for r in records {
        let file = r.path.file_name().map(|f| f.to_string_lossy().into_owned()).unwrap_or_default();
        out.push_str(
            format!(
                "{:<24} {:<10} {:>8} {}\n",
                truncate(&r.name, 24),
                truncate(r.carrier.as_deref().unwrap_or(""), 10),
                opt_pct(r.margin),
                file
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

fn fmt_required(m: RequiredMargin) -> String {
    match m {
        RequiredMargin::Value(v) => format!("{v:.2}%"),
        RequiredMargin::NotApplicable(_) => "n/a".to_string(),
    }
}

fn not_applicable_text(reason: NotApplicableReason) -> &'static str {
    match reason {
        NotApplicableReason::ZeroDesiredAsp => "desired ASP is zero",
        NotApplicableReason::NoProcessedShipments => "no shipment was quoted",
    }
}

fn opt_money(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "-".to_string())
}

fn opt_pct(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.2}%")).unwrap_or_else(|| "-".to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CarrierQuote, FreightClass, PriceBreakdown, PriceReason, ShipmentRequest};
    use crate::error::PricingError;

    fn decision() -> QuoteDecision {
        let class: FreightClass = "70".parse().unwrap();
        QuoteDecision {
            shipment: ShipmentRequest::new("30301", "10001", 500.0, class, None).unwrap().with_id("S1"),
            account: "acme".to_string(),
            carrier: Some("ACME".to_string()),
            price: PriceBreakdown {
                lowest_cost: 100.0,
                margin_percent: Some(20.0),
                standard_price: Some(125.0),
                historical_price: Some(150.0),
                profit_floor: None,
                final_price: 150.0,
                reason: PriceReason::HistoricalAverage,
            },
            historical_matches: 2,
            quotes: vec![
                CarrierQuote {
                    account: "acme".to_string(),
                    outcome: QuoteOutcome::Cost(100.0),
                },
                CarrierQuote {
                    account: "blue".to_string(),
                    outcome: QuoteOutcome::NoQuote,
                },
            ],
        }
    }

    #[test]
    fn quote_output_marks_winner() {
        let text = format_quote_decision(&decision());
        assert!(text.contains("* acme"));
        assert!(text.contains("no quote"));
        assert!(text.contains("150.00 [historical_average]"));
        assert!(text.contains("(matches=2)"));
        // Only one account quoted, so there is no runner-up.
        assert!(!text.contains("runner-up"));
    }

    #[test]
    fn runner_up_earnings_at_winner_price() {
        let mut d = decision();
        d.quotes[1].outcome = QuoteOutcome::Cost(110.0);
        let text = format_quote_decision(&d);
        assert!(text.contains("- runner-up : blue at 110.00 would earn 15.00 at 125.00"));
    }

    #[test]
    fn apply_outcomes_render_each_case() {
        let text = format_apply_outcomes(&[
            ApplyOutcome::Applied {
                account: "a".to_string(),
                margin: 25.0,
            },
            ApplyOutcome::RejectedNegative {
                account: "b".to_string(),
                margin: -3.5,
            },
            ApplyOutcome::Failed {
                account: "c".to_string(),
                error: PricingError::NotFound("account 'c'".to_string()),
            },
        ]);
        assert!(text.contains("a: margin set to 25.00%"));
        assert!(text.contains("-3.50% rejected"));
        assert!(text.contains("c: FAILED"));
    }

    #[test]
    fn truncate_long_names() {
        assert_eq!(truncate("abcdef", 4), "abc.");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
