//! Required-margin solving.
//!
//! Two inversions of the pricing formula:
//!
//! - per shipment: the sell price a margin implies, and what a second account
//!   would earn at that price (`target_sell`)
//! - per batch: the margin an account needs so that its average cost sells at a
//!   desired ASP (`required_margin`, `analyze_accounts`)
//!
//! Batch quoting fans out on the current rayon pool; callers bound concurrency
//! by installing a sized pool around these calls.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{
    AccountRecord, MarginAnalysisResult, NegativeMarginPolicy, NotApplicableReason, QuoteOutcome, RequiredMargin,
    ShipmentRequest, SkipEvent, SkipReason,
};
use crate::error::PricingError;
use crate::pricing::{round_cents, standard_price};
use crate::provider::QuoteProvider;

/// Sell price implied by a margin on one account, compared against another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetSell {
    pub target_sell: f64,
    pub base_profit: f64,
    pub comparison_profit: f64,
}

impl TargetSell {
    /// The comparison account is still profitable at the target sell price.
    pub fn comparison_profitable(&self) -> bool {
        self.comparison_profit > 0.0
    }

    /// The comparison account earns more than the base account at the same sell price.
    pub fn comparison_undercuts(&self) -> bool {
        self.comparison_profit > self.base_profit
    }
}

pub fn target_sell(base_cost: f64, margin: f64, comparison_cost: f64) -> Result<TargetSell, PricingError> {
    if !(comparison_cost.is_finite() && comparison_cost > 0.0) {
        return Err(PricingError::InvalidBaseCost(comparison_cost));
    }
    let target_sell = standard_price(base_cost, margin)?;
    Ok(TargetSell {
        target_sell,
        base_profit: target_sell - base_cost,
        comparison_profit: target_sell - comparison_cost,
    })
}

/// Margin percent needed for `avg_cost` to sell at `desired_asp`.
///
/// `avg_cost = None` means no shipment was processed. A negative result (cost
/// already above the desired ASP) is returned unchanged.
pub fn required_margin(desired_asp: f64, avg_cost: Option<f64>) -> RequiredMargin {
    let Some(avg_cost) = avg_cost else {
        return RequiredMargin::NotApplicable(NotApplicableReason::NoProcessedShipments);
    };
    if desired_asp == 0.0 {
        return RequiredMargin::NotApplicable(NotApplicableReason::ZeroDesiredAsp);
    }
    RequiredMargin::Value((desired_asp - avg_cost) / desired_asp * 100.0)
}

/// Running totals for one account. Partial accumulators merge, so shipments can
/// be quoted in any order on any thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostAccumulator {
    pub processed: usize,
    pub cost_sum: f64,
    pub skips: Vec<SkipEvent>,
}

impl CostAccumulator {
    pub fn record(mut self, index: usize, shipment: &ShipmentRequest, outcome: QuoteOutcome) -> Self {
        match outcome {
            QuoteOutcome::Cost(cost) => {
                self.processed += 1;
                self.cost_sum += cost;
            }
            QuoteOutcome::NoQuote => self.skips.push(SkipEvent {
                shipment_index: index,
                shipment: shipment.label(),
                reason: SkipReason::NoQuote,
            }),
        }
        self
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.processed += other.processed;
        self.cost_sum += other.cost_sum;
        self.skips.extend(other.skips);
        self
    }

    pub fn average_cost(&self) -> Option<f64> {
        (self.processed > 0).then(|| self.cost_sum / self.processed as f64)
    }

    pub fn finish(mut self, account: &AccountRecord, desired_asp: f64) -> MarginAnalysisResult {
        self.skips.sort_by_key(|s| s.shipment_index);
        let average_cost = self.average_cost();
        MarginAnalysisResult {
            account: account.name.clone(),
            carrier: account.carrier.clone(),
            desired_asp,
            average_cost,
            required_margin: required_margin(desired_asp, average_cost),
            processed: self.processed,
            skipped: self.skips.len(),
            skips: self.skips,
        }
    }
}

/// Quote every shipment on one account and solve its required margin.
pub fn analyze_account(
    provider: &dyn QuoteProvider,
    account: &AccountRecord,
    shipments: &[ShipmentRequest],
    desired_asp: f64,
) -> MarginAnalysisResult {
    let acc = shipments
        .par_iter()
        .enumerate()
        .fold(CostAccumulator::default, |acc, (idx, shipment)| {
            let outcome = provider.quote_outcome(account, shipment);
            acc.record(idx, shipment, outcome)
        })
        .reduce(CostAccumulator::default, CostAccumulator::merge);

    let result = acc.finish(account, desired_asp);
    debug!(
        account = %result.account,
        processed = result.processed,
        skipped = result.skipped,
        "account analysis complete"
    );
    result
}

/// Run `analyze_account` for every account, preserving account order.
pub fn analyze_accounts(
    provider: &dyn QuoteProvider,
    accounts: &[AccountRecord],
    shipments: &[ShipmentRequest],
    desired_asp: f64,
) -> Vec<MarginAnalysisResult> {
    accounts
        .par_iter()
        .map(|account| analyze_account(provider, account, shipments, desired_asp))
        .collect()
}

/// Where the apply pass writes margins.
pub trait MarginSink {
    fn apply_margin(&self, account: &str, margin: f64) -> Result<(), PricingError>;
}

/// Outcome of applying one account's required margin.
#[derive(Debug)]
pub enum ApplyOutcome {
    Applied { account: String, margin: f64 },
    NotApplicable { account: String, reason: NotApplicableReason },
    RejectedNegative { account: String, margin: f64 },
    Failed { account: String, error: PricingError },
}

impl ApplyOutcome {
    pub fn account(&self) -> &str {
        match self {
            ApplyOutcome::Applied { account, .. }
            | ApplyOutcome::NotApplicable { account, .. }
            | ApplyOutcome::RejectedNegative { account, .. }
            | ApplyOutcome::Failed { account, .. } => account,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied { .. })
    }
}

/// Round a required margin to cents without pushing an in-range value up to 100.
fn margin_to_cents(margin: f64) -> f64 {
    let rounded = round_cents(margin);
    if rounded >= 100.0 && margin < 100.0 {
        ((margin * 100.0).floor() / 100.0).min(99.99)
    } else {
        rounded
    }
}

/// Persist each result's required margin. One failure never stops the pass.
pub fn apply_required_margins(
    sink: &dyn MarginSink,
    results: &[MarginAnalysisResult],
    policy: NegativeMarginPolicy,
) -> Vec<ApplyOutcome> {
    let mut outcomes = Vec::with_capacity(results.len());

    for r in results {
        let account = r.account.clone();
        let margin = match r.required_margin {
            RequiredMargin::NotApplicable(reason) => {
                info!(account = %account, ?reason, "required margin not applicable; leaving account unchanged");
                outcomes.push(ApplyOutcome::NotApplicable { account, reason });
                continue;
            }
            RequiredMargin::Value(v) => margin_to_cents(v),
        };

        let margin = if margin < 0.0 {
            match policy {
                NegativeMarginPolicy::Reject => {
                    warn!(account = %account, margin, "negative required margin rejected");
                    outcomes.push(ApplyOutcome::RejectedNegative { account, margin });
                    continue;
                }
                NegativeMarginPolicy::Clamp => {
                    warn!(account = %account, margin, "negative required margin clamped to 0");
                    0.0
                }
            }
        } else {
            margin
        };

        match sink.apply_margin(&account, margin) {
            Ok(()) => outcomes.push(ApplyOutcome::Applied { account, margin }),
            Err(error) => {
                warn!(account = %account, %error, "failed to apply margin");
                outcomes.push(ApplyOutcome::Failed { account, error });
            }
        }
    }

    outcomes
}
