//! Shared pricing workflows used by the CLI handlers.
//!
//! Quote: collect account quotes -> pick the cheapest -> look up history ->
//! reconcile margin, history and profit floor.
//!
//! Analyze: fan quotes out over a bounded pool -> solve each account's required
//! margin -> optionally persist it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::{AccountRecord, BatchConfig, HistoricalBooking, MarginAnalysisResult, PricingConfig, QuoteDecision, ShipmentRequest};
use crate::error::{AppError, PricingError};
use crate::io::ingest::RowError;
use crate::pricing::{
    HistoricalQuery, MatchWindow, PriceInputs, analyze_accounts, calculate_price, find_historical_average,
    select_minimum_rate,
};
use crate::provider::{QuoteProvider, TimeoutProvider, collect_quotes};

/// Price one shipment against every account.
pub fn quote_shipment(
    shipment: &ShipmentRequest,
    accounts: &[AccountRecord],
    provider: &dyn QuoteProvider,
    ledger: &[HistoricalBooking],
    config: &PricingConfig,
) -> Result<QuoteDecision, PricingError> {
    let quotes = collect_quotes(provider, accounts, shipment);
    let selected = select_minimum_rate(&quotes).ok_or(PricingError::NoQuoteAvailable)?;
    let winner = accounts.iter().find(|a| a.name == selected.account);

    let margin_percent = winner.and_then(|a| a.margin).or(config.default_margin);

    let query = HistoricalQuery {
        origin_zip: &shipment.origin_zip,
        dest_zip: &shipment.dest_zip,
        weight: shipment.weight,
        class: shipment.class.as_str(),
    };
    let window = MatchWindow {
        as_of: config.as_of,
        recency_months: config.recency_months,
        weight_tolerance: config.weight_tolerance,
    };
    let history = find_historical_average(&query, ledger, &window);

    let price = calculate_price(&PriceInputs {
        lowest_cost: selected.cost,
        margin_percent,
        historical_price: history.map(|h| h.average_price),
        profit_floor: config.profit_floor,
    })?;

    debug!(
        shipment = %shipment.label(),
        account = %selected.account,
        cost = selected.cost,
        final_price = price.final_price,
        reason = price.reason.code(),
        "priced shipment"
    );

    Ok(QuoteDecision {
        shipment: shipment.clone(),
        account: selected.account,
        carrier: winner.and_then(|a| a.carrier.clone()),
        price,
        historical_matches: history.map_or(0, |h| h.matched),
        quotes,
    })
}

/// Solve required margins for `accounts` over `shipments` on a pool of
/// `batch.workers` threads.
pub fn run_analysis(
    provider: Arc<dyn QuoteProvider>,
    accounts: &[AccountRecord],
    shipments: &[ShipmentRequest],
    desired_asp: f64,
    batch: &BatchConfig,
) -> Result<Vec<MarginAnalysisResult>, AppError> {
    if !(desired_asp.is_finite() && desired_asp >= 0.0) {
        return Err(PricingError::InvalidInput(format!("desired ASP must be finite and >= 0 (got {desired_asp})")).into());
    }
    if batch.workers == 0 {
        return Err(PricingError::InvalidInput("workers must be >= 1".to_string()).into());
    }

    let provider = with_deadline(provider, batch.quote_timeout, batch.workers);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(batch.workers)
        .build()
        .map_err(|e| AppError::new(4, format!("Failed to start worker pool: {e}")))?;

    info!(
        accounts = accounts.len(),
        shipments = shipments.len(),
        workers = batch.workers,
        desired_asp,
        "starting margin analysis"
    );
    let results = pool.install(|| analyze_accounts(provider.as_ref(), accounts, shipments, desired_asp));

    for r in &results {
        if r.skipped > 0 {
            warn!(account = %r.account, skipped = r.skipped, processed = r.processed, "shipments skipped");
        }
    }
    Ok(results)
}

/// Wrap `provider` in a per-call deadline when one is configured. At most
/// `max_in_flight` calls reach the inner provider at once, abandoned ones included.
pub fn with_deadline(
    provider: Arc<dyn QuoteProvider>,
    timeout: Option<Duration>,
    max_in_flight: usize,
) -> Arc<dyn QuoteProvider> {
    match timeout {
        Some(t) => Arc::new(TimeoutProvider::new(provider, t, max_in_flight)),
        None => provider,
    }
}

/// Restrict `records` to the names in `only` (all of them when `only` is empty).
pub fn select_accounts(records: Vec<AccountRecord>, only: &[String]) -> Result<Vec<AccountRecord>, PricingError> {
    if records.is_empty() {
        return Err(PricingError::InvalidInput("account store has no accounts".to_string()));
    }
    if only.is_empty() {
        return Ok(records);
    }

    let mut picked = Vec::with_capacity(only.len());
    for name in only {
        let record = records
            .iter()
            .find(|r| &r.name == name)
            .ok_or_else(|| PricingError::NotFound(format!("account '{name}'")))?;
        if !picked.iter().any(|p: &AccountRecord| p.name == record.name) {
            picked.push(record.clone());
        }
    }
    Ok(picked)
}

/// Log skipped input rows without failing the command.
pub fn log_row_errors(source: &str, errors: &[RowError]) {
    for e in errors {
        match &e.id {
            Some(id) => warn!(source, line = e.line, id = %id, message = %e.message, "skipped row"),
            None => warn!(source, line = e.line, message = %e.message, "skipped row"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use chrono::NaiveDate;

    use super::*;
    use crate::domain::{FreightClass, NegativeMarginPolicy, PriceReason, RequiredMargin};
    use crate::io::AccountStore;
    use crate::pricing::{ApplyOutcome, apply_required_margins};

    struct ByAccount(HashMap<&'static str, f64>);

    impl QuoteProvider for ByAccount {
        fn quote(&self, account: &AccountRecord, _: &ShipmentRequest) -> Option<f64> {
            self.0.get(account.name.as_str()).copied()
        }
    }

    struct SlowFor(&'static str);

    impl QuoteProvider for SlowFor {
        fn quote(&self, account: &AccountRecord, shipment: &ShipmentRequest) -> Option<f64> {
            if account.name == self.0 {
                thread::sleep(Duration::from_millis(300));
            }
            Some(shipment.weight / 4.0)
        }
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
    }

    fn shipment(weight: f64) -> ShipmentRequest {
        let class: FreightClass = "70".parse().unwrap();
        ShipmentRequest::new("30301", "10001", weight, class, None).unwrap()
    }

    fn booking(price: f64) -> HistoricalBooking {
        HistoricalBooking {
            origin_zip: "30311".to_string(),
            dest_zip: "10001".to_string(),
            weight: 500.0,
            class: "70".to_string(),
            sale_price: price,
            booked_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        }
    }

    fn accounts() -> Vec<AccountRecord> {
        vec![
            AccountRecord::new("a").with_margin(20.0).with_carrier("ACME"),
            AccountRecord::new("b"),
        ]
    }

    #[test]
    fn cheapest_account_prices_with_its_margin() {
        let provider = ByAccount(HashMap::from([("a", 100.0), ("b", 120.0)]));
        let config = PricingConfig::new(as_of());
        let d = quote_shipment(&shipment(500.0), &accounts(), &provider, &[], &config).unwrap();
        assert_eq!(d.account, "a");
        assert_eq!(d.carrier.as_deref(), Some("ACME"));
        assert!((d.price.final_price - 125.0).abs() < 1e-9);
        assert_eq!(d.price.reason, PriceReason::StandardMarginOnly);
        assert_eq!(d.quotes.len(), 2);
    }

    #[test]
    fn history_beats_standard_when_higher() {
        let provider = ByAccount(HashMap::from([("a", 100.0)]));
        let config = PricingConfig::new(as_of());
        let ledger = vec![booking(140.0), booking(160.0)];
        let d = quote_shipment(&shipment(500.0), &accounts(), &provider, &ledger, &config).unwrap();
        assert_eq!(d.historical_matches, 2);
        assert!((d.price.final_price - 150.0).abs() < 1e-9);
        assert_eq!(d.price.reason, PriceReason::HistoricalAverage);
    }

    #[test]
    fn default_margin_fills_in_for_account_without_one() {
        let provider = ByAccount(HashMap::from([("b", 90.0)]));
        let mut config = PricingConfig::new(as_of());
        config.default_margin = Some(10.0);
        let d = quote_shipment(&shipment(500.0), &accounts(), &provider, &[], &config).unwrap();
        assert_eq!(d.account, "b");
        assert!((d.price.final_price - 100.0).abs() < 1e-9);
    }

    #[test]
    fn no_margin_and_no_history_has_no_price() {
        let provider = ByAccount(HashMap::from([("b", 90.0)]));
        let config = PricingConfig::new(as_of());
        let err = quote_shipment(&shipment(500.0), &accounts(), &provider, &[], &config).unwrap_err();
        assert!(matches!(err, PricingError::NoValidPriceSource));
    }

    #[test]
    fn no_quotes_is_an_error() {
        let provider = ByAccount(HashMap::new());
        let config = PricingConfig::new(as_of());
        let err = quote_shipment(&shipment(500.0), &accounts(), &provider, &[], &config).unwrap_err();
        assert!(matches!(err, PricingError::NoQuoteAvailable));
    }

    #[test]
    fn analysis_times_out_slow_account() {
        let provider: Arc<dyn QuoteProvider> = Arc::new(SlowFor("b"));
        // Enough slots that the slow account's abandoned calls cannot starve "a".
        let batch = BatchConfig {
            workers: 3,
            quote_timeout: Some(Duration::from_millis(50)),
            ..BatchConfig::default()
        };
        let shipments = vec![shipment(400.0), shipment(800.0)];
        let results = run_analysis(provider, &accounts(), &shipments, 200.0, &batch).unwrap();

        assert_eq!(results[0].account, "a");
        assert_eq!(results[0].processed, 2);
        assert_eq!(results[0].average_cost, Some(150.0));
        assert_eq!(results[0].required_margin, RequiredMargin::Value(25.0));

        assert_eq!(results[1].account, "b");
        assert_eq!(results[1].processed, 0);
        assert_eq!(results[1].skipped, 2);
    }

    #[derive(Default)]
    struct Stalling {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl QuoteProvider for Stalling {
        fn quote(&self, _: &AccountRecord, _: &ShipmentRequest) -> Option<f64> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(100));
            self.running.fetch_sub(1, Ordering::SeqCst);
            Some(100.0)
        }
    }

    #[test]
    fn timed_out_calls_stay_within_worker_bound() {
        let inner = Arc::new(Stalling::default());
        let batch = BatchConfig {
            workers: 1,
            quote_timeout: Some(Duration::from_millis(10)),
            ..BatchConfig::default()
        };
        let shipments: Vec<ShipmentRequest> = (0..10).map(|i| shipment(400.0 + i as f64)).collect();
        let results = run_analysis(inner.clone(), &accounts()[..1], &shipments, 200.0, &batch).unwrap();

        assert_eq!(results[0].processed, 0);
        assert_eq!(results[0].skipped, 10);
        assert!(inner.peak.load(Ordering::SeqCst) <= 1);
    }

    #[test]
    fn apply_writes_account_files() {
        let dir = tempfile::tempdir().unwrap();
        let a_text = "name = a\ncarrier = ACME\napi_key = k\n";
        let b_text = "# b\nname = b\nmargin = 5\n";
        let c_text = "name = c\nmargin = 12\n";
        fs::write(dir.path().join("a.account"), a_text).unwrap();
        fs::write(dir.path().join("b.account"), b_text).unwrap();
        fs::write(dir.path().join("c.account"), c_text).unwrap();
        let (store, errors) = AccountStore::open(dir.path()).unwrap();
        assert!(errors.is_empty());

        let provider: Arc<dyn QuoteProvider> = Arc::new(ByAccount(HashMap::from([("a", 100.0), ("b", 150.0)])));
        let shipments = vec![shipment(400.0), shipment(800.0)];
        let results = run_analysis(provider, &store.records(), &shipments, 200.0, &BatchConfig::default()).unwrap();

        let outcomes = apply_required_margins(&store, &results, NegativeMarginPolicy::Reject);
        assert!(outcomes[0].is_applied());
        assert!(outcomes[1].is_applied());
        assert!(matches!(&outcomes[2], ApplyOutcome::NotApplicable { account, .. } if account == "c"));

        let read = |name: &str| fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(read("a.account"), format!("{a_text}margin = 50\n"));
        assert_eq!(read("b.account"), "# b\nname = b\nmargin = 25\n");
        assert_eq!(read("c.account"), c_text);

        let (reopened, errors) = AccountStore::open(dir.path()).unwrap();
        assert!(errors.is_empty());
        assert_eq!(reopened.get("a").unwrap().margin, Some(50.0));
        assert_eq!(reopened.get("b").unwrap().margin, Some(25.0));
        assert_eq!(reopened.get("c").unwrap().margin, Some(12.0));
        assert_eq!(store.get("a").unwrap().margin, Some(50.0));
    }

    #[test]
    fn analysis_rejects_bad_knobs() {
        let provider: Arc<dyn QuoteProvider> = Arc::new(SlowFor("none"));
        let zero_workers = BatchConfig {
            workers: 0,
            ..BatchConfig::default()
        };
        let err = run_analysis(Arc::clone(&provider), &accounts(), &[], 100.0, &zero_workers).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let err = run_analysis(provider, &accounts(), &[], -1.0, &BatchConfig::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn account_filter() {
        let all = select_accounts(accounts(), &[]).unwrap();
        assert_eq!(all.len(), 2);
        let only_b = select_accounts(accounts(), &["b".to_string(), "b".to_string()]).unwrap();
        assert_eq!(only_b.len(), 1);
        assert!(matches!(select_accounts(accounts(), &["zzz".to_string()]), Err(PricingError::NotFound(_))));
        assert!(select_accounts(Vec::new(), &[]).is_err());
    }
}
