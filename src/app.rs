//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - sets up logging
//! - loads accounts, rate table, ledger and shipments
//! - runs the pricing pipelines
//! - prints reports and writes optional exports

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{AnalyzeArgs, Command, DemoArgs, PolicyArgs, QuoteArgs, SetMarginArgs, StoreArgs};
use crate::data::{DemoConfig, generate_demo};
use crate::domain::{BatchConfig, Dimensions, FreightClass, PricingConfig, ShipmentRequest};
use crate::error::AppError;
use crate::io::{AccountStore, load_ledger, load_shipments};
use crate::provider::{QuoteProvider, RateTableProvider};

pub mod pipeline;

/// Entry point for the `fm` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Quote(args) => handle_quote(args),
        Command::Analyze(args) => handle_analyze(args),
        Command::SetMargin(args) => handle_set_margin(args),
        Command::Accounts(args) => handle_accounts(args),
        Command::Demo(args) => handle_demo(args),
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,freight_margin={level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_quote(args: QuoteArgs) -> Result<(), AppError> {
    let config = pricing_config_from_args(&args.policy)?;
    let store = open_store(&args.pricing.store)?;
    let accounts = pipeline::select_accounts(store.records(), &args.pricing.only_accounts)?;
    let provider = load_provider(&args.pricing.rates, args.pricing.quote_timeout_ms, accounts.len())?;

    let ledger = load_ledger(&args.policy.ledger)?;
    pipeline::log_row_errors("ledger", &ledger.row_errors);

    let class: FreightClass = args.class.parse()?;
    let dimensions = match (args.length, args.width, args.height) {
        (Some(length), Some(width), Some(height)) => Some(Dimensions { length, width, height }),
        _ => None,
    };
    let shipment = ShipmentRequest::new(&args.origin, &args.dest, args.weight, class, dimensions)?;

    let decision = pipeline::quote_shipment(&shipment, &accounts, provider.as_ref(), &ledger.bookings, &config)?;

    if args.json {
        println!("{}", crate::io::to_json(&decision)?);
    } else {
        println!("{}", crate::report::format_quote_decision(&decision));
    }
    Ok(())
}

fn handle_analyze(args: AnalyzeArgs) -> Result<(), AppError> {
    let batch = BatchConfig {
        workers: args.workers,
        quote_timeout: args.pricing.quote_timeout_ms.map(Duration::from_millis),
        negative_policy: args.negative_policy,
    };
    let store = open_store(&args.pricing.store)?;
    let accounts = pipeline::select_accounts(store.records(), &args.pricing.only_accounts)?;
    // The deadline is applied inside `run_analysis`.
    let provider = load_provider(&args.pricing.rates, None, batch.workers)?;

    let batch_input = load_shipments(&args.shipments)?;
    pipeline::log_row_errors("shipments", &batch_input.row_errors);

    let results = pipeline::run_analysis(provider, &accounts, &batch_input.shipments, args.desired_asp, &batch)?;

    if args.json {
        println!("{}", crate::io::to_json(&results)?);
    } else {
        println!("{}", crate::report::format_analysis(&results));
    }

    if let Some(path) = &args.export {
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
            crate::io::write_json(path, &results)?;
        } else {
            crate::io::write_analysis_csv(path, &results)?;
        }
        info!(path = %path.display(), "exported analysis");
    }

    if args.apply {
        let outcomes = crate::pricing::apply_required_margins(&store, &results, batch.negative_policy);
        let text = crate::report::format_apply_outcomes(&outcomes);
        if args.json {
            eprint!("{text}");
        } else {
            print!("{text}");
        }

        let failed = outcomes
            .iter()
            .filter(|o| matches!(o, crate::pricing::ApplyOutcome::Failed { .. }))
            .count();
        if failed > 0 {
            return Err(AppError::new(4, format!("{failed} account(s) failed to persist.")));
        }
    }
    Ok(())
}

fn handle_set_margin(args: SetMarginArgs) -> Result<(), AppError> {
    let store = open_store(&args.store)?;
    store.set_margin(&args.account, args.margin)?;
    println!("{}: margin set to {}%", args.account, crate::io::format_margin(args.margin));
    Ok(())
}

fn handle_accounts(args: StoreArgs) -> Result<(), AppError> {
    let store = open_store(&args)?;
    println!("{}", crate::report::format_accounts(&store.records()));
    Ok(())
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = DemoConfig {
        out_dir: args.out,
        seed: args.seed,
        as_of: args.as_of.unwrap_or_else(today),
        bookings: args.bookings,
        shipments: args.shipments,
    };
    let files = generate_demo(&config)?;

    println!("Demo dataset written to {}", config.out_dir.display());
    println!("  FM_ACCOUNTS={}", files.accounts_dir.display());
    println!("  FM_RATES={}", files.rates.display());
    println!("  FM_LEDGER={}", files.ledger.display());
    println!("  shipments: {}", files.shipments.display());
    Ok(())
}

/// Build and validate a `PricingConfig` from CLI flags.
pub fn pricing_config_from_args(args: &PolicyArgs) -> Result<PricingConfig, AppError> {
    let config = PricingConfig {
        as_of: args.as_of.unwrap_or_else(today),
        default_margin: args.default_margin,
        weight_tolerance: args.weight_tolerance,
        recency_months: args.recency_months,
        profit_floor: args.profit_floor,
    };
    config.validate()?;
    Ok(config)
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

fn open_store(args: &StoreArgs) -> Result<AccountStore, AppError> {
    let (store, errors) = AccountStore::open(&args.accounts)?;
    if !errors.is_empty() {
        warn!(skipped = errors.len(), dir = %args.accounts.display(), "some account files were not loaded");
    }
    Ok(store)
}

fn load_provider(
    rates: &Path,
    timeout_ms: Option<u64>,
    max_in_flight: usize,
) -> Result<Arc<dyn QuoteProvider>, AppError> {
    let (table, row_errors) = RateTableProvider::load(rates)?;
    pipeline::log_row_errors("rates", &row_errors);
    Ok(pipeline::with_deadline(
        Arc::new(table),
        timeout_ms.map(Duration::from_millis),
        max_in_flight,
    ))
}
