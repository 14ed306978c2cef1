//! Command-line parsing for the freight margin tool.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! pricing code. Every path and pricing knob can also come from the
//! environment (or a `.env` file).

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};

use crate::domain::{DEFAULT_RECENCY_MONTHS, DEFAULT_WEIGHT_TOLERANCE, NegativeMarginPolicy};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "fm", version, about = "Freight quote pricing and margin solver")]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Price one shipment: cheapest account, margin vs history, profit floor.
    Quote(QuoteArgs),
    /// Solve the margin each account needs to hit a desired average selling price.
    Analyze(AnalyzeArgs),
    /// Write a margin to one account file.
    SetMargin(SetMarginArgs),
    /// List accounts and their margins.
    Accounts(StoreArgs),
    /// Generate a seeded synthetic dataset.
    Demo(DemoArgs),
}

/// Location of the account store.
#[derive(Debug, Args, Clone)]
pub struct StoreArgs {
    /// Directory of `*.account` files.
    #[arg(long, env = "FM_ACCOUNTS", default_value = "accounts")]
    pub accounts: PathBuf,
}

/// Inputs and knobs shared by quoting and analysis.
#[derive(Debug, Args, Clone)]
pub struct PricingArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Rate table CSV used as the quote provider.
    #[arg(long, env = "FM_RATES", default_value = "rates.csv")]
    pub rates: PathBuf,

    /// Only quote these accounts (repeatable). Defaults to every account.
    #[arg(long = "account", value_name = "NAME")]
    pub only_accounts: Vec<String>,

    /// Per-call provider deadline in milliseconds (no deadline if omitted).
    #[arg(long, env = "FM_QUOTE_TIMEOUT_MS")]
    pub quote_timeout_ms: Option<u64>,
}

/// Historical matching and margin policy.
#[derive(Debug, Args, Clone)]
pub struct PolicyArgs {
    /// Booking ledger CSV. A missing file disables historical matching.
    #[arg(long, env = "FM_LEDGER", default_value = "ledger.csv")]
    pub ledger: PathBuf,

    /// Pricing date (defaults to today).
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub as_of: Option<NaiveDate>,

    /// Margin percent for accounts without one.
    #[arg(long, env = "FM_DEFAULT_MARGIN")]
    pub default_margin: Option<f64>,

    /// Weight band half-width as a fraction of the requested weight.
    #[arg(long, env = "FM_WEIGHT_TOLERANCE", default_value_t = DEFAULT_WEIGHT_TOLERANCE)]
    pub weight_tolerance: f64,

    /// Trailing months of history considered recent.
    #[arg(long, env = "FM_RECENCY_MONTHS", default_value_t = DEFAULT_RECENCY_MONTHS)]
    pub recency_months: u32,

    /// Minimum dollar profit per shipment.
    #[arg(long, env = "FM_PROFIT_FLOOR")]
    pub profit_floor: Option<f64>,
}

#[derive(Debug, Args, Clone)]
pub struct QuoteArgs {
    #[command(flatten)]
    pub pricing: PricingArgs,

    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Origin zip.
    #[arg(long)]
    pub origin: String,

    /// Destination zip.
    #[arg(long)]
    pub dest: String,

    /// Weight in pounds.
    #[arg(long)]
    pub weight: f64,

    /// NMFC freight class (e.g. 70, 77.5, 100).
    #[arg(long)]
    pub class: String,

    /// Length in inches (requires width and height).
    #[arg(long, requires_all = ["width", "height"])]
    pub length: Option<f64>,

    #[arg(long, requires_all = ["length", "height"])]
    pub width: Option<f64>,

    #[arg(long, requires_all = ["length", "width"])]
    pub height: Option<f64>,

    /// Print the decision as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub pricing: PricingArgs,

    /// Shipments CSV (`origin_zip,dest_zip,weight,class`).
    #[arg(long)]
    pub shipments: PathBuf,

    /// Target average selling price per shipment.
    #[arg(long)]
    pub desired_asp: f64,

    /// Maximum concurrent provider calls.
    #[arg(long, env = "FM_WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// Persist each account's required margin.
    #[arg(long)]
    pub apply: bool,

    /// What `--apply` does with a negative required margin.
    #[arg(long, value_enum, default_value_t = NegativeMarginPolicy::Reject)]
    pub negative_policy: NegativeMarginPolicy,

    /// Export per-account results to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Print results (with skip events) as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SetMarginArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Account name.
    #[arg(long)]
    pub account: String,

    /// Margin percent in [0, 100).
    #[arg(long)]
    pub margin: f64,
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    /// Output directory.
    #[arg(long, default_value = "demo")]
    pub out: PathBuf,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Date the history ends on (defaults to today).
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub as_of: Option<NaiveDate>,

    /// Number of ledger bookings.
    #[arg(long, default_value_t = 2000)]
    pub bookings: usize,

    /// Number of batch shipments.
    #[arg(long, default_value_t = 100)]
    pub shipments: usize,
}
