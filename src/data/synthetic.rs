//! Seeded synthetic dataset for demos and smoke tests.
//!
//! Produces everything the CLI reads: an account directory, a rate table, a
//! booking ledger, and a shipments file. Output is fully determined by the
//! seed and as-of date.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::io::ACCOUNT_EXTENSION;

const ZIPS: [&str; 8] = ["30301", "60601", "75201", "90001", "10001", "02110", "98101", "33101"];
const CLASSES: [&str; 6] = ["55", "70", "85", "100", "125", "150"];

/// Probability that an account has no rate on a given lane.
const LANE_GAP_PROB: f64 = 0.2;

/// Days of booking history to generate (a bit more than the 12-month window).
const HISTORY_DAYS: i64 = 540;

struct DemoAccount {
    name: &'static str,
    carrier: &'static str,
    margin: Option<f64>,
    /// Cost multiplier relative to the market rate.
    cost_factor: f64,
}

const ACCOUNTS: [DemoAccount; 3] = [
    DemoAccount {
        name: "acme-ltl",
        carrier: "ACME",
        margin: Some(18.0),
        cost_factor: 0.95,
    },
    DemoAccount {
        name: "blue-freight",
        carrier: "BLUE",
        margin: Some(22.5),
        cost_factor: 1.0,
    },
    DemoAccount {
        name: "coast-express",
        carrier: "COAST",
        margin: None,
        cost_factor: 1.08,
    },
];

/// Options for `fm demo`.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub out_dir: PathBuf,
    pub seed: u64,
    pub as_of: NaiveDate,
    pub bookings: usize,
    pub shipments: usize,
}

/// Paths written by `generate_demo`.
#[derive(Debug, Clone)]
pub struct DemoFiles {
    pub accounts_dir: PathBuf,
    pub rates: PathBuf,
    pub ledger: PathBuf,
    pub shipments: PathBuf,
}

#[derive(Serialize)]
struct RateOut<'a> {
    account: &'a str,
    origin_zip3: &'a str,
    dest_zip3: &'a str,
    class: &'a str,
    rate_per_cwt: f64,
    min_charge: f64,
}

#[derive(Serialize)]
struct BookingOut<'a> {
    origin_zip: &'a str,
    dest_zip: &'a str,
    weight: f64,
    class: &'a str,
    sale_price: f64,
    booked_date: NaiveDate,
}

#[derive(Serialize)]
struct ShipmentOut<'a> {
    id: String,
    origin_zip: &'a str,
    dest_zip: &'a str,
    weight: f64,
    class: &'a str,
}

pub fn generate_demo(config: &DemoConfig) -> Result<DemoFiles, AppError> {
    if config.bookings == 0 || config.shipments == 0 {
        return Err(AppError::new(2, "Bookings and shipments must be > 0."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let markup = Normal::new(0.25, 0.08).map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

    let files = DemoFiles {
        accounts_dir: config.out_dir.join("accounts"),
        rates: config.out_dir.join("rates.csv"),
        ledger: config.out_dir.join("ledger.csv"),
        shipments: config.out_dir.join("shipments.csv"),
    };
    fs::create_dir_all(&files.accounts_dir).map_err(|e| io_err(&files.accounts_dir, e))?;

    for acct in &ACCOUNTS {
        let mut text = format!(
            "# demo account\nname = {}\ncarrier = {}\napi_key = demo-{:08x}\n",
            acct.name,
            acct.carrier,
            rng.gen_range(0..u32::MAX)
        );
        if let Some(m) = acct.margin {
            text.push_str(&format!("margin = {m}\n"));
        }
        let path = files.accounts_dir.join(format!("{}.{ACCOUNT_EXTENSION}", acct.name));
        fs::write(&path, text).map_err(|e| io_err(&path, e))?;
    }

    // Market rate per lane (dollars per cwt before class adjustment).
    let mut lanes = Vec::new();
    for o in ZIPS {
        for d in ZIPS {
            if o != d {
                lanes.push((o, d, rng.gen_range(22.0..55.0)));
            }
        }
    }

    let mut rates = csv_writer(&files.rates)?;
    for acct in &ACCOUNTS {
        for &(o, d, market) in &lanes {
            if rng.gen_bool(LANE_GAP_PROB) {
                continue;
            }
            let rate = RateOut {
                account: acct.name,
                origin_zip3: &o[..3],
                dest_zip3: &d[..3],
                class: "*",
                rate_per_cwt: cents(market * acct.cost_factor),
                min_charge: 95.0,
            };
            rates.serialize(rate).map_err(|e| csv_err(&files.rates, e))?;
        }
    }
    rates.flush().map_err(|e| io_err(&files.rates, e))?;

    let mut ledger = csv_writer(&files.ledger)?;
    for _ in 0..config.bookings {
        let &(o, d, market) = lanes.choose(&mut rng).ok_or_else(|| AppError::new(4, "No demo lanes."))?;
        let class = CLASSES.choose(&mut rng).copied().unwrap_or("70");
        let weight = rng.gen_range(150.0..3000.0_f64).round();
        let cost = (weight / 100.0 * market * class_factor(class)).max(95.0);
        let m: f64 = markup.sample(&mut rng);
        let booked_date = config.as_of - Duration::days(rng.gen_range(0..HISTORY_DAYS));
        let row = BookingOut {
            origin_zip: o,
            dest_zip: d,
            weight,
            class,
            sale_price: cents(cost * (1.0 + m.clamp(0.02, 0.6))),
            booked_date,
        };
        ledger.serialize(row).map_err(|e| csv_err(&files.ledger, e))?;
    }
    ledger.flush().map_err(|e| io_err(&files.ledger, e))?;

    let mut shipments = csv_writer(&files.shipments)?;
    for i in 0..config.shipments {
        let &(o, d, _) = lanes.choose(&mut rng).ok_or_else(|| AppError::new(4, "No demo lanes."))?;
        let row = ShipmentOut {
            id: format!("S{:04}", i + 1),
            origin_zip: o,
            dest_zip: d,
            weight: rng.gen_range(150.0..3000.0_f64).round(),
            class: CLASSES.choose(&mut rng).copied().unwrap_or("70"),
        };
        shipments.serialize(row).map_err(|e| csv_err(&files.shipments, e))?;
    }
    shipments.flush().map_err(|e| io_err(&files.shipments, e))?;

    info!(
        dir = %config.out_dir.display(),
        seed = config.seed,
        bookings = config.bookings,
        shipments = config.shipments,
        "generated demo dataset"
    );
    Ok(files)
}

/// Rough density-class price multiplier (higher class, higher rate).
fn class_factor(class: &str) -> f64 {
    let c: f64 = class.parse().unwrap_or(70.0);
    0.6 + c / 250.0
}

fn cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn csv_writer(path: &Path) -> Result<csv::Writer<fs::File>, AppError> {
    csv::Writer::from_path(path).map_err(|e| csv_err(path, e))
}

fn io_err(path: &Path, e: std::io::Error) -> AppError {
    AppError::new(2, format!("Failed to write '{}': {e}", path.display()))
}

fn csv_err(path: &Path, e: csv::Error) -> AppError {
    AppError::new(2, format!("Failed to write CSV '{}': {e}", path.display()))
}
