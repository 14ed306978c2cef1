//! Domain types used throughout the pricing core.
//!
//! This module defines:
//!
//! - shipment inputs (`ShipmentRequest`, `FreightClass`, `Dimensions`)
//! - provider answers (`QuoteOutcome`, `CarrierQuote`)
//! - ledger and account records (`HistoricalBooking`, `AccountRecord`)
//! - decision outputs (`QuoteDecision`, `MarginAnalysisResult`)
//! - run configuration (`PricingConfig`, `BatchConfig`)

pub mod types;

pub use types::*;
