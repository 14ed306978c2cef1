//! `freight-margin` library crate.
//!
//! The binary (`fm`) is a thin wrapper around this library so that:
//!
//! - the pricing core is testable without spawning processes
//! - carrier integrations can plug in behind `provider::QuoteProvider`
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod pricing;
pub mod provider;
pub mod report;
