//! Input/output helpers.
//!
//! - ledger + shipments CSV ingest (`ingest`)
//! - account store and margin persistence (`accounts`)
//! - result exports (CSV/JSON) (`export`)

pub mod accounts;
pub mod export;
pub mod ingest;

pub use accounts::*;
pub use export::*;
pub use ingest::*;
