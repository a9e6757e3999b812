//! CLI command implementations.
//!
//! - [`check_config`] - Configuration validation
//! - [`simulate`] - End-to-end marketplace run on an in-memory ledger

pub mod check_config;
pub mod simulate;

pub use check_config::CheckConfigCommand;
pub use simulate::SimulateCommand;
