//! # p2pc-cli
//!
//! Command-line interface for the p2pc marketplace client.
//!
//! Provides commands for:
//! - Validating a broker configuration and its wallet keyfile
//! - Running a miner/user booking lifecycle against an in-memory ledger

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format, SimulateArgs};
pub use error::CliError;
pub use output::OutputFormat;
