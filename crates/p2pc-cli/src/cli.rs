//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// p2pc - peer-to-peer compute marketplace client.
#[derive(Parser, Debug, Clone)]
#[command(name = "p2pc")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Validate a broker configuration file.
    ///
    /// Also loads the wallet keyfile if the configuration names one.
    CheckConfig {
        /// Path to the TOML configuration.
        path: PathBuf,
    },

    /// Run a miner and a user through a full booking lifecycle against an
    /// in-memory ledger.
    Simulate(SimulateArgs),
}

/// Arguments for the simulate command.
#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Decimals of the payment asset.
    #[arg(long, default_value_t = 6)]
    pub decimals: u8,

    /// Offer price per second in ledger units.
    #[arg(long, default_value_t = 100)]
    pub price: u128,

    /// Machine category of the offer.
    #[arg(long, default_value_t = 2)]
    pub vm_type: u64,

    /// Machines published with the offer.
    #[arg(long, default_value_t = 5)]
    pub machines: u64,

    /// Booking duration in seconds.
    #[arg(long, default_value_t = 3600)]
    pub seconds: u64,

    /// Extension applied to the booking in seconds.
    #[arg(long, default_value_t = 600)]
    pub extend: u64,

    /// Miner callback URL.
    #[arg(long, default_value = "https://miner.example")]
    pub url: String,
}
