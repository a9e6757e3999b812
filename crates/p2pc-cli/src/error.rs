//! CLI error types.

use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A marketplace operation failed.
    #[error("marketplace error: {0}")]
    Broker(#[from] p2pc_broker::BrokerError),

    /// The simulated flow did not end in the expected state.
    #[error("simulation error: {0}")]
    Simulation(String),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
