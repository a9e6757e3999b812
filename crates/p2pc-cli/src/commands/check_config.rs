//! Configuration check command.

use std::io::Write;
use std::path::{Path, PathBuf};

use p2pc_broker::{BrokerConfig, Signer, Wallet};

use crate::error::CliError;
use crate::output::{ConfigReport, OutputFormat};

/// Check-config command executor.
pub struct CheckConfigCommand {
    path: PathBuf,
}

impl CheckConfigCommand {
    /// Create a command for the given configuration file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Execute the check and print the report.
    ///
    /// # Errors
    ///
    /// Returns a config error if the file or its wallet is invalid.
    pub fn execute<W: Write>(&self, writer: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        let report = self.check()?;
        format.write(writer, &report)
    }

    /// Load and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a config error if the file cannot be loaded, fails
    /// validation, or names a wallet keyfile that cannot be loaded.
    pub fn check(&self) -> Result<ConfigReport, CliError> {
        let config = BrokerConfig::from_file(&self.path).map_err(|e| self.config_error(&e))?;

        let wallet_address = match &config.wallet_path {
            Some(wallet_path) => Some(load_wallet(wallet_path)?.address().to_string()),
            None => None,
        };

        Ok(ConfigReport {
            path: self.path.display().to_string(),
            contract_address: config.contract_address.to_string(),
            wallet_address,
            poll_interval_ms: config.confirmation.poll_interval_ms,
            timeout_secs: config.confirmation.timeout_secs,
        })
    }

    fn config_error(&self, err: &p2pc_broker::BrokerError) -> CliError {
        CliError::Config(format!("{}: {err}", self.path.display()))
    }
}

fn load_wallet(path: &Path) -> Result<Wallet, CliError> {
    Wallet::from_file(path)
        .map_err(|e| CliError::Config(format!("wallet '{}': {e}", path.display())))
}
