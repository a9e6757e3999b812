//! Broker configuration.
//!
//! Loaded from TOML:
//!
//! ```toml
//! contract_address = "4vJ9JU1bJJE96FWSJKvHsmmFADCg4gpZQff4P3bkLKi"
//! wallet_path = "/etc/p2pc/wallet.json"
//!
//! [confirmation]
//! poll_interval_ms = 500
//! timeout_secs = 60
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, Result};
use crate::wallet::Address;

/// Receipt polling settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Delay between receipt polls in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum time to wait for a receipt in seconds.
    pub timeout_secs: u64,
}

impl ConfirmationConfig {
    /// Delay between receipt polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Confirmation bound.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns a config error if either value is zero or the poll interval
    /// exceeds the timeout.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(BrokerError::Config(
                "confirmation.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(BrokerError::Config(
                "confirmation.timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.poll_interval() > self.timeout() {
            return Err(BrokerError::Config(
                "confirmation.poll_interval_ms cannot exceed the timeout".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            timeout_secs: 60,
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Address of the deployed marketplace program.
    pub contract_address: Address,
    /// Keyfile of the signing wallet.
    #[serde(default)]
    pub wallet_path: Option<PathBuf>,
    /// Receipt polling settings.
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
}

impl BrokerConfig {
    /// Create a configuration with default confirmation settings.
    #[must_use]
    pub fn new(contract_address: Address) -> Self {
        Self {
            contract_address,
            wallet_path: None,
            confirmation: ConfirmationConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            BrokerError::Config(format!(
                "failed to read config file '{}': {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| BrokerError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.contract_address.is_zero() {
            return Err(BrokerError::Config(
                "contract_address cannot be the zero address".to_string(),
            ));
        }
        self.confirmation.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn address() -> String {
        Address::new([9u8; 32]).to_string()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = BrokerConfig::from_toml(&format!("contract_address = \"{}\"", address()))
            .expect("parse");
        assert_eq!(config.confirmation, ConfirmationConfig::default());
        assert!(config.wallet_path.is_none());
    }

    #[test]
    fn test_full_config() {
        let toml = format!(
            r#"
contract_address = "{address}"
wallet_path = "/tmp/wallet.json"

[confirmation]
poll_interval_ms = 250
timeout_secs = 30
"#,
            address = address()
        );
        let config = BrokerConfig::from_toml(&toml).expect("parse");
        assert_eq!(config.confirmation.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.confirmation.timeout(), Duration::from_secs(30));
        assert_eq!(config.wallet_path, Some(PathBuf::from("/tmp/wallet.json")));
    }

    #[test]
    fn test_rejects_zero_contract() {
        let toml = format!("contract_address = \"{}\"", Address::ZERO);
        assert!(matches!(
            BrokerConfig::from_toml(&toml),
            Err(BrokerError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_bad_confirmation() {
        let toml = format!(
            "contract_address = \"{}\"\n[confirmation]\npoll_interval_ms = 0\ntimeout_secs = 5\n",
            address()
        );
        assert!(BrokerConfig::from_toml(&toml).is_err());

        let toml = format!(
            "contract_address = \"{}\"\n[confirmation]\npoll_interval_ms = 9000\ntimeout_secs = 5\n",
            address()
        );
        assert!(BrokerConfig::from_toml(&toml).is_err());
    }

    #[test]
    fn test_rejects_invalid_address() {
        assert!(BrokerConfig::from_toml("contract_address = \"nope\"").is_err());
    }

    #[test]
    fn test_from_file() {
        let file = NamedTempFile::new().expect("temp file");
        std::fs::write(file.path(), format!("contract_address = \"{}\"", address())).expect("write");
        assert!(BrokerConfig::from_file(file.path()).is_ok());
        assert!(BrokerConfig::from_file("/nonexistent/p2pc.toml").is_err());
    }
}
