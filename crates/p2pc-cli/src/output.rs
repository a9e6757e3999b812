//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use serde::Serialize;

use p2pc_broker::{Booking, Offer};

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone, Default)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => value.write_table(writer)?,
        }
        Ok(())
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Result of validating a configuration file.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigReport {
    /// Configuration file that was checked.
    pub path: String,
    /// Marketplace program address.
    pub contract_address: String,
    /// Address of the configured wallet, if any.
    pub wallet_address: Option<String>,
    /// Receipt poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Confirmation bound in seconds.
    pub timeout_secs: u64,
}

impl TableDisplay for ConfigReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Configuration OK: {}", self.path)?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Contract:         {}", self.contract_address)?;
        writeln!(
            writer,
            "Wallet:           {}",
            self.wallet_address.as_deref().unwrap_or("(none)")
        )?;
        writeln!(writer, "Poll interval:    {} ms", self.poll_interval_ms)?;
        writeln!(writer, "Timeout:          {} s", self.timeout_secs)?;
        Ok(())
    }
}

/// Summary of a simulated marketplace run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Deployed program address.
    pub contract_address: String,
    /// Miner address.
    pub miner: String,
    /// User address.
    pub user: String,
    /// Miner callback URL as read back from the ledger.
    pub miner_url: String,
    /// The published offer.
    pub offer: Offer,
    /// The booking as first read back.
    pub booking: Booking,
    /// Expiry after the extension.
    pub extended_till: u64,
    /// Ledger time when the expired booking was claimed.
    pub claimed_at: u64,
    /// Transactions confirmed during the run.
    pub transactions: usize,
}

impl TableDisplay for SimulationReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Simulation")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Contract:         {}", self.contract_address)?;
        writeln!(writer, "Miner:            {}", self.miner)?;
        writeln!(writer, "User:             {}", self.user)?;
        writeln!(writer, "Miner URL:        {}", self.miner_url)?;
        writeln!(writer)?;
        writeln!(writer, "Offer #{}", self.offer.index)?;
        writeln!(writer, "  VM type:        {}", self.offer.vm_type_id)?;
        writeln!(writer, "  Price:          {} units/s", self.offer.price_per_second)?;
        writeln!(writer, "  Machines:       {}", self.offer.machines_available)?;
        writeln!(writer)?;
        writeln!(writer, "Booking #{}", self.booking.index)?;
        writeln!(writer, "  Price:          {}/s", self.booking.price_per_second)?;
        writeln!(writer, "  Booked at:      {}", self.booking.booked_at)?;
        writeln!(writer, "  Booked till:    {}", self.booking.booked_till)?;
        writeln!(writer, "  Extended till:  {}", self.extended_till)?;
        writeln!(writer, "  Claimed at:     {}", self.claimed_at)?;
        writeln!(writer)?;
        writeln!(writer, "Transactions:     {}", self.transactions)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> ConfigReport {
        ConfigReport {
            path: "p2pc.toml".into(),
            contract_address: "contract".into(),
            wallet_address: None,
            poll_interval_ms: 500,
            timeout_secs: 60,
        }
    }

    #[test]
    fn table_output_lists_fields() {
        let mut buf = Vec::new();
        OutputFormat::new(Format::Table)
            .write(&mut buf, &report())
            .expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("Configuration OK: p2pc.toml"));
        assert!(text.contains("(none)"));
        assert!(text.contains("500 ms"));
    }

    #[test]
    fn json_output_is_parseable() {
        let format = OutputFormat::new(Format::Json);
        assert!(format.is_json());
        let mut buf = Vec::new();
        format.write(&mut buf, &report()).expect("write");
        let value: serde_json::Value = serde_json::from_slice(&buf).expect("json");
        assert_eq!(value["timeout_secs"], 60);
        assert!(value["wallet_address"].is_null());
    }
}
