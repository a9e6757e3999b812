//! End-to-end marketplace simulation.
//!
//! Deploys a program on an in-memory ledger, then drives one miner and one
//! user through the whole booking lifecycle:
//! - Miner registers its endpoint and publishes an offer
//! - User discovers the offer, books it, and extends the booking
//! - Ledger time runs past expiry and the miner claims the booking

use std::io::Write;

use tracing::info;

use p2pc_broker::{
    BookingLookup, ConfirmationConfig, MarketplaceClient, SimulatedLedger, Wallet,
};

use crate::cli::SimulateArgs;
use crate::error::CliError;
use crate::output::{OutputFormat, SimulationReport};

const CONFIRMATION: ConfirmationConfig = ConfirmationConfig {
    poll_interval_ms: 10,
    timeout_secs: 5,
};

/// Simulate command executor.
pub struct SimulateCommand {
    ledger: SimulatedLedger,
}

impl SimulateCommand {
    /// Create a command with a fresh ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ledger: SimulatedLedger::new(),
        }
    }

    /// Run the simulation and print the report.
    ///
    /// # Errors
    ///
    /// Returns the first failing marketplace operation, or a simulation
    /// error if the ledger ends in an unexpected state.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &SimulateArgs,
    ) -> Result<(), CliError> {
        let report = self.run(args).await?;
        format.write(writer, &report)
    }

    /// Run the simulation.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn run(&self, args: &SimulateArgs) -> Result<SimulationReport, CliError> {
        let contract = self.ledger.deploy_marketplace(args.decimals).await;
        let miner = self.client(contract)?;
        let user = self.client(contract)?;

        miner
            .offers()
            .add_offer(args.price, args.vm_type, args.machines, &args.url)
            .await?;

        let offer = user
            .offers()
            .list_available_offers(args.vm_type)
            .await?
            .into_iter()
            .find(|offer| offer.miner == *miner.address())
            .ok_or_else(|| CliError::Simulation("published offer is not available".into()))?;

        user.bookings().book(offer.index, args.seconds).await?;
        let booking = user
            .bookings()
            .find_own_user_bookings()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CliError::Simulation("booking not listed for user".into()))?;
        info!(booking = booking.index, price = booking.price_per_second, "booking read back");

        if args.extend > 0 {
            user.bookings().extend(booking.index, args.extend).await?;
        }
        let extended_till = user.bookings().require(booking.index).await?.booked_till;

        let now = user.ledger_time().await?;
        self.ledger
            .advance_time(extended_till.saturating_sub(now))
            .await;
        if !miner.bookings().is_expired(booking.index).await? {
            return Err(CliError::Simulation(format!(
                "booking {} not expired after advancing time",
                booking.index
            )));
        }
        miner.bookings().claim_expired(booking.index).await?;
        let claimed_at = self.ledger.time().await;

        if user.bookings().get_by_index(booking.index).await? != BookingLookup::NotFound {
            return Err(CliError::Simulation(format!(
                "booking {} still live after claim",
                booking.index
            )));
        }

        Ok(SimulationReport {
            contract_address: contract.to_string(),
            miner: miner.address().to_string(),
            user: user.address().to_string(),
            miner_url: user.offers().miner_url(miner.address()).await?,
            offer,
            booking,
            extended_till,
            claimed_at,
            transactions: self.ledger.submitted_calls().await.len(),
        })
    }

    fn client(
        &self,
        contract: p2pc_broker::Address,
    ) -> Result<MarketplaceClient<SimulatedLedger>, CliError> {
        let client =
            MarketplaceClient::new(self.ledger.clone(), Wallet::generate(), contract, CONFIRMATION)?;
        Ok(client)
    }
}

impl Default for SimulateCommand {
    fn default() -> Self {
        Self::new()
    }
}
