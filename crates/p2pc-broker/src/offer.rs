//! Miner offers and callback endpoint registration.
//!
//! Offer prices are posted and reported in raw ledger units. Unlike
//! bookings, they are not converted with the asset's decimals: a miner
//! publishes the integer price the program will charge per second, and
//! callers that want a decimal view apply [`MarketplaceClient::converter`]
//! themselves.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::MarketplaceClient;
use crate::endpoint::{decode_url, encode_url, URL_FIELD_LEN};
use crate::error::Result;
use crate::idempotent::{set_if_changed, WriteOutcome};
use crate::ledger::{LedgerConnection, Query};
use crate::transaction::{Call, Receipt};
use crate::wallet::Address;

/// A miner's standing offer of rentable machines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    /// Ledger-assigned index.
    pub index: u64,
    /// Owning miner.
    pub miner: Address,
    /// Machine category.
    pub vm_type_id: u64,
    /// Price per second in ledger units.
    #[serde(with = "crate::ledger::u128_string")]
    pub price_per_second: u128,
    /// Machines left to book.
    pub machines_available: u64,
}

/// Offer operations for one client.
pub struct OfferRegistry<'a, L> {
    client: &'a MarketplaceClient<L>,
}

impl<'a, L: LedgerConnection> OfferRegistry<'a, L> {
    pub(crate) const fn new(client: &'a MarketplaceClient<L>) -> Self {
        Self { client }
    }

    /// Register the callback endpoint if needed, then publish an offer.
    ///
    /// The offer is not submitted if endpoint registration fails.
    ///
    /// # Errors
    ///
    /// Returns the endpoint registration error, or the confirmation error of
    /// the offer submission.
    pub async fn add_offer(
        &self,
        price_per_second: u128,
        vm_type_id: u64,
        machines_available: u64,
        callback_url: &str,
    ) -> Result<Receipt> {
        self.register_endpoint_if_needed(callback_url).await?;

        let receipt = self
            .client
            .submit_and_confirm(Call::AddOffer {
                price_per_second,
                vm_type_id,
                machines_available,
            })
            .await?;

        info!(
            miner = %self.client.address(),
            vm_type_id,
            price_per_second = %price_per_second,
            machines_available,
            "offer added"
        );
        Ok(receipt)
    }

    /// Offers published by this client's address.
    ///
    /// # Errors
    ///
    /// Returns the query error.
    pub async fn list_own_offers(&self) -> Result<Vec<Offer>> {
        self.list_miner_offers(self.client.address()).await
    }

    /// Offers published by any miner.
    ///
    /// # Errors
    ///
    /// Returns the query error.
    pub async fn list_miner_offers(&self, miner: &Address) -> Result<Vec<Offer>> {
        self.client.read(Query::MinerOffers { miner: *miner }).await
    }

    /// Offers of a machine category that still have machines available.
    ///
    /// # Errors
    ///
    /// Returns the query error.
    pub async fn list_available_offers(&self, vm_type_id: u64) -> Result<Vec<Offer>> {
        self.client
            .read(Query::AvailableOffers { vm_type_id })
            .await
    }

    /// Replace price, category, and availability of an existing offer.
    ///
    /// Existence and ownership are checked by the ledger; a foreign or
    /// unknown index surfaces as `ExecutionReverted`.
    ///
    /// # Errors
    ///
    /// Returns the confirmation error.
    pub async fn update_offer(&self, offer: &Offer) -> Result<Receipt> {
        let receipt = self
            .client
            .submit_and_confirm(Call::UpdateOffer {
                index: offer.index,
                price_per_second: offer.price_per_second,
                vm_type_id: offer.vm_type_id,
                machines_available: offer.machines_available,
            })
            .await?;
        info!(offer = offer.index, "offer updated");
        Ok(receipt)
    }

    /// Stored callback URL of a miner, empty if never set.
    ///
    /// # Errors
    ///
    /// Returns the query error, or an encoding error if the stored field is
    /// malformed.
    pub async fn miner_url(&self, miner: &Address) -> Result<String> {
        let field: [u8; URL_FIELD_LEN] = self
            .client
            .read(Query::MinerUrl { miner: *miner })
            .await?;
        decode_url(&field)
    }

    /// Store this client's callback URL unless it is already current.
    ///
    /// The stored value is compared first, so re-registering the current URL
    /// is a no-op even if it would not pass validation as a new value.
    ///
    /// # Errors
    ///
    /// Returns the read error, an encoding error for an unusable URL (checked
    /// before anything is submitted), or the confirmation error.
    pub async fn register_endpoint_if_needed(&self, url: &str) -> Result<WriteOutcome> {
        let outcome = set_if_changed(
            self.miner_url(self.client.address()),
            &url.to_string(),
            || async move {
                let field = encode_url(url)?;
                self.client
                    .submit_and_confirm(Call::SetMinerUrl { url: field })
                    .await
            },
        )
        .await?;

        match &outcome {
            WriteOutcome::Unchanged => debug!(url, "miner url already registered"),
            WriteOutcome::Written(_) => {
                info!(miner = %self.client.address(), url, "miner url registered");
            }
        }
        Ok(outcome)
    }
}
