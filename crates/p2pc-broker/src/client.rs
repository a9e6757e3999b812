//! Per-actor marketplace client.
//!
//! A [`MarketplaceClient`] binds one signing identity and one ledger
//! connection to a deployed marketplace program. Its [`Session`] carries
//! the state that is only valid for that binding: the cached decimals, the
//! next nonce, and the hashes of submissions whose confirmation timed out.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::amount::AmountConverter;
use crate::booking::BookingLifecycle;
use crate::config::{BrokerConfig, ConfirmationConfig};
use crate::confirm::TransactionConfirmer;
use crate::decimals::DecimalsCache;
use crate::error::{BrokerError, Result};
use crate::ledger::{LedgerConnection, Query};
use crate::offer::OfferRegistry;
use crate::transaction::{Call, CallEnvelope, Receipt, SignedCall, TxHash, TxStatus};
use crate::wallet::{Address, Signer};

/// State tied to one binding of identity, connection, and program.
#[derive(Debug)]
pub struct Session {
    contract: Address,
    decimals: DecimalsCache,
    next_nonce: tokio::sync::Mutex<Option<u64>>,
    pending: Mutex<HashSet<TxHash>>,
}

impl Session {
    fn new(contract: Address) -> Self {
        Self {
            contract,
            decimals: DecimalsCache::new(),
            next_nonce: tokio::sync::Mutex::new(None),
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Program this session is bound to.
    #[must_use]
    pub const fn contract(&self) -> &Address {
        &self.contract
    }

    /// Decimals, if already fetched in this session.
    #[must_use]
    pub fn cached_decimals(&self) -> Option<u8> {
        self.decimals.cached()
    }
}

/// Marketplace client for one actor.
pub struct MarketplaceClient<L> {
    ledger: L,
    signer: Arc<dyn Signer>,
    confirmer: TransactionConfirmer,
    session: Session,
}

impl<L: LedgerConnection> MarketplaceClient<L> {
    /// Bind a signer and a ledger connection to a deployed program.
    ///
    /// # Errors
    ///
    /// Returns a config error if the confirmation settings are invalid.
    pub fn new(
        ledger: L,
        signer: impl Signer + 'static,
        contract: Address,
        confirmation: ConfirmationConfig,
    ) -> Result<Self> {
        confirmation.validate()?;
        info!(contract = %contract, address = %signer.address(), "marketplace client bound");
        Ok(Self {
            ledger,
            signer: Arc::new(signer),
            confirmer: TransactionConfirmer::new(confirmation),
            session: Session::new(contract),
        })
    }

    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns a config error if the configuration is invalid.
    pub fn from_config(
        ledger: L,
        signer: impl Signer + 'static,
        config: &BrokerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Self::new(
            ledger,
            signer,
            config.contract_address,
            config.confirmation,
        )
    }

    /// Address of the signing identity.
    #[must_use]
    pub fn address(&self) -> &Address {
        self.signer.address()
    }

    /// Program the client is bound to.
    #[must_use]
    pub const fn contract(&self) -> &Address {
        &self.session.contract
    }

    /// Current session state.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Underlying ledger connection.
    #[must_use]
    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Offer operations.
    #[must_use]
    pub fn offers(&self) -> OfferRegistry<'_, L> {
        OfferRegistry::new(self)
    }

    /// Booking operations.
    #[must_use]
    pub fn bookings(&self) -> BookingLifecycle<'_, L> {
        BookingLifecycle::new(self)
    }

    /// Replace the session, keeping the same program.
    ///
    /// Drops cached decimals, the nonce, and pending-transaction tracking.
    pub fn regenerate_session(&mut self) {
        let contract = self.session.contract;
        self.rebind(contract);
    }

    /// Replace the session and bind to another program.
    pub fn rebind(&mut self, contract: Address) {
        info!(
            old = %self.session.contract,
            new = %contract,
            "session regenerated"
        );
        self.session = Session::new(contract);
    }

    /// Ledger time in seconds.
    ///
    /// For display and optimistic checks; the ledger decides expiry itself.
    ///
    /// # Errors
    ///
    /// Returns the connection's error if the query fails.
    pub async fn ledger_time(&self) -> Result<u64> {
        self.read(Query::Time).await
    }

    /// Decimals of the payment asset, fetched once per session.
    ///
    /// # Errors
    ///
    /// Returns the connection's error if the first fetch fails.
    pub async fn decimals(&self) -> Result<u8> {
        self.session.decimals.get(&self.ledger, &self.session.contract).await
    }

    /// Converter for the session's decimals, fetching them if needed.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; never falls back to a default scale.
    pub async fn converter(&self) -> Result<AmountConverter> {
        self.decimals().await?;
        self.session.decimals.converter()
    }

    /// Hashes of submissions whose confirmation timed out and which have not
    /// been reconciled yet.
    #[must_use]
    pub fn pending_transactions(&self) -> Vec<TxHash> {
        self.session.pending.lock().iter().copied().collect()
    }

    /// Check whether a submission has been included.
    ///
    /// An included transaction is removed from the pending set.
    ///
    /// # Errors
    ///
    /// Returns the connection's error if the receipt cannot be fetched.
    pub async fn transaction_status(&self, tx_hash: &TxHash) -> Result<TxStatus> {
        let status = self.confirmer.status(&self.ledger, tx_hash).await?;
        if matches!(status, TxStatus::Included(_)) {
            self.session.pending.lock().remove(tx_hash);
        }
        Ok(status)
    }

    /// Run a query against the bound program and decode its result.
    pub(crate) async fn read<T: DeserializeOwned>(&self, query: Query) -> Result<T> {
        let value = self.ledger.query(&self.session.contract, &query).await?;
        serde_json::from_value(value)
            .map_err(|e| BrokerError::invalid_response(query.method(), e.to_string()))
    }

    /// Sign a call with the next nonce, submit it, and wait for its receipt.
    ///
    /// Callers should keep one mutation in flight per session: submissions
    /// racing on the same identity can reach the ledger out of nonce order.
    ///
    /// # Errors
    ///
    /// See [`TransactionConfirmer::submit_and_confirm`].
    pub async fn submit_and_confirm(&self, call: Call) -> Result<Receipt> {
        let signed = self.sign_next(call).await?;

        let tx_hash = match self.confirmer.submit(&self.ledger, &signed).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                // The reserved nonce may not have been consumed; ask the ledger again next time.
                *self.session.next_nonce.lock().await = None;
                return Err(e);
            }
        };

        let operation = signed.envelope.call.to_string();
        let result = self.confirmer.confirm(&self.ledger, tx_hash, &operation).await;
        if matches!(&result, Err(e) if e.needs_reconciliation()) {
            self.session.pending.lock().insert(tx_hash);
        }
        result
    }

    async fn sign_next(&self, call: Call) -> Result<SignedCall> {
        let mut next_nonce = self.session.next_nonce.lock().await;
        let nonce = match *next_nonce {
            Some(nonce) => nonce,
            None => {
                let nonce = self
                    .read(Query::Nonce {
                        account: *self.address(),
                    })
                    .await?;
                debug!(address = %self.address(), nonce, "nonce fetched");
                nonce
            }
        };

        let envelope = CallEnvelope {
            contract: self.session.contract,
            from: *self.address(),
            nonce,
            call,
        };
        let signed = SignedCall::sign(envelope, self.signer.as_ref())?;
        *next_nonce = Some(nonce + 1);
        Ok(signed)
    }
}

#[allow(clippy::missing_fields_in_debug)]
impl<L> std::fmt::Debug for MarketplaceClient<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketplaceClient")
            .field("address", self.signer.address())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
