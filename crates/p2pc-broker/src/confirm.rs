//! Transaction confirmation.
//!
//! Every mutation reaches the ledger through [`TransactionConfirmer`]: the
//! signed call is submitted once, then its receipt is polled at a fixed
//! interval until it appears or the confirmation bound elapses. Polling is a
//! wait, never a resubmission.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ConfirmationConfig;
use crate::error::{BrokerError, Result};
use crate::ledger::LedgerConnection;
use crate::transaction::{Receipt, ReceiptStatus, SignedCall, TxHash, TxStatus};

/// Submits signed calls and waits for their receipts.
#[derive(Debug, Clone, Copy)]
pub struct TransactionConfirmer {
    poll_interval: Duration,
    timeout: Duration,
}

impl TransactionConfirmer {
    /// Create a confirmer from polling settings.
    #[must_use]
    pub const fn new(config: ConfirmationConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
        }
    }

    /// Confirmation bound.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Submit a signed call and wait for a successful receipt.
    ///
    /// # Errors
    ///
    /// - `Connection` / `SubmissionRejected` if the submission itself fails
    ///   (nothing was sent for execution).
    /// - `Timeout` if no receipt is observed within the bound; the call may
    ///   still be included later.
    /// - `ExecutionReverted` if the ledger rejected the call's execution.
    pub async fn submit_and_confirm<L: LedgerConnection>(
        &self,
        ledger: &L,
        signed: &SignedCall,
    ) -> Result<Receipt> {
        let tx_hash = self.submit(ledger, signed).await?;
        self.confirm(ledger, tx_hash, &signed.envelope.call.to_string())
            .await
    }

    /// Submit a signed call once and return the identifier the ledger
    /// assigned to it.
    ///
    /// # Errors
    ///
    /// `Connection` / `SubmissionRejected` from the ledger.
    pub async fn submit<L: LedgerConnection>(
        &self,
        ledger: &L,
        signed: &SignedCall,
    ) -> Result<TxHash> {
        let tx_hash = ledger.submit(signed).await?;
        debug!(tx_hash = %tx_hash, operation = %signed.envelope.call, "transaction submitted");
        Ok(tx_hash)
    }

    /// Wait for the receipt of an already submitted transaction.
    ///
    /// # Errors
    ///
    /// `Timeout` or `ExecutionReverted`, as for [`Self::submit_and_confirm`].
    pub async fn confirm<L: LedgerConnection>(
        &self,
        ledger: &L,
        tx_hash: TxHash,
        operation: &str,
    ) -> Result<Receipt> {
        let Ok(receipt) =
            tokio::time::timeout(self.timeout, self.poll_receipt(ledger, &tx_hash)).await
        else {
            warn!(
                tx_hash = %tx_hash,
                operation,
                timeout_secs = self.timeout.as_secs(),
                "transaction not confirmed in time"
            );
            return Err(BrokerError::Timeout {
                operation: operation.to_string(),
                tx_hash: tx_hash.to_string(),
                timeout_secs: self.timeout.as_secs(),
            });
        };

        match &receipt.status {
            ReceiptStatus::Success => {
                info!(tx_hash = %tx_hash, operation, "transaction confirmed");
                Ok(receipt)
            }
            ReceiptStatus::Reverted { reason } => {
                warn!(tx_hash = %tx_hash, operation, reason = %reason, "transaction reverted");
                Err(BrokerError::reverted(operation, tx_hash.to_string(), reason.clone()))
            }
        }
    }

    /// Look up the inclusion status of a transaction without waiting.
    ///
    /// # Errors
    ///
    /// Returns the connection's error if the receipt cannot be fetched.
    pub async fn status<L: LedgerConnection>(&self, ledger: &L, tx_hash: &TxHash) -> Result<TxStatus> {
        Ok(match ledger.receipt(tx_hash).await? {
            Some(receipt) => TxStatus::Included(receipt),
            None => TxStatus::Pending,
        })
    }

    async fn poll_receipt<L: LedgerConnection>(&self, ledger: &L, tx_hash: &TxHash) -> Receipt {
        loop {
            match ledger.receipt(tx_hash).await {
                Ok(Some(receipt)) => return receipt,
                Ok(None) => debug!(tx_hash = %tx_hash, "receipt not available yet"),
                // Transport hiccups while waiting are not fatal; the bound still applies.
                Err(e) => warn!(tx_hash = %tx_hash, error = %e, "receipt retrieval failed"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl Default for TransactionConfirmer {
    fn default() -> Self {
        Self::new(ConfirmationConfig::default())
    }
}
