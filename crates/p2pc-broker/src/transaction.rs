//! State-changing calls, their signed envelopes, and receipts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, Result};
use crate::wallet::{Address, Signer};

/// A state-changing call on the marketplace program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Call {
    /// Publish a new offer owned by the signer.
    AddOffer {
        /// Price per second in ledger units.
        #[serde(with = "crate::ledger::u128_string")]
        price_per_second: u128,
        /// Machine category.
        vm_type_id: u64,
        /// Number of machines offered.
        machines_available: u64,
    },
    /// Replace price and availability of an existing offer.
    UpdateOffer {
        /// Offer index.
        index: u64,
        /// Price per second in ledger units.
        #[serde(with = "crate::ledger::u128_string")]
        price_per_second: u128,
        /// Machine category.
        vm_type_id: u64,
        /// Number of machines offered.
        machines_available: u64,
    },
    /// Store the signer's callback URL field.
    SetMinerUrl {
        /// Fixed-width encoded URL.
        url: [u8; 32],
    },
    /// Book one machine from an offer.
    BookVm {
        /// Offer index.
        offer_index: u64,
        /// Booking length in seconds.
        seconds: u64,
    },
    /// Extend an active booking.
    ExtendBooking {
        /// Booking index.
        index: u64,
        /// Additional seconds.
        seconds: u64,
    },
    /// Terminate an active booking early.
    AbortBooking {
        /// Booking index.
        index: u64,
        /// Ledger abort reason code.
        abort_type: u8,
    },
    /// Terminate a booking whose time has run out.
    ClaimExpired {
        /// Booking index.
        index: u64,
    },
}

impl Call {
    /// Method name on the ledger program.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::AddOffer { .. } => "add_offer",
            Self::UpdateOffer { .. } => "update_offer",
            Self::SetMinerUrl { .. } => "set_miner_url",
            Self::BookVm { .. } => "book_vm",
            Self::ExtendBooking { .. } => "extend_booking",
            Self::AbortBooking { .. } => "abort_booking",
            Self::ClaimExpired { .. } => "claim_expired",
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddOffer { vm_type_id, .. } => write!(f, "add_offer(vm_type {vm_type_id})"),
            Self::UpdateOffer { index, .. } => write!(f, "update_offer(offer {index})"),
            Self::SetMinerUrl { .. } => write!(f, "set_miner_url"),
            Self::BookVm {
                offer_index,
                seconds,
            } => write!(f, "book_vm(offer {offer_index}, {seconds}s)"),
            Self::ExtendBooking { index, seconds } => {
                write!(f, "extend_booking(booking {index}, {seconds}s)")
            }
            Self::AbortBooking { index, abort_type } => {
                write!(f, "abort_booking(booking {index}, type {abort_type})")
            }
            Self::ClaimExpired { index } => write!(f, "claim_expired(booking {index})"),
        }
    }
}

/// The signed portion of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEnvelope {
    /// Program the call targets.
    pub contract: Address,
    /// Signer address.
    pub from: Address,
    /// Per-signer sequence number.
    pub nonce: u64,
    /// The call itself.
    pub call: Call,
}

impl CallEnvelope {
    /// Canonical bytes covered by the signature.
    ///
    /// # Errors
    ///
    /// Returns error if the envelope cannot be serialized.
    pub fn payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A call envelope with its signature, ready for submission.
#[derive(Debug, Clone)]
pub struct SignedCall {
    /// The signed envelope.
    pub envelope: CallEnvelope,
    /// Ed25519 signature over [`CallEnvelope::payload`].
    pub signature: [u8; 64],
}

impl SignedCall {
    /// Sign an envelope.
    ///
    /// # Errors
    ///
    /// Returns error if the signer does not own `envelope.from` or the
    /// payload cannot be serialized.
    pub fn sign(envelope: CallEnvelope, signer: &dyn Signer) -> Result<Self> {
        if signer.address() != &envelope.from {
            return Err(BrokerError::Wallet {
                message: format!(
                    "signer {} cannot sign for {}",
                    signer.address(),
                    envelope.from
                ),
            });
        }
        let signature = signer.sign(&envelope.payload()?);
        Ok(Self {
            envelope,
            signature,
        })
    }

    /// Whether the signature matches the envelope's sender.
    #[must_use]
    pub fn verify(&self) -> bool {
        self.envelope
            .payload()
            .is_ok_and(|payload| self.envelope.from.verify(&payload, &self.signature))
    }

    /// Transaction hash identifying this submission.
    ///
    /// # Errors
    ///
    /// Returns error if the payload cannot be serialized.
    pub fn hash(&self) -> Result<TxHash> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.envelope.payload()?);
        hasher.update(&self.signature);
        Ok(TxHash(*hasher.finalize().as_bytes()))
    }
}

/// Transaction identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash([u8; 32]);

impl TxHash {
    /// Create from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

/// Execution outcome recorded in a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptStatus {
    /// The call executed and its effects are durable.
    Success,
    /// The call was included but its execution was rejected.
    Reverted {
        /// Revert reason reported by the program.
        reason: String,
    },
}

/// Ledger confirmation that a submission was included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Hash of the included submission.
    pub tx_hash: TxHash,
    /// Execution outcome.
    pub status: ReceiptStatus,
    /// Ledger time at inclusion.
    pub included_at: u64,
}

impl Receipt {
    /// Whether the call executed successfully.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, ReceiptStatus::Success)
    }
}

/// Inclusion status of a submission, for reconciliation after a timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// No receipt yet.
    Pending,
    /// Included with the given receipt.
    Included(Receipt),
}
