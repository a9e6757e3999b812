//! The ledger connection contract and the records it returns.
//!
//! The broker depends on three operations only: read-only queries, signed
//! call submission, and receipt polling. Any transport that can provide
//! them (RPC, in-process simulation) implements [`LedgerConnection`].

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::transaction::{Receipt, SignedCall, TxHash};
use crate::wallet::Address;

/// A read-only query on the marketplace program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Query {
    /// Decimals of the payment asset.
    Decimals,
    /// Current ledger time in seconds.
    Time,
    /// Next expected call nonce of an account.
    Nonce {
        /// Account address.
        account: Address,
    },
    /// Offers published by a miner.
    MinerOffers {
        /// Miner address.
        miner: Address,
    },
    /// Offers of a machine category with machines left.
    AvailableOffers {
        /// Machine category.
        vm_type_id: u64,
    },
    /// A miner's stored callback URL field.
    MinerUrl {
        /// Miner address.
        miner: Address,
    },
    /// A booking by index; unknown indices return an all-zero record.
    Booking {
        /// Booking index.
        index: u64,
    },
    /// Active bookings made by a user.
    BookingsByUser {
        /// User address.
        user: Address,
    },
    /// Active bookings served by a miner.
    BookingsByMiner {
        /// Miner address.
        miner: Address,
    },
}

impl Query {
    /// Method name on the ledger program.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::Decimals => "decimals",
            Self::Time => "get_time",
            Self::Nonce { .. } => "get_nonce",
            Self::MinerOffers { .. } => "get_miners_offers",
            Self::AvailableOffers { .. } => "get_available_offers",
            Self::MinerUrl { .. } => "get_miner_url",
            Self::Booking { .. } => "get_booking",
            Self::BookingsByUser { .. } => "find_bookings_by_user",
            Self::BookingsByMiner { .. } => "find_bookings_by_miner",
        }
    }
}

/// Request/response channel to the ledger.
#[allow(async_fn_in_trait)]
pub trait LedgerConnection {
    /// Run a read-only query against a program and return its decoded value.
    async fn query(&self, contract: &Address, query: &Query) -> Result<serde_json::Value>;

    /// Submit a signed call, returning its transaction hash.
    async fn submit(&self, call: &SignedCall) -> Result<TxHash>;

    /// Fetch the receipt for a transaction, `None` while not yet included.
    async fn receipt(&self, tx_hash: &TxHash) -> Result<Option<Receipt>>;
}

/// Booking record as stored by the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    /// Booking index.
    pub index: u64,
    /// Machine category.
    pub vm_type_id: u64,
    /// Price per second in ledger units.
    #[serde(with = "u128_string")]
    pub price_per_second: u128,
    /// Serving miner; [`Address::ZERO`] for a missing booking.
    pub miner: Address,
    /// Booking user.
    pub user: Address,
    /// Start time.
    pub booked_at: u64,
    /// Expiry time.
    pub booked_till: u64,
}

impl BookingRecord {
    /// The record the program returns for an unknown index.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            index: 0,
            vm_type_id: 0,
            price_per_second: 0,
            miner: Address::ZERO,
            user: Address::ZERO,
            booked_at: 0,
            booked_till: 0,
        }
    }
}

/// Serde helper carrying `u128` ledger integers as decimal strings, so
/// values above `u64::MAX` survive `serde_json::Value`.
pub mod u128_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Serialize as a decimal string.
    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    /// Deserialize from a decimal string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
