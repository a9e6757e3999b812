//! Booking lifecycle: book, extend, abort, claim, and lookups.
//!
//! A booking moves through a small state machine:
//!
//! ```text
//! (none) --book--> Booked --extend--> Extended --extend--> Extended
//!                    |                   |
//!                    +--abort(type)------+--> Aborted(type)     [terminal]
//!                    +--claim_expired----+--> ExpiredClaimed    [terminal]
//! ```
//!
//! The ledger owns the rules. The client never pre-checks state before a
//! mutation; an illegal transition comes back as `ExecutionReverted`.
//! Money fields read back from the ledger are converted with the session's
//! decimals.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::amount::AmountConverter;
use crate::client::MarketplaceClient;
use crate::error::{BrokerError, Result};
use crate::ledger::{BookingRecord, LedgerConnection, Query};
use crate::transaction::{Call, Receipt};
use crate::wallet::Address;

/// Who ends a booking early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortType {
    /// The user gives the machine back.
    User,
    /// The miner withdraws the machine.
    Miner,
    /// Either party raises a dispute.
    Dispute,
}

impl AbortType {
    /// Numeric code passed to the ledger.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::User => 0,
            Self::Miner => 1,
            Self::Dispute => 2,
        }
    }

    /// Parse a ledger code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::User),
            1 => Some(Self::Miner),
            2 => Some(Self::Dispute),
            _ => None,
        }
    }
}

impl fmt::Display for AbortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Miner => write!(f, "miner"),
            Self::Dispute => write!(f, "dispute"),
        }
    }
}

/// Lifecycle state of an existing booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingState {
    /// Freshly booked.
    Booked,
    /// Extended at least once.
    Extended,
    /// Ended early.
    Aborted(AbortType),
    /// Reclaimed after expiry.
    ExpiredClaimed,
}

/// An operation on an existing booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingEvent {
    /// Push the expiry further out.
    Extend,
    /// End before expiry.
    Abort(AbortType),
    /// Close after expiry.
    ClaimExpired,
}

impl BookingState {
    /// Whether no further operation is accepted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Aborted(_) | Self::ExpiredClaimed)
    }

    /// State after `event`, or `None` if the event is not allowed here.
    ///
    /// Time-dependent guards (expiry) are not part of this table.
    #[must_use]
    pub const fn after(self, event: BookingEvent) -> Option<Self> {
        if self.is_terminal() {
            return None;
        }
        Some(match event {
            BookingEvent::Extend => Self::Extended,
            BookingEvent::Abort(abort_type) => Self::Aborted(abort_type),
            BookingEvent::ClaimExpired => Self::ExpiredClaimed,
        })
    }
}

/// A booking with its price converted to the asset's decimal scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    /// Ledger-assigned index.
    pub index: u64,
    /// Machine category.
    pub vm_type_id: u64,
    /// Price per second as a decimal amount.
    pub price_per_second: f64,
    /// Price per second in ledger units, as stored.
    #[serde(with = "crate::ledger::u128_string")]
    pub price_per_second_units: u128,
    /// Serving miner.
    pub miner: Address,
    /// Booking user.
    pub user: Address,
    /// Start time.
    pub booked_at: u64,
    /// Expiry time.
    pub booked_till: u64,
}

impl Booking {
    fn from_record(record: BookingRecord, converter: &AmountConverter) -> Self {
        Self {
            index: record.index,
            vm_type_id: record.vm_type_id,
            price_per_second: converter.to_decimal(record.price_per_second),
            price_per_second_units: record.price_per_second,
            miner: record.miner,
            user: record.user,
            booked_at: record.booked_at,
            booked_till: record.booked_till,
        }
    }

    /// Booked duration in seconds.
    #[must_use]
    pub const fn duration_secs(&self) -> u64 {
        self.booked_till.saturating_sub(self.booked_at)
    }

    /// Whether the booking has expired at `now`.
    #[must_use]
    pub const fn is_expired_at(&self, now: u64) -> bool {
        now >= self.booked_till
    }
}

/// Result of a booking lookup by index.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingLookup {
    /// The booking exists and is live.
    Found(Booking),
    /// Unknown index, or a booking that has been terminated.
    NotFound,
}

impl BookingLookup {
    /// Whether a booking was found.
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// The booking, if found.
    #[must_use]
    pub fn into_option(self) -> Option<Booking> {
        match self {
            Self::Found(booking) => Some(booking),
            Self::NotFound => None,
        }
    }
}

/// Booking operations for one client.
pub struct BookingLifecycle<'a, L> {
    client: &'a MarketplaceClient<L>,
}

impl<'a, L: LedgerConnection> BookingLifecycle<'a, L> {
    pub(crate) const fn new(client: &'a MarketplaceClient<L>) -> Self {
        Self { client }
    }

    /// Book `seconds` of one machine from an offer.
    ///
    /// The new booking's index is not returned; look it up with
    /// [`find_own_user_bookings`](Self::find_own_user_bookings).
    ///
    /// # Errors
    ///
    /// Returns the confirmation error. A sold-out or unknown offer is
    /// reported by the ledger as `ExecutionReverted`.
    pub async fn book(&self, offer_index: u64, seconds: u64) -> Result<Receipt> {
        let receipt = self
            .client
            .submit_and_confirm(Call::BookVm {
                offer_index,
                seconds,
            })
            .await?;
        info!(user = %self.client.address(), offer = offer_index, seconds, "vm booked");
        Ok(receipt)
    }

    /// Extend a live booking by `seconds`.
    ///
    /// # Errors
    ///
    /// Returns the confirmation error; terminated bookings revert.
    pub async fn extend(&self, index: u64, seconds: u64) -> Result<Receipt> {
        let receipt = self
            .client
            .submit_and_confirm(Call::ExtendBooking { index, seconds })
            .await?;
        info!(booking = index, seconds, "booking extended");
        Ok(receipt)
    }

    /// End a booking before it expires.
    ///
    /// # Errors
    ///
    /// Returns the confirmation error.
    pub async fn abort(&self, index: u64, abort_type: AbortType) -> Result<Receipt> {
        let receipt = self
            .client
            .submit_and_confirm(Call::AbortBooking {
                index,
                abort_type: abort_type.code(),
            })
            .await?;
        info!(booking = index, abort_type = %abort_type, "booking aborted");
        Ok(receipt)
    }

    /// Close a booking whose time has run out.
    ///
    /// # Errors
    ///
    /// Returns the confirmation error; the ledger reverts if the booking has
    /// not expired yet.
    pub async fn claim_expired(&self, index: u64) -> Result<Receipt> {
        let receipt = self
            .client
            .submit_and_confirm(Call::ClaimExpired { index })
            .await?;
        info!(booking = index, "expired booking claimed");
        Ok(receipt)
    }

    /// Live bookings made by `user`.
    ///
    /// # Errors
    ///
    /// Returns the decimals fetch error or the query error.
    pub async fn find_by_user(&self, user: &Address) -> Result<Vec<Booking>> {
        self.list(Query::BookingsByUser { user: *user }).await
    }

    /// Live bookings served by `miner`.
    ///
    /// # Errors
    ///
    /// Returns the decimals fetch error or the query error.
    pub async fn find_by_miner(&self, miner: &Address) -> Result<Vec<Booking>> {
        self.list(Query::BookingsByMiner { miner: *miner }).await
    }

    /// Live bookings made by this client.
    ///
    /// # Errors
    ///
    /// See [`find_by_user`](Self::find_by_user).
    pub async fn find_own_user_bookings(&self) -> Result<Vec<Booking>> {
        self.find_by_user(self.client.address()).await
    }

    /// Live bookings served by this client.
    ///
    /// # Errors
    ///
    /// See [`find_by_miner`](Self::find_by_miner).
    pub async fn find_own_miner_bookings(&self) -> Result<Vec<Booking>> {
        self.find_by_miner(self.client.address()).await
    }

    /// Look a booking up by index.
    ///
    /// # Errors
    ///
    /// Returns the decimals fetch error or the query error. A missing
    /// booking is not an error.
    pub async fn get_by_index(&self, index: u64) -> Result<BookingLookup> {
        let converter = self.client.converter().await?;
        let record: BookingRecord = self.client.read(Query::Booking { index }).await?;
        if record.miner.is_zero() {
            return Ok(BookingLookup::NotFound);
        }
        Ok(BookingLookup::Found(Booking::from_record(record, &converter)))
    }

    /// Look a booking up by index, treating absence as an error.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing booking, otherwise as
    /// [`get_by_index`](Self::get_by_index).
    pub async fn require(&self, index: u64) -> Result<Booking> {
        self.get_by_index(index)
            .await?
            .into_option()
            .ok_or_else(|| BrokerError::not_found(format!("booking {index}")))
    }

    /// Whether a live booking has expired by ledger time.
    ///
    /// Advisory only: the ledger re-checks when the claim executes.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing booking, or a query error.
    pub async fn is_expired(&self, index: u64) -> Result<bool> {
        let booking = self.require(index).await?;
        let now = self.client.ledger_time().await?;
        Ok(booking.is_expired_at(now))
    }

    async fn list(&self, query: Query) -> Result<Vec<Booking>> {
        let converter = self.client.converter().await?;
        let records: Vec<BookingRecord> = self.client.read(query).await?;
        Ok(records
            .into_iter()
            .filter(|record| !record.miner.is_zero())
            .map(|record| Booking::from_record(record, &converter))
            .collect())
    }
}
