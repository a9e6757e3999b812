//! # p2pc-broker
//!
//! Client layer for a peer-to-peer compute rental marketplace.
//!
//! Miners publish offers of rentable machines on a shared ledger; users book
//! time on them, extend or abort bookings, and close expired ones. The ledger
//! program enforces the rules. This crate gets the client side right:
//!
//! - Every mutation is signed, submitted, and awaited until a receipt
//!   arrives or a timeout fires ([`TransactionConfirmer`])
//! - Decimal prices are converted to and from the ledger's fixed-point
//!   units with a per-session cached scale ([`AmountConverter`], [`DecimalsCache`])
//! - A miner's callback URL is only written when it changes
//! - Bookings follow an explicit lifecycle ([`BookingState`])
//!
//! ## Example
//!
//! ```rust,no_run
//! use p2pc_broker::{ConfirmationConfig, MarketplaceClient, SimulatedLedger, Wallet};
//!
//! # async fn example() -> p2pc_broker::Result<()> {
//! let ledger = SimulatedLedger::new();
//! let contract = ledger.deploy_marketplace(6).await;
//!
//! let miner = MarketplaceClient::new(
//!     ledger.clone(),
//!     Wallet::generate(),
//!     contract,
//!     ConfirmationConfig::default(),
//! )?;
//! miner.offers().add_offer(100, 2, 5, "https://miner.example").await?;
//!
//! let user = MarketplaceClient::new(
//!     ledger,
//!     Wallet::generate(),
//!     contract,
//!     ConfirmationConfig::default(),
//! )?;
//! let offers = user.offers().list_available_offers(2).await?;
//! user.bookings().book(offers[0].index, 3600).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod amount;
pub mod booking;
pub mod client;
pub mod config;
pub mod confirm;
pub mod decimals;
pub mod endpoint;
pub mod error;
pub mod idempotent;
pub mod ledger;
pub mod offer;
pub mod simulated;
pub mod transaction;
pub mod wallet;

pub use amount::AmountConverter;
pub use booking::{AbortType, Booking, BookingLifecycle, BookingLookup, BookingState};
pub use client::{MarketplaceClient, Session};
pub use config::{BrokerConfig, ConfirmationConfig};
pub use confirm::TransactionConfirmer;
pub use decimals::DecimalsCache;
pub use error::{BrokerError, Result};
pub use idempotent::{set_if_changed, WriteOutcome};
pub use ledger::{LedgerConnection, Query};
pub use offer::{Offer, OfferRegistry};
pub use simulated::SimulatedLedger;
pub use transaction::{Call, Receipt, TxHash, TxStatus};
pub use wallet::{Address, Signer, Wallet};
