//! In-memory ledger hosting marketplace programs.
//!
//! [`SimulatedLedger`] implements [`LedgerConnection`] with the program's
//! authoritative rules: signature and nonce checks on submission, ownership
//! and availability checks on execution, the booking state machine, and
//! expiry against a manually advanced clock. Accepted submissions wait in a
//! mempool and execute the next time the ledger is touched, unless inclusion
//! is paused.
//!
//! Clones share state, so one ledger can serve several clients.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::booking::{AbortType, BookingEvent, BookingState};
use crate::endpoint::URL_FIELD_LEN;
use crate::error::{BrokerError, Result};
use crate::ledger::{BookingRecord, LedgerConnection, Query};
use crate::offer::Offer;
use crate::transaction::{Call, Receipt, ReceiptStatus, SignedCall, TxHash};
use crate::wallet::Address;

/// Ledger time at genesis.
pub const GENESIS_TIME: u64 = 1_700_000_000;

#[derive(Debug)]
struct StoredBooking {
    record: BookingRecord,
    offer_index: u64,
    state: BookingState,
}

impl StoredBooking {
    const fn is_live(&self) -> bool {
        !self.state.is_terminal()
    }
}

#[derive(Debug)]
struct Program {
    decimals: u8,
    offers: Vec<Offer>,
    bookings: BTreeMap<u64, StoredBooking>,
    next_booking: u64,
    miner_urls: HashMap<Address, [u8; URL_FIELD_LEN]>,
}

impl Program {
    fn new(decimals: u8) -> Self {
        Self {
            decimals,
            offers: Vec::new(),
            bookings: BTreeMap::new(),
            next_booking: 0,
            miner_urls: HashMap::new(),
        }
    }

    fn live_bookings(&self, filter: impl Fn(&BookingRecord) -> bool) -> Vec<BookingRecord> {
        self.bookings
            .values()
            .filter(|b| b.is_live() && filter(&b.record))
            .map(|b| b.record.clone())
            .collect()
    }

    fn offer_mut(&mut self, index: u64) -> std::result::Result<&mut Offer, String> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.offers.get_mut(i))
            .ok_or_else(|| format!("offer {index} does not exist"))
    }

    fn booking_mut(&mut self, index: u64) -> std::result::Result<&mut StoredBooking, String> {
        match self.bookings.get_mut(&index) {
            Some(booking) if booking.is_live() => Ok(booking),
            Some(_) => Err(format!("booking {index} is terminated")),
            None => Err(format!("booking {index} does not exist")),
        }
    }

    fn release_machine(&mut self, offer_index: u64) -> std::result::Result<(), String> {
        let offer = self.offer_mut(offer_index)?;
        offer.machines_available = offer.machines_available.saturating_add(1);
        Ok(())
    }

    /// Execute one call. Checks run before any mutation, so a revert leaves
    /// the program unchanged.
    fn execute(&mut self, from: Address, call: &Call, now: u64) -> std::result::Result<(), String> {
        match *call {
            Call::AddOffer {
                price_per_second,
                vm_type_id,
                machines_available,
            } => {
                let index = self.offers.len() as u64;
                self.offers.push(Offer {
                    index,
                    miner: from,
                    vm_type_id,
                    price_per_second,
                    machines_available,
                });
            }
            Call::UpdateOffer {
                index,
                price_per_second,
                vm_type_id,
                machines_available,
            } => {
                let offer = self.offer_mut(index)?;
                if offer.miner != from {
                    return Err(format!("offer {index} is not owned by caller"));
                }
                offer.price_per_second = price_per_second;
                offer.vm_type_id = vm_type_id;
                offer.machines_available = machines_available;
            }
            Call::SetMinerUrl { url } => {
                self.miner_urls.insert(from, url);
            }
            Call::BookVm {
                offer_index,
                seconds,
            } => {
                if seconds == 0 {
                    return Err("booking duration must be positive".to_string());
                }
                let booked_till = now
                    .checked_add(seconds)
                    .ok_or_else(|| "booking duration overflows ledger time".to_string())?;
                let index = self.next_booking;
                let offer = self.offer_mut(offer_index)?;
                if offer.machines_available == 0 {
                    return Err(format!("offer {offer_index} has no machines available"));
                }
                offer.machines_available -= 1;
                let record = BookingRecord {
                    index,
                    vm_type_id: offer.vm_type_id,
                    price_per_second: offer.price_per_second,
                    miner: offer.miner,
                    user: from,
                    booked_at: now,
                    booked_till,
                };
                self.bookings.insert(
                    index,
                    StoredBooking {
                        record,
                        offer_index,
                        state: BookingState::Booked,
                    },
                );
                self.next_booking += 1;
            }
            Call::ExtendBooking { index, seconds } => {
                let booking = self.booking_mut(index)?;
                if booking.record.user != from {
                    return Err(format!("only the user can extend booking {index}"));
                }
                if now >= booking.record.booked_till {
                    return Err(format!("booking {index} has expired"));
                }
                if seconds == 0 {
                    return Err("extension must be positive".to_string());
                }
                let booked_till = booking
                    .record
                    .booked_till
                    .checked_add(seconds)
                    .ok_or_else(|| "extension overflows ledger time".to_string())?;
                booking.state = transition(booking.state, BookingEvent::Extend, index)?;
                booking.record.booked_till = booked_till;
            }
            Call::AbortBooking { index, abort_type } => {
                let abort_type = AbortType::from_code(abort_type)
                    .ok_or_else(|| format!("unknown abort type {abort_type}"))?;
                let booking = self.booking_mut(index)?;
                let allowed = match abort_type {
                    AbortType::User => booking.record.user == from,
                    AbortType::Miner => booking.record.miner == from,
                    AbortType::Dispute => {
                        booking.record.user == from || booking.record.miner == from
                    }
                };
                if !allowed {
                    return Err(format!("caller may not abort booking {index} as {abort_type}"));
                }
                if now >= booking.record.booked_till {
                    return Err(format!("booking {index} has expired, claim it instead"));
                }
                booking.state = transition(booking.state, BookingEvent::Abort(abort_type), index)?;
                let offer_index = booking.offer_index;
                self.release_machine(offer_index)?;
            }
            Call::ClaimExpired { index } => {
                let booking = self.booking_mut(index)?;
                if booking.record.user != from && booking.record.miner != from {
                    return Err(format!("caller is not a party to booking {index}"));
                }
                if now < booking.record.booked_till {
                    return Err(format!("booking {index} has not expired"));
                }
                booking.state = transition(booking.state, BookingEvent::ClaimExpired, index)?;
                let offer_index = booking.offer_index;
                self.release_machine(offer_index)?;
            }
        }
        Ok(())
    }

    fn answer(&self, query: &Query, state: &State) -> Result<serde_json::Value> {
        let value = match query {
            Query::Decimals => serde_json::to_value(self.decimals)?,
            Query::Time => serde_json::to_value(state.time)?,
            Query::Nonce { account } => serde_json::to_value(state.nonce_of(account))?,
            Query::MinerOffers { miner } => to_value(
                self.offers
                    .iter()
                    .filter(|o| o.miner == *miner)
                    .collect::<Vec<_>>(),
            )?,
            Query::AvailableOffers { vm_type_id } => to_value(
                self.offers
                    .iter()
                    .filter(|o| o.vm_type_id == *vm_type_id && o.machines_available > 0)
                    .collect::<Vec<_>>(),
            )?,
            Query::MinerUrl { miner } => to_value(
                self.miner_urls
                    .get(miner)
                    .copied()
                    .unwrap_or([0u8; URL_FIELD_LEN]),
            )?,
            Query::Booking { index } => to_value(
                self.bookings
                    .get(index)
                    .filter(|b| b.is_live())
                    .map_or_else(BookingRecord::empty, |b| b.record.clone()),
            )?,
            Query::BookingsByUser { user } => to_value(self.live_bookings(|r| r.user == *user))?,
            Query::BookingsByMiner { miner } => {
                to_value(self.live_bookings(|r| r.miner == *miner))?
            }
        };
        Ok(value)
    }
}

fn transition(
    state: BookingState,
    event: BookingEvent,
    index: u64,
) -> std::result::Result<BookingState, String> {
    state
        .after(event)
        .ok_or_else(|| format!("booking {index} is terminated"))
}

fn to_value<T: Serialize>(value: T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

#[derive(Debug)]
struct Pending {
    tx_hash: TxHash,
    call: SignedCall,
}

#[derive(Debug)]
struct State {
    time: u64,
    programs: HashMap<Address, Program>,
    deployed: u64,
    nonces: HashMap<Address, u64>,
    mempool: VecDeque<Pending>,
    receipts: HashMap<TxHash, Receipt>,
    receipt_polls: HashMap<TxHash, u32>,
    receipt_delay: u32,
    inclusion_paused: bool,
    offline: bool,
    query_counts: HashMap<&'static str, usize>,
    submissions: Vec<Call>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            time: GENESIS_TIME,
            programs: HashMap::new(),
            deployed: 0,
            nonces: HashMap::new(),
            mempool: VecDeque::new(),
            receipts: HashMap::new(),
            receipt_polls: HashMap::new(),
            receipt_delay: 0,
            inclusion_paused: false,
            offline: false,
            query_counts: HashMap::new(),
            submissions: Vec::new(),
        }
    }
}

impl State {
    fn nonce_of(&self, account: &Address) -> u64 {
        self.nonces.get(account).copied().unwrap_or_default()
    }

    fn check_online(&self, operation: &str) -> Result<()> {
        if self.offline {
            return Err(BrokerError::connection(operation, "ledger unreachable"));
        }
        Ok(())
    }

    /// Execute everything in the mempool, in submission order.
    fn include_pending(&mut self) {
        if self.inclusion_paused {
            return;
        }
        while let Some(Pending { tx_hash, call }) = self.mempool.pop_front() {
            let envelope = &call.envelope;
            let status = match self.programs.get_mut(&envelope.contract) {
                Some(program) => match program.execute(envelope.from, &envelope.call, self.time) {
                    Ok(()) => ReceiptStatus::Success,
                    Err(reason) => ReceiptStatus::Reverted { reason },
                },
                None => ReceiptStatus::Reverted {
                    reason: format!("program {} does not exist", envelope.contract),
                },
            };
            match &status {
                ReceiptStatus::Success => {
                    debug!(tx_hash = %tx_hash, call = %envelope.call, "call executed");
                }
                ReceiptStatus::Reverted { reason } => {
                    debug!(tx_hash = %tx_hash, call = %envelope.call, reason, "call reverted");
                }
            }
            self.receipts.insert(
                tx_hash,
                Receipt {
                    tx_hash,
                    status,
                    included_at: self.time,
                },
            );
        }
    }
}

/// Shared in-memory ledger.
#[derive(Debug, Clone, Default)]
pub struct SimulatedLedger {
    state: Arc<RwLock<State>>,
}

impl SimulatedLedger {
    /// Create an empty ledger at [`GENESIS_TIME`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploy a marketplace program paying in an asset with `decimals`, and
    /// return its address.
    pub async fn deploy_marketplace(&self, decimals: u8) -> Address {
        let mut state = self.state.write().await;
        state.deployed += 1;
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"p2pc-marketplace");
        hasher.update(&state.deployed.to_le_bytes());
        let address = Address::new(*hasher.finalize().as_bytes());
        state.programs.insert(address, Program::new(decimals));
        info!(contract = %address, decimals, "marketplace deployed");
        address
    }

    /// Current ledger time.
    pub async fn time(&self) -> u64 {
        self.state.read().await.time
    }

    /// Move the clock forward. Pending calls execute at the old time first.
    pub async fn advance_time(&self, seconds: u64) {
        let mut state = self.state.write().await;
        state.include_pending();
        state.time = state.time.saturating_add(seconds);
        debug!(time = state.time, "ledger time advanced");
    }

    /// Hold accepted submissions in the mempool.
    pub async fn pause_inclusion(&self) {
        self.state.write().await.inclusion_paused = true;
    }

    /// Resume executing submissions.
    pub async fn resume_inclusion(&self) {
        self.state.write().await.inclusion_paused = false;
    }

    /// Withhold each receipt for the given number of polls after inclusion.
    pub async fn set_receipt_delay(&self, polls: u32) {
        self.state.write().await.receipt_delay = polls;
    }

    /// Make every operation fail with a connection error.
    pub async fn set_offline(&self, offline: bool) {
        self.state.write().await.offline = offline;
    }

    /// Number of queries served for a ledger method name.
    pub async fn query_count(&self, method: &str) -> usize {
        self.state
            .read()
            .await
            .query_counts
            .get(method)
            .copied()
            .unwrap_or_default()
    }

    /// Number of accepted submissions for a ledger method name.
    pub async fn submission_count(&self, method: &str) -> usize {
        self.state
            .read()
            .await
            .submissions
            .iter()
            .filter(|call| call.method() == method)
            .count()
    }

    /// All accepted submissions, in order.
    pub async fn submitted_calls(&self) -> Vec<Call> {
        self.state.read().await.submissions.clone()
    }
}

impl LedgerConnection for SimulatedLedger {
    async fn query(&self, contract: &Address, query: &Query) -> Result<serde_json::Value> {
        let mut state = self.state.write().await;
        state.check_online(query.method())?;
        state.include_pending();
        *state.query_counts.entry(query.method()).or_default() += 1;

        let program = state
            .programs
            .get(contract)
            .ok_or_else(|| BrokerError::not_found(format!("program {contract}")))?;
        program.answer(query, &state)
    }

    async fn submit(&self, call: &SignedCall) -> Result<TxHash> {
        let mut state = self.state.write().await;
        let method = call.envelope.call.method();
        state.check_online(method)?;

        if !call.verify() {
            return Err(BrokerError::rejected(method, "invalid signature"));
        }
        let envelope = &call.envelope;
        if !state.programs.contains_key(&envelope.contract) {
            return Err(BrokerError::rejected(
                method,
                format!("program {} does not exist", envelope.contract),
            ));
        }
        let expected = state.nonce_of(&envelope.from);
        if envelope.nonce != expected {
            return Err(BrokerError::rejected(
                method,
                format!("nonce {} does not match expected {expected}", envelope.nonce),
            ));
        }

        let tx_hash = call.hash()?;
        state.nonces.insert(envelope.from, expected + 1);
        state.submissions.push(envelope.call.clone());
        state.mempool.push_back(Pending {
            tx_hash,
            call: call.clone(),
        });
        debug!(tx_hash = %tx_hash, from = %envelope.from, nonce = envelope.nonce, call = %envelope.call, "submission accepted");
        Ok(tx_hash)
    }

    async fn receipt(&self, tx_hash: &TxHash) -> Result<Option<Receipt>> {
        let mut state = self.state.write().await;
        state.check_online("get_receipt")?;
        state.include_pending();

        let Some(receipt) = state.receipts.get(tx_hash).cloned() else {
            return Ok(None);
        };
        let delay = state.receipt_delay;
        let polls = state.receipt_polls.entry(*tx_hash).or_default();
        if *polls < delay {
            *polls += 1;
            return Ok(None);
        }
        Ok(Some(receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::CallEnvelope;
    use crate::wallet::{Signer, Wallet};

    fn signed(wallet: &Wallet, contract: Address, nonce: u64, call: Call) -> SignedCall {
        let envelope = CallEnvelope {
            contract,
            from: *wallet.address(),
            nonce,
            call,
        };
        SignedCall::sign(envelope, wallet).expect("sign")
    }

    fn add_offer(machines: u64) -> Call {
        Call::AddOffer {
            price_per_second: 100,
            vm_type_id: 2,
            machines_available: machines,
        }
    }

    async fn execute(
        ledger: &SimulatedLedger,
        wallet: &Wallet,
        contract: Address,
        call: Call,
    ) -> Receipt {
        let nonce: u64 = serde_json::from_value(
            ledger
                .query(
                    &contract,
                    &Query::Nonce {
                        account: *wallet.address(),
                    },
                )
                .await
                .expect("nonce"),
        )
        .expect("decode nonce");
        let tx_hash = ledger
            .submit(&signed(wallet, contract, nonce, call))
            .await
            .expect("submit");
        ledger
            .receipt(&tx_hash)
            .await
            .expect("receipt")
            .expect("included")
    }

    #[tokio::test]
    async fn test_deployments_get_distinct_addresses() {
        let ledger = SimulatedLedger::new();
        let a = ledger.deploy_marketplace(6).await;
        let b = ledger.deploy_marketplace(6).await;
        assert_ne!(a, b);
        assert!(!a.is_zero());
    }

    #[tokio::test]
    async fn test_rejects_bad_nonce() {
        let ledger = SimulatedLedger::new();
        let contract = ledger.deploy_marketplace(6).await;
        let wallet = Wallet::generate();

        let err = ledger
            .submit(&signed(&wallet, contract, 5, add_offer(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::SubmissionRejected { .. }));
        assert!(ledger.submitted_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_forged_signature() {
        let ledger = SimulatedLedger::new();
        let contract = ledger.deploy_marketplace(6).await;
        let wallet = Wallet::generate();

        let mut call = signed(&wallet, contract, 0, add_offer(1));
        call.envelope.call = add_offer(100);
        let err = ledger.submit(&call).await.unwrap_err();
        assert!(matches!(err, BrokerError::SubmissionRejected { .. }));
    }

    #[tokio::test]
    async fn test_rejects_unknown_program() {
        let ledger = SimulatedLedger::new();
        let wallet = Wallet::generate();
        let err = ledger
            .submit(&signed(&wallet, Address::new([7u8; 32]), 0, add_offer(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::SubmissionRejected { .. }));
    }

    #[tokio::test]
    async fn test_paused_inclusion_withholds_receipt() {
        let ledger = SimulatedLedger::new();
        let contract = ledger.deploy_marketplace(6).await;
        let wallet = Wallet::generate();
        ledger.pause_inclusion().await;

        let tx_hash = ledger
            .submit(&signed(&wallet, contract, 0, add_offer(1)))
            .await
            .expect("submit");
        assert_eq!(ledger.receipt(&tx_hash).await.expect("receipt"), None);

        ledger.resume_inclusion().await;
        let receipt = ledger.receipt(&tx_hash).await.expect("receipt").expect("included");
        assert!(receipt.is_success());
    }

    #[tokio::test]
    async fn test_receipt_delay_counts_polls() {
        let ledger = SimulatedLedger::new();
        let contract = ledger.deploy_marketplace(6).await;
        let wallet = Wallet::generate();
        ledger.set_receipt_delay(2).await;

        let tx_hash = ledger
            .submit(&signed(&wallet, contract, 0, add_offer(1)))
            .await
            .expect("submit");
        assert_eq!(ledger.receipt(&tx_hash).await.expect("first"), None);
        assert_eq!(ledger.receipt(&tx_hash).await.expect("second"), None);
        assert!(ledger.receipt(&tx_hash).await.expect("third").is_some());
    }

    #[tokio::test]
    async fn test_booking_consumes_and_claim_restores_machine() {
        let ledger = SimulatedLedger::new();
        let contract = ledger.deploy_marketplace(6).await;
        let miner = Wallet::generate();
        let user = Wallet::generate();

        assert!(execute(&ledger, &miner, contract, add_offer(1)).await.is_success());
        let book = Call::BookVm {
            offer_index: 0,
            seconds: 10,
        };
        assert!(execute(&ledger, &user, contract, book.clone()).await.is_success());

        let sold_out = execute(&ledger, &user, contract, book).await;
        assert!(matches!(
            sold_out.status,
            ReceiptStatus::Reverted { ref reason } if reason.contains("no machines")
        ));

        ledger.advance_time(10).await;
        let claim = execute(&ledger, &miner, contract, Call::ClaimExpired { index: 0 }).await;
        assert!(claim.is_success());

        let available = ledger
            .query(&contract, &Query::AvailableOffers { vm_type_id: 2 })
            .await
            .expect("query");
        let offers: Vec<Offer> = serde_json::from_value(available).expect("decode");
        assert_eq!(offers[0].machines_available, 1);
    }

    #[tokio::test]
    async fn test_miner_cannot_abort_as_user() {
        let ledger = SimulatedLedger::new();
        let contract = ledger.deploy_marketplace(6).await;
        let miner = Wallet::generate();
        let user = Wallet::generate();

        execute(&ledger, &miner, contract, add_offer(1)).await;
        execute(
            &ledger,
            &user,
            contract,
            Call::BookVm {
                offer_index: 0,
                seconds: 10,
            },
        )
        .await;

        let abort = |abort_type: AbortType| Call::AbortBooking {
            index: 0,
            abort_type: abort_type.code(),
        };
        assert!(!execute(&ledger, &miner, contract, abort(AbortType::User)).await.is_success());
        assert!(execute(&ledger, &miner, contract, abort(AbortType::Dispute)).await.is_success());
        assert!(!execute(&ledger, &user, contract, abort(AbortType::Dispute)).await.is_success());
    }

    #[tokio::test]
    async fn test_unknown_booking_reads_as_empty_record() {
        let ledger = SimulatedLedger::new();
        let contract = ledger.deploy_marketplace(6).await;
        let value = ledger
            .query(&contract, &Query::Booking { index: 3 })
            .await
            .expect("query");
        let record: BookingRecord = serde_json::from_value(value).expect("decode");
        assert_eq!(record, BookingRecord::empty());
    }

    #[tokio::test]
    async fn test_offline_fails_every_operation() {
        let ledger = SimulatedLedger::new();
        let contract = ledger.deploy_marketplace(6).await;
        ledger.set_offline(true).await;

        let err = ledger.query(&contract, &Query::Time).await.unwrap_err();
        assert!(err.is_retryable());
        let err = ledger.receipt(&TxHash::new([0u8; 32])).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
