//! Integration tests for the marketplace flow.
//!
//! Drives several independent clients against one shared in-memory ledger:
//! 1. Miner publishes an offer (endpoint registered once)
//! 2. Users discover and book machines
//! 3. Bookings are extended, aborted, or claimed after expiry
//! 4. Confirmation timeouts are reconciled by transaction status

use p2pc_broker::{
    AbortType, Address, BookingLookup, BrokerError, ConfirmationConfig, MarketplaceClient,
    SimulatedLedger, TxStatus, Wallet,
};

// ============================================================================
// Helper Functions
// ============================================================================

const MINER_URL: &str = "https://miner.example";

fn client(ledger: &SimulatedLedger, contract: Address) -> MarketplaceClient<SimulatedLedger> {
    MarketplaceClient::new(
        ledger.clone(),
        Wallet::generate(),
        contract,
        ConfirmationConfig {
            poll_interval_ms: 100,
            timeout_secs: 5,
        },
    )
    .expect("client")
}

async fn marketplace(decimals: u8) -> (SimulatedLedger, Address) {
    let ledger = SimulatedLedger::new();
    let contract = ledger.deploy_marketplace(decimals).await;
    (ledger, contract)
}

async fn book_and_index(user: &MarketplaceClient<SimulatedLedger>, offer: u64, seconds: u64) -> u64 {
    user.bookings().book(offer, seconds).await.expect("book");
    user.bookings()
        .find_own_user_bookings()
        .await
        .expect("find bookings")
        .iter()
        .map(|b| b.index)
        .max()
        .expect("booking listed")
}

// ============================================================================
// Offers
// ============================================================================

#[tokio::test]
async fn add_and_fetch_offer() {
    let (ledger, contract) = marketplace(6).await;
    let miner = client(&ledger, contract);

    miner
        .offers()
        .add_offer(100, 2, 5, MINER_URL)
        .await
        .expect("add offer");

    let offers = miner.offers().list_own_offers().await.expect("list");
    assert_eq!(offers.len(), 1);
    let offer = &offers[0];
    assert_eq!(offer.price_per_second, 100);
    assert_eq!(offer.vm_type_id, 2);
    assert_eq!(offer.machines_available, 5);

    let stranger = client(&ledger, contract);
    assert_eq!(
        stranger.offers().miner_url(miner.address()).await.expect("url"),
        MINER_URL
    );
    assert_eq!(
        stranger.offers().list_miner_offers(miner.address()).await.expect("list"),
        offers
    );
}

#[tokio::test]
async fn endpoint_written_at_most_once_across_offers() {
    let (ledger, contract) = marketplace(6).await;
    let miner = client(&ledger, contract);

    for vm_type in 1..=3 {
        miner
            .offers()
            .add_offer(100, vm_type, 1, MINER_URL)
            .await
            .expect("add offer");
    }
    assert_eq!(ledger.submission_count("set_miner_url").await, 1);
    assert_eq!(ledger.submission_count("add_offer").await, 3);
}

#[tokio::test]
async fn update_of_foreign_offer_reverts() {
    let (ledger, contract) = marketplace(6).await;
    let miner = client(&ledger, contract);
    let other = client(&ledger, contract);

    miner.offers().add_offer(100, 2, 5, MINER_URL).await.expect("add");
    let mut offer = miner.offers().list_own_offers().await.expect("list").remove(0);
    offer.machines_available = 0;

    let err = other.offers().update_offer(&offer).await.unwrap_err();
    assert!(matches!(err, BrokerError::ExecutionReverted { .. }));
    assert_eq!(
        miner.offers().list_own_offers().await.expect("list")[0].machines_available,
        5
    );
}

// ============================================================================
// Booking Lifecycle
// ============================================================================

#[tokio::test]
async fn book_then_claim_after_expiry() {
    let (ledger, contract) = marketplace(6).await;
    let miner = client(&ledger, contract);
    let user = client(&ledger, contract);

    miner.offers().add_offer(2_500_000, 2, 1, MINER_URL).await.expect("add");
    let offer = user.offers().list_available_offers(2).await.expect("available")[0].index;
    let index = book_and_index(&user, offer, 120).await;

    let booking = user.bookings().require(index).await.expect("booking");
    assert!((booking.price_per_second - 2.5).abs() < 1e-9);
    assert_eq!(booking.booked_till - booking.booked_at, 120);
    assert!(user.offers().list_available_offers(2).await.expect("available").is_empty());

    let early = miner.bookings().claim_expired(index).await.unwrap_err();
    assert!(early.is_reverted());

    ledger.advance_time(120).await;
    assert!(miner.bookings().is_expired(index).await.expect("expired"));
    miner.bookings().claim_expired(index).await.expect("claim");

    assert_eq!(
        user.bookings().get_by_index(index).await.expect("lookup"),
        BookingLookup::NotFound
    );
    assert_eq!(
        user.offers().list_available_offers(2).await.expect("available")[0].machines_available,
        1
    );
}

#[tokio::test]
async fn extensions_are_monotonic() {
    let (ledger, contract) = marketplace(9).await;
    let miner = client(&ledger, contract);
    let user = client(&ledger, contract);

    miner.offers().add_offer(1, 4, 1, MINER_URL).await.expect("add");
    let index = book_and_index(&user, 0, 60).await;

    let mut last = user.bookings().require(index).await.expect("booking").booked_till;
    for seconds in [1, 30, 3600] {
        user.bookings().extend(index, seconds).await.expect("extend");
        let till = user.bookings().require(index).await.expect("booking").booked_till;
        assert_eq!(till, last + seconds);
        last = till;
    }

    let err = miner.bookings().extend(index, 10).await.unwrap_err();
    assert!(err.is_reverted());
}

#[tokio::test]
async fn terminated_booking_rejects_everything() {
    let (ledger, contract) = marketplace(6).await;
    let miner = client(&ledger, contract);
    let user = client(&ledger, contract);

    miner.offers().add_offer(100, 2, 2, MINER_URL).await.expect("add");
    let index = book_and_index(&user, 0, 600).await;
    miner
        .bookings()
        .abort(index, AbortType::Miner)
        .await
        .expect("abort");

    let bookings = user.bookings();
    assert!(bookings.extend(index, 10).await.unwrap_err().is_reverted());
    assert!(bookings.abort(index, AbortType::User).await.unwrap_err().is_reverted());
    assert!(bookings.abort(index, AbortType::Dispute).await.unwrap_err().is_reverted());

    ledger.advance_time(600).await;
    assert!(bookings.claim_expired(index).await.unwrap_err().is_reverted());
    assert!(bookings.find_own_user_bookings().await.expect("find").is_empty());
}

#[tokio::test]
async fn lists_by_user_and_miner() {
    let (ledger, contract) = marketplace(6).await;
    let miner_a = client(&ledger, contract);
    let miner_b = client(&ledger, contract);
    let user = client(&ledger, contract);

    miner_a.offers().add_offer(100, 1, 1, MINER_URL).await.expect("a");
    miner_b
        .offers()
        .add_offer(200, 1, 1, "https://b.example")
        .await
        .expect("b");
    user.bookings().book(0, 60).await.expect("book a");
    user.bookings().book(1, 60).await.expect("book b");

    assert_eq!(user.bookings().find_own_user_bookings().await.expect("user").len(), 2);
    let served_by_a = user.bookings().find_by_miner(miner_a.address()).await.expect("a");
    assert_eq!(served_by_a.len(), 1);
    assert_eq!(served_by_a[0].user, *user.address());
    assert_eq!(
        miner_b.bookings().find_by_user(user.address()).await.expect("b").len(),
        2
    );
}

#[tokio::test]
async fn last_machine_goes_to_one_user() {
    let (ledger, contract) = marketplace(6).await;
    let miner = client(&ledger, contract);
    let first = client(&ledger, contract);
    let second = client(&ledger, contract);

    miner.offers().add_offer(100, 2, 1, MINER_URL).await.expect("add");

    let (first, second) = (first.bookings(), second.bookings());
    let (a, b) = tokio::join!(first.book(0, 60), second.book(0, 60));
    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(BrokerError::is_reverted));
}

// ============================================================================
// Confirmation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn timeout_then_applied_after_reconciliation() {
    let (ledger, contract) = marketplace(6).await;
    let miner = client(&ledger, contract);
    miner.offers().register_endpoint_if_needed(MINER_URL).await.expect("url");

    ledger.pause_inclusion().await;
    let err = miner.offers().add_offer(100, 2, 5, MINER_URL).await.unwrap_err();
    assert!(matches!(err, BrokerError::Timeout { .. }));

    assert!(miner.offers().list_own_offers().await.expect("list").is_empty());

    ledger.resume_inclusion().await;
    let pending = miner.pending_transactions();
    assert_eq!(pending.len(), 1);
    let status = miner.transaction_status(&pending[0]).await.expect("status");
    assert!(matches!(status, TxStatus::Included(ref receipt) if receipt.is_success()));
    assert_eq!(miner.offers().list_own_offers().await.expect("list").len(), 1);
    assert!(miner.pending_transactions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn timeout_then_absent() {
    let (ledger, contract) = marketplace(6).await;
    let user = client(&ledger, contract);

    ledger.pause_inclusion().await;
    let err = user.bookings().book(0, 60).await.unwrap_err();
    assert!(err.needs_reconciliation());

    let pending = user.pending_transactions();
    assert_eq!(pending.len(), 1);
    assert_eq!(
        user.transaction_status(&pending[0]).await.expect("status"),
        TxStatus::Pending
    );
    assert!(user.bookings().find_own_user_bookings().await.expect("find").is_empty());

    // No offer 0 exists, so once included the booking reverts.
    ledger.resume_inclusion().await;
    let status = user.transaction_status(&pending[0]).await.expect("status");
    assert!(matches!(status, TxStatus::Included(ref receipt) if !receipt.is_success()));
    assert!(user.bookings().find_own_user_bookings().await.expect("find").is_empty());
    assert!(user.pending_transactions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_receipts_still_confirm() {
    let (ledger, contract) = marketplace(6).await;
    let miner = client(&ledger, contract);
    ledger.set_receipt_delay(3).await;

    let receipt = miner
        .offers()
        .add_offer(100, 2, 5, MINER_URL)
        .await
        .expect("add offer");
    assert!(receipt.is_success());
}

#[tokio::test]
async fn regenerated_session_refetches_decimals() {
    let (ledger, contract) = marketplace(6).await;
    let mut user = client(&ledger, contract);

    user.bookings().find_own_user_bookings().await.expect("find");
    user.bookings().get_by_index(0).await.expect("lookup");
    assert_eq!(ledger.query_count("decimals").await, 1);

    user.regenerate_session();
    user.bookings().find_own_user_bookings().await.expect("find");
    assert_eq!(ledger.query_count("decimals").await, 2);
}
