//! Error and failure case integration tests.

use std::sync::Arc;

use omp::marketplace::COIN;
use omp::mocks::MockNodeFailure;
use omp::{
    Cryptocurrency, EscrowPolicy, EscrowType, Network, OmpError, OpenMarketProtocol, OutputType,
};

use crate::common::{listing, TwoPartyHarness, BUYER_WALLET, PRICE, SELLER_WALLET};

#[tokio::test]
async fn test_bid_with_insufficient_funds() {
    let harness = TwoPartyHarness::unfunded(EscrowType::MadCt);
    harness
        .buyer
        .node
        .fund(BUYER_WALLET, OutputType::Blind, COIN)
        .await
        .unwrap();

    let err = harness
        .buyer
        .engine
        .bid(BUYER_WALLET, &harness.bid_config(), &harness.listing)
        .await
        .unwrap_err();
    assert!(
        matches!(err, OmpError::InsufficientFunds { required, available }
            if required == 4 * COIN && available == COIN),
        "{err}"
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_bid_ignores_outputs_of_the_wrong_type() {
    // MAD_CT funds from blinded outputs only.
    let harness = TwoPartyHarness::unfunded(EscrowType::MadCt);
    harness
        .buyer
        .node
        .fund(BUYER_WALLET, OutputType::Part, 10 * COIN)
        .await
        .unwrap();

    let err = harness
        .buyer
        .engine
        .bid(BUYER_WALLET, &harness.bid_config(), &harness.listing)
        .await
        .unwrap_err();
    assert!(matches!(err, OmpError::InsufficientFunds { .. }), "{err}");
}

#[tokio::test]
async fn test_accept_with_insufficient_seller_funds() {
    let harness = TwoPartyHarness::unfunded(EscrowType::MadCt);
    harness
        .buyer
        .node
        .fund(BUYER_WALLET, OutputType::Blind, 5 * COIN)
        .await
        .unwrap();
    // Covers the bond but not the funding fee.
    harness
        .seller
        .node
        .fund(SELLER_WALLET, OutputType::Blind, 2 * COIN)
        .await
        .unwrap();

    let bid = harness.bid().await;
    let err = harness
        .seller
        .engine
        .accept(SELLER_WALLET, &harness.listing, &bid)
        .await
        .unwrap_err();
    assert!(matches!(err, OmpError::InsufficientFunds { .. }), "{err}");
    assert!(harness
        .seller
        .node
        .locked_outpoints(SELLER_WALLET)
        .await
        .is_empty());
}

#[tokio::test]
async fn test_failed_bid_releases_reservation() {
    let harness = TwoPartyHarness::new().await;
    harness
        .buyer
        .node
        .set_fail_mode(Some(MockNodeFailure::DestinationCreation))
        .await;

    let err = harness
        .buyer
        .engine
        .bid(BUYER_WALLET, &harness.bid_config(), &harness.listing)
        .await
        .unwrap_err();
    assert!(matches!(err, OmpError::TransactionBuild(_)), "{err}");
    assert!(harness
        .buyer
        .node
        .locked_outpoints(BUYER_WALLET)
        .await
        .is_empty());

    // The same round succeeds once the node recovers.
    harness.buyer.node.set_fail_mode(None).await;
    harness.bid().await;
}

#[tokio::test]
async fn test_failed_accept_releases_reservation() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;
    harness
        .seller
        .node
        .set_fail_mode(Some(MockNodeFailure::Signing))
        .await;

    let err = harness
        .seller
        .engine
        .accept(SELLER_WALLET, &harness.listing, &bid)
        .await
        .unwrap_err();
    assert!(err.is_retryable(), "{err}");
    assert!(harness
        .seller
        .node
        .locked_outpoints(SELLER_WALLET)
        .await
        .is_empty());

    harness.seller.node.set_fail_mode(None).await;
    harness.accept(&bid).await;
}

#[tokio::test]
async fn test_fee_estimation_failure() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;
    harness
        .seller
        .node
        .set_fail_mode(Some(MockNodeFailure::FeeEstimation))
        .await;

    let err = harness
        .seller
        .engine
        .accept(SELLER_WALLET, &harness.listing, &bid)
        .await
        .unwrap_err();
    assert!(matches!(err, OmpError::TransactionBuild(_)), "{err}");
}

#[tokio::test]
async fn test_settlement_fee_above_policy() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;
    // 1000 bytes at 200 per byte is twice the testnet maximum.
    harness.chain.set_fee_rate(200);

    let err = harness
        .seller
        .engine
        .accept(SELLER_WALLET, &harness.listing, &bid)
        .await
        .unwrap_err();
    assert!(matches!(err, OmpError::TransactionBuild(_)), "{err}");
}

#[tokio::test]
async fn test_unsupported_escrow_type() {
    let harness = TwoPartyHarness::new().await;
    let multisig = listing(&harness.chain, EscrowType::Multisig, PRICE);
    let mut config = harness.bid_config();
    config.escrow = EscrowType::Multisig;

    let err = harness
        .buyer
        .engine
        .bid(BUYER_WALLET, &config, &multisig)
        .await
        .unwrap_err();
    assert!(
        matches!(err, OmpError::UnsupportedEscrowType(EscrowType::Multisig)),
        "{err}"
    );
}

#[tokio::test]
async fn test_escrow_mismatch() {
    let harness = TwoPartyHarness::new().await;
    let mut config = harness.bid_config();
    config.escrow = EscrowType::Mad;

    let err = harness
        .buyer
        .engine
        .bid(BUYER_WALLET, &config, &harness.listing)
        .await
        .unwrap_err();
    assert!(matches!(err, OmpError::EscrowMismatch(_)), "{err}");
}

#[tokio::test]
async fn test_malformed_listing_is_rejected() {
    let harness = TwoPartyHarness::new().await;
    let mut broken = harness.listing.clone();
    if let omp::MarketAction::ListingAdd(l) = &mut broken.action {
        l.item.information.category.clear();
    }

    let err = harness
        .buyer
        .engine
        .bid(BUYER_WALLET, &harness.bid_config(), &broken)
        .await
        .unwrap_err();
    assert!(
        matches!(&err, OmpError::InvalidListing(msg) if msg.contains("category")),
        "{err}"
    );
}

#[tokio::test]
async fn test_wrong_message_kind_in_place_of_accept() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;

    let err = harness
        .buyer
        .engine
        .lock(BUYER_WALLET, &harness.listing, &bid, &bid)
        .await
        .unwrap_err();
    assert!(matches!(err, OmpError::ProtocolViolation(_)), "{err}");
}

#[tokio::test]
async fn test_unknown_currency() {
    let engine = OpenMarketProtocol::builder(Network::Testnet).build();
    let err = engine
        .broadcast(Cryptocurrency::Btc, "00")
        .await
        .unwrap_err();
    assert!(
        matches!(err, OmpError::UnknownCurrency(Cryptocurrency::Btc)),
        "{err}"
    );
}

#[tokio::test]
async fn test_broadcast_failure_surfaces_node_error() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;
    let accept = harness.accept(&bid).await;
    let lock = harness.lock(&bid, &accept).await;
    let funding = harness
        .seller
        .engine
        .complete(SELLER_WALLET, &harness.listing, &bid, &accept, &lock)
        .await
        .unwrap();

    harness
        .seller
        .node
        .set_fail_mode(Some(MockNodeFailure::Broadcast))
        .await;
    let err = harness
        .seller
        .engine
        .broadcast(Cryptocurrency::Part, &funding)
        .await
        .unwrap_err();
    assert!(matches!(err, OmpError::Other(_)), "{err}");

    harness.seller.node.set_fail_mode(None).await;
    harness
        .seller
        .engine
        .broadcast(Cryptocurrency::Part, &funding)
        .await
        .unwrap();
    // Resubmitting a mined transaction is refused.
    assert!(harness
        .seller
        .engine
        .broadcast(Cryptocurrency::Part, &funding)
        .await
        .is_err());
}

#[tokio::test]
async fn test_custom_policy_changes_lock_window() {
    let harness = TwoPartyHarness::new().await;
    let policy = EscrowPolicy {
        destroy_lock_secs: 600,
        ..EscrowPolicy::for_network(Network::Testnet)
    };
    let seller = OpenMarketProtocol::builder(Network::Testnet)
        .policy(policy)
        .backend(Cryptocurrency::Part, Arc::new(harness.seller.node.clone()))
        .time_provider(Arc::new(harness.chain.time().clone()))
        .build();

    let bid = harness.bid().await;
    let accept = seller
        .accept(SELLER_WALLET, &harness.listing, &bid)
        .await
        .unwrap();
    let unlock = accept.action.accept().unwrap().seller.destroy.unlock_time;
    assert_eq!(u64::from(unlock), harness.chain.median_time() + 600);
}
