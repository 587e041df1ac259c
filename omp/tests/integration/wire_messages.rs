//! Messages as they travel between parties: local fields stripped, partial
//! transactions kept at home.

use omp::marketplace::{strip, COIN};
use omp::{Cryptocurrency, NodeAdapter};

use crate::common::{TwoPartyHarness, BUYER_WALLET, SELLER_WALLET, SETTLEMENT_FEE};

#[tokio::test]
async fn test_trade_over_stripped_messages() {
    let harness = TwoPartyHarness::new().await;

    // Each party only ever sees the other's messages stripped.
    let bid = harness.bid().await;
    let accept = harness.accept(&strip(&bid)).await;
    let lock = harness.lock(&bid, &strip(&accept)).await;
    let funding = harness
        .seller
        .engine
        .complete(SELLER_WALLET, &harness.listing, &strip(&bid), &accept, &strip(&lock))
        .await
        .unwrap();
    harness
        .seller
        .engine
        .broadcast(Cryptocurrency::Part, &funding)
        .await
        .unwrap();

    let release = harness
        .buyer
        .engine
        .release(BUYER_WALLET, &harness.listing, &bid, &strip(&accept))
        .await
        .unwrap();
    let txid = harness
        .buyer
        .engine
        .broadcast(Cryptocurrency::Part, &release)
        .await
        .unwrap();

    assert_eq!(harness.buyer.node.received_from(BUYER_WALLET, &txid).await, 2 * COIN);
    assert_eq!(
        harness.seller.node.received_from(SELLER_WALLET, &txid).await,
        4 * COIN - SETTLEMENT_FEE
    );
}

#[tokio::test]
async fn test_stripping_keeps_message_hash() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;
    let accept = harness.accept(&bid).await;

    let stripped = strip(&accept);
    assert!(stripped.action.accept().unwrap().raw_bid_tx.is_none());
    assert_eq!(
        omp::hash_message(&stripped).unwrap(),
        omp::hash_message(&accept).unwrap()
    );
    // The template the buyer checks against survives stripping.
    assert_eq!(
        stripped.action.accept().unwrap().release_tx_unsigned,
        accept.action.accept().unwrap().release_tx_unsigned
    );
}

#[tokio::test]
async fn test_intermediate_funding_is_incomplete() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;
    let accept = harness.accept(&bid).await;
    let lock = harness.lock(&bid, &accept).await;

    // Seller inputs only.
    let seller_partial = accept.action.accept().unwrap().raw_bid_tx.clone().unwrap();
    let check = harness
        .seller
        .node
        .verify_raw_transaction(&seller_partial, &[])
        .await
        .unwrap();
    assert!(!check.complete);

    // Buyer inputs only.
    let buyer_partial = lock.action.lock().unwrap().raw_bid_tx.clone().unwrap();
    let check = harness
        .buyer
        .node
        .verify_raw_transaction(&buyer_partial, &[])
        .await
        .unwrap();
    assert!(!check.complete);

    let funding = harness
        .seller
        .engine
        .complete(SELLER_WALLET, &harness.listing, &bid, &accept, &lock)
        .await
        .unwrap();
    let check = harness
        .seller
        .node
        .verify_raw_transaction(&funding, &[])
        .await
        .unwrap();
    assert!(check.complete, "{:?}", check.errors);
}

#[tokio::test]
async fn test_bid_skeleton_is_unsigned() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;

    let skeleton = bid.action.bid().unwrap().raw_bid_tx.clone().unwrap();
    let check = harness
        .buyer
        .node
        .verify_raw_transaction(&skeleton, &[])
        .await
        .unwrap();
    assert!(!check.complete);
}

#[tokio::test]
async fn test_kept_destroy_copies() {
    let harness = TwoPartyHarness::new().await;
    let trade = harness.fund_trade().await;

    // The seller's copy carries only the seller's signature.
    let seller_copy = trade
        .accept
        .action
        .accept()
        .unwrap()
        .raw_dest_tx
        .clone()
        .unwrap();
    let check = harness
        .seller
        .node
        .verify_raw_transaction(&seller_copy, &[])
        .await
        .unwrap();
    assert!(!check.complete);

    // The buyer's copy is fully signed and waits for the unlock time.
    let buyer_copy = trade.lock.action.lock().unwrap().raw_dest_tx.clone().unwrap();
    let err = harness
        .buyer
        .engine
        .broadcast(Cryptocurrency::Part, &buyer_copy)
        .await
        .unwrap_err();
    assert!(matches!(err, omp::OmpError::PrematureBroadcast(_)), "{err}");

    let unlock = trade.accept.action.accept().unwrap().seller.destroy.unlock_time;
    harness.chain.time().set(u64::from(unlock));
    harness
        .buyer
        .engine
        .broadcast(Cryptocurrency::Part, &buyer_copy)
        .await
        .unwrap();
    assert_eq!(harness.chain.burned().await, 6 * COIN - SETTLEMENT_FEE);
}
