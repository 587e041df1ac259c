//! The seller cannot deliver and refunds the buyer.

use omp::marketplace::COIN;
use omp::{Cryptocurrency, EscrowType, OmpError};

use crate::common::{TwoPartyHarness, BUYER_WALLET, PRICE, SELLER_WALLET, SETTLEMENT_FEE};

#[tokio::test]
async fn test_refund_returns_everything_locked() {
    let harness = TwoPartyHarness::new().await;
    let trade = harness.fund_trade().await;

    let raw = harness
        .seller
        .engine
        .refund(
            SELLER_WALLET,
            &harness.listing,
            &trade.bid,
            &trade.accept,
            &trade.lock,
        )
        .await
        .unwrap();
    let txid = harness
        .seller
        .engine
        .broadcast(Cryptocurrency::Part, &raw)
        .await
        .unwrap();

    // Buyer gets price plus bond; the seller's bond pays the fee.
    assert_eq!(
        harness.buyer.node.received_from(BUYER_WALLET, &txid).await,
        PRICE + 2 * COIN
    );
    assert_eq!(
        harness.seller.node.received_from(SELLER_WALLET, &txid).await,
        2 * COIN - SETTLEMENT_FEE
    );
}

#[tokio::test]
async fn test_refund_mad_transparent() {
    let harness = TwoPartyHarness::with_escrow(EscrowType::Mad).await;
    let trade = harness.fund_trade().await;

    let raw = harness
        .seller
        .engine
        .refund(
            SELLER_WALLET,
            &harness.listing,
            &trade.bid,
            &trade.accept,
            &trade.lock,
        )
        .await
        .unwrap();
    let txid = harness
        .seller
        .engine
        .broadcast(Cryptocurrency::Part, &raw)
        .await
        .unwrap();
    assert_eq!(harness.buyer.node.received_from(BUYER_WALLET, &txid).await, 4 * COIN);
}

#[tokio::test]
async fn test_release_after_refund_is_rejected() {
    let harness = TwoPartyHarness::new().await;
    let trade = harness.fund_trade().await;

    let refund = harness
        .seller
        .engine
        .refund(
            SELLER_WALLET,
            &harness.listing,
            &trade.bid,
            &trade.accept,
            &trade.lock,
        )
        .await
        .unwrap();
    let release = harness
        .buyer
        .engine
        .release(BUYER_WALLET, &harness.listing, &trade.bid, &trade.accept)
        .await
        .unwrap();

    harness
        .seller
        .engine
        .broadcast(Cryptocurrency::Part, &refund)
        .await
        .unwrap();
    let err = harness
        .buyer
        .engine
        .broadcast(Cryptocurrency::Part, &release)
        .await
        .unwrap_err();
    assert!(matches!(err, OmpError::Other(_)), "{err}");
}

#[tokio::test]
async fn test_buyer_cannot_refund_alone() {
    let harness = TwoPartyHarness::new().await;
    let trade = harness.fund_trade().await;

    // A refund assembled by the buyer only carries the buyer's own share.
    let err = harness
        .buyer
        .engine
        .refund(
            BUYER_WALLET,
            &harness.listing,
            &trade.bid,
            &trade.accept,
            &trade.lock,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OmpError::IncompleteSignature(_)), "{err}");
}
