//! Neither side cooperates: the escrow is burned once the time lock expires.

use omp::marketplace::COIN;
use omp::{Cryptocurrency, OmpError};

use crate::common::{TwoPartyHarness, BUYER_WALLET, SELLER_WALLET, SETTLEMENT_FEE};

#[tokio::test]
async fn test_destroy_waits_for_lock_time() {
    let harness = TwoPartyHarness::new().await;
    let trade = harness.fund_trade().await;

    let raw = harness
        .buyer
        .engine
        .destroy(
            BUYER_WALLET,
            &harness.listing,
            &trade.bid,
            &trade.accept,
            &trade.lock,
        )
        .await
        .unwrap();

    let err = harness
        .buyer
        .engine
        .broadcast(Cryptocurrency::Part, &raw)
        .await
        .unwrap_err();
    assert!(matches!(err, OmpError::PrematureBroadcast(_)), "{err}");
    assert!(err.is_retryable());

    // Testnet lock window is 2880 seconds.
    harness.chain.advance_time(3000);
    let txid = harness
        .buyer
        .engine
        .broadcast(Cryptocurrency::Part, &raw)
        .await
        .unwrap();

    assert_eq!(harness.chain.burned().await, 6 * COIN - SETTLEMENT_FEE);
    assert_eq!(harness.buyer.node.received_from(BUYER_WALLET, &txid).await, 0);
    assert_eq!(harness.seller.node.received_from(SELLER_WALLET, &txid).await, 0);
}

#[tokio::test]
async fn test_destroy_becomes_final_at_unlock_time() {
    let harness = TwoPartyHarness::new().await;
    let trade = harness.fund_trade().await;
    let unlock = trade.accept.action.accept().unwrap().seller.destroy.unlock_time;

    let raw = harness
        .seller
        .engine
        .destroy(
            SELLER_WALLET,
            &harness.listing,
            &trade.bid,
            &trade.accept,
            &trade.lock,
        )
        .await
        .unwrap();

    harness.chain.time().set(u64::from(unlock) - 1);
    assert!(matches!(
        harness
            .seller
            .engine
            .broadcast(Cryptocurrency::Part, &raw)
            .await,
        Err(OmpError::PrematureBroadcast(_))
    ));

    // Median time equal to the unlock time is enough.
    harness.chain.time().set(u64::from(unlock));
    harness
        .seller
        .engine
        .broadcast(Cryptocurrency::Part, &raw)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_both_parties_build_the_same_destroy() {
    let harness = TwoPartyHarness::new().await;
    let trade = harness.fund_trade().await;

    let from_buyer = harness
        .buyer
        .engine
        .destroy(
            BUYER_WALLET,
            &harness.listing,
            &trade.bid,
            &trade.accept,
            &trade.lock,
        )
        .await
        .unwrap();
    let from_seller = harness
        .seller
        .engine
        .destroy(
            SELLER_WALLET,
            &harness.listing,
            &trade.bid,
            &trade.accept,
            &trade.lock,
        )
        .await
        .unwrap();
    assert_eq!(from_buyer, from_seller);
}

#[tokio::test]
async fn test_release_wins_over_pending_destroy() {
    let harness = TwoPartyHarness::new().await;
    let trade = harness.fund_trade().await;

    let destroy = harness
        .buyer
        .engine
        .destroy(
            BUYER_WALLET,
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
        .buyer
        .engine
        .broadcast(Cryptocurrency::Part, &release)
        .await
        .unwrap();

    harness.chain.advance_time(3000);
    let err = harness
        .buyer
        .engine
        .broadcast(Cryptocurrency::Part, &destroy)
        .await
        .unwrap_err();
    assert!(matches!(err, OmpError::Other(_)), "{err}");
    assert_eq!(harness.chain.burned().await, 0);
}
