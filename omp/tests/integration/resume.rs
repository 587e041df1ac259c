//! Parties persist their trades between rounds and pick up after a restart.

use std::path::PathBuf;

use omp::marketplace::COIN;
use omp::{Cryptocurrency, OmpError, Role, Trade, TradeStore};

use crate::common::{engine_for, TwoPartyHarness, BUYER_WALLET, SELLER_WALLET};

fn store_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("omp-resume-{}-{}", tag, std::process::id()))
}

#[tokio::test]
async fn test_trade_survives_restart_between_rounds() {
    let harness = TwoPartyHarness::new().await;
    let buyer_dir = store_dir("buyer");
    let seller_dir = store_dir("seller");
    let _ = tokio::fs::remove_dir_all(&buyer_dir).await;
    let _ = tokio::fs::remove_dir_all(&seller_dir).await;

    // Buyer bids and saves.
    let buyer_store = TradeStore::open(&buyer_dir).await.unwrap();
    let mut buyer_trade =
        Trade::new("mug", Role::Buyer, BUYER_WALLET, harness.listing.clone()).unwrap();
    let bid = harness.bid().await;
    buyer_trade.advance(bid.clone()).unwrap();
    buyer_store.save(&buyer_trade).await.unwrap();

    // Seller records the bid, accepts and saves.
    let seller_store = TradeStore::open(&seller_dir).await.unwrap();
    let mut seller_trade =
        Trade::new("mug", Role::Seller, SELLER_WALLET, harness.listing.clone()).unwrap();
    seller_trade.advance(bid).unwrap();
    let accept = harness
        .seller
        .engine
        .accept(
            &seller_trade.wallet,
            seller_trade.listing(),
            seller_trade.bid().unwrap(),
        )
        .await
        .unwrap();
    seller_trade.advance(accept.clone()).unwrap();
    seller_store.save(&seller_trade).await.unwrap();
    drop(buyer_store);

    // Buyer restarts with a fresh engine and continues from disk.
    let buyer_store = TradeStore::open(&buyer_dir).await.unwrap();
    let mut buyer_trade = buyer_store.get("mug").await.unwrap();
    assert_eq!(buyer_trade.state.name(), "bid placed");
    buyer_trade.advance(accept).unwrap();
    let buyer_engine = engine_for(&harness.chain, &harness.buyer.node);
    let lock = buyer_engine
        .lock(
            &buyer_trade.wallet,
            buyer_trade.listing(),
            buyer_trade.bid().unwrap(),
            buyer_trade.accept().unwrap(),
        )
        .await
        .unwrap();
    buyer_trade.advance(lock.clone()).unwrap();
    buyer_store.save(&buyer_trade).await.unwrap();
    drop(seller_store);

    // Seller restarts and completes.
    let seller_store = TradeStore::open(&seller_dir).await.unwrap();
    let mut seller_trade = seller_store.get("mug").await.unwrap();
    seller_trade.advance(lock).unwrap();
    let seller_engine = engine_for(&harness.chain, &harness.seller.node);
    let funding = seller_engine
        .complete(
            &seller_trade.wallet,
            seller_trade.listing(),
            seller_trade.bid().unwrap(),
            seller_trade.accept().unwrap(),
            seller_trade.lock().unwrap(),
        )
        .await
        .unwrap();
    seller_trade.record_funding(funding.clone()).unwrap();
    seller_store.save(&seller_trade).await.unwrap();
    seller_engine
        .broadcast(Cryptocurrency::Part, &funding)
        .await
        .unwrap();

    // Settle from the reloaded buyer record.
    let buyer_trade = TradeStore::open(&buyer_dir)
        .await
        .unwrap()
        .get("mug")
        .await
        .unwrap();
    let release = buyer_engine
        .release(
            &buyer_trade.wallet,
            buyer_trade.listing(),
            buyer_trade.bid().unwrap(),
            buyer_trade.accept().unwrap(),
        )
        .await
        .unwrap();
    let txid = buyer_engine
        .broadcast(Cryptocurrency::Part, &release)
        .await
        .unwrap();
    assert_eq!(harness.buyer.node.received_from(BUYER_WALLET, &txid).await, 2 * COIN);

    let reloaded = TradeStore::open(&seller_dir)
        .await
        .unwrap()
        .get("mug")
        .await
        .unwrap();
    assert_eq!(reloaded.funding_tx.as_deref(), Some(funding.as_str()));

    let _ = tokio::fs::remove_dir_all(&buyer_dir).await;
    let _ = tokio::fs::remove_dir_all(&seller_dir).await;
}

#[tokio::test]
async fn test_trade_refuses_messages_out_of_order() {
    let harness = TwoPartyHarness::new().await;
    let trade = harness.fund_trade().await;

    let mut record = Trade::new("t", Role::Seller, SELLER_WALLET, harness.listing.clone()).unwrap();
    assert!(matches!(
        record.advance(trade.accept.clone()),
        Err(OmpError::InvalidState(_))
    ));
    record.advance(trade.bid.clone()).unwrap();
    assert!(matches!(
        record.advance(trade.lock.clone()),
        Err(OmpError::InvalidState(_))
    ));
    record.advance(trade.accept).unwrap();
    record.advance(trade.lock).unwrap();
    assert_eq!(record.state.name(), "locked");
}

#[tokio::test]
async fn test_trade_refuses_unrelated_accept() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;
    let accept = harness.accept(&bid).await;

    // A second bid on the same listing yields a different bid hash.
    let other_bid = {
        let mut b = bid.clone();
        if let omp::MarketAction::Bid(action) = &mut b.action {
            action.generated += 1;
        }
        b
    };
    let mut record = Trade::new("t", Role::Buyer, BUYER_WALLET, harness.listing.clone()).unwrap();
    record.advance(other_bid).unwrap();
    assert!(matches!(
        record.advance(accept),
        Err(OmpError::ProtocolViolation(_))
    ));
}
