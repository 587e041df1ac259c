//! Happy path: the buyer receives the item and releases the escrow.

use omp::marketplace::COIN;
use omp::transaction::Script;
use omp::{Cryptocurrency, EscrowType};

use crate::common::{TwoPartyHarness, BUYER_WALLET, PRICE, SELLER_WALLET, SETTLEMENT_FEE};

fn funding_fee(accept: &omp::MarketplaceMessage) -> u64 {
    accept.action.accept().unwrap().seller.funding_fee
}

#[tokio::test]
async fn test_release_mad_ct() {
    let harness = TwoPartyHarness::new().await;
    let trade = harness.fund_trade().await;
    assert!(harness.chain.contains_tx(&trade.funding_txid).await);

    let raw = harness
        .buyer
        .engine
        .release(BUYER_WALLET, &harness.listing, &trade.bid, &trade.accept)
        .await
        .unwrap();
    let txid = harness
        .buyer
        .engine
        .broadcast(Cryptocurrency::Part, &raw)
        .await
        .unwrap();

    // Buyer gets the bond back; seller gets price plus bond, minus the fee.
    assert_eq!(harness.buyer.node.received_from(BUYER_WALLET, &txid).await, 2 * COIN);
    assert_eq!(
        harness.seller.node.received_from(SELLER_WALLET, &txid).await,
        PRICE + 2 * COIN - SETTLEMENT_FEE
    );
    assert_eq!(harness.chain.burned().await, 0);
    assert_eq!(
        harness.chain.fees().await,
        funding_fee(&trade.accept) + SETTLEMENT_FEE
    );
}

#[tokio::test]
async fn test_release_mad_transparent() {
    let harness = TwoPartyHarness::with_escrow(EscrowType::Mad).await;
    let trade = harness.fund_trade().await;

    let raw = harness
        .buyer
        .engine
        .release(BUYER_WALLET, &harness.listing, &trade.bid, &trade.accept)
        .await
        .unwrap();
    let txid = harness
        .buyer
        .engine
        .broadcast(Cryptocurrency::Part, &raw)
        .await
        .unwrap();

    assert_eq!(harness.buyer.node.received_from(BUYER_WALLET, &txid).await, 2 * COIN);
    assert_eq!(
        harness.seller.node.received_from(SELLER_WALLET, &txid).await,
        4 * COIN - SETTLEMENT_FEE
    );
    let outputs = harness.chain.outputs_of(&txid).await;
    assert!(outputs
        .iter()
        .all(|o| o.output_type == omp::OutputType::Part));
}

#[tokio::test]
async fn test_final_balances_after_release() {
    let harness = TwoPartyHarness::new().await;
    let trade = harness.fund_trade().await;
    let ff = funding_fee(&trade.accept);

    // Funding leaves each side only its change.
    assert_eq!(harness.buyer.node.balance(BUYER_WALLET).await, COIN);
    assert_eq!(harness.seller.node.balance(SELLER_WALLET).await, COIN - ff);

    let raw = harness
        .buyer
        .engine
        .release(BUYER_WALLET, &harness.listing, &trade.bid, &trade.accept)
        .await
        .unwrap();
    harness
        .buyer
        .engine
        .broadcast(Cryptocurrency::Part, &raw)
        .await
        .unwrap();

    assert_eq!(harness.buyer.node.balance(BUYER_WALLET).await, 3 * COIN);
    assert_eq!(
        harness.seller.node.balance(SELLER_WALLET).await,
        5 * COIN - ff - SETTLEMENT_FEE
    );
}

#[tokio::test]
async fn test_reservations_cleared_once_funding_confirms() {
    let harness = TwoPartyHarness::new().await;

    let bid = harness.bid().await;
    assert_eq!(harness.buyer.node.locked_outpoints(BUYER_WALLET).await.len(), 1);
    let accept = harness.accept(&bid).await;
    assert_eq!(harness.seller.node.locked_outpoints(SELLER_WALLET).await.len(), 1);

    let lock = harness.lock(&bid, &accept).await;
    let funding = harness
        .seller
        .engine
        .complete(SELLER_WALLET, &harness.listing, &bid, &accept, &lock)
        .await
        .unwrap();
    harness
        .seller
        .engine
        .broadcast(Cryptocurrency::Part, &funding)
        .await
        .unwrap();

    assert!(harness.buyer.node.locked_outpoints(BUYER_WALLET).await.is_empty());
    assert!(harness.seller.node.locked_outpoints(SELLER_WALLET).await.is_empty());
}

#[tokio::test]
async fn test_escrow_output_is_buyer_then_seller_multisig() {
    let harness = TwoPartyHarness::new().await;
    let trade = harness.fund_trade().await;

    let buyer_key = &trade.bid.action.bid().unwrap().buyer.payment.pub_key;
    let seller_key = &trade.accept.action.accept().unwrap().seller.pub_key;
    let escrow = harness
        .chain
        .outputs_of(&trade.funding_txid)
        .await
        .into_iter()
        .find(|o| matches!(o.script, Script::Multisig { .. }))
        .expect("escrow output");

    assert_eq!(escrow.amount, 6 * COIN);
    assert_eq!(escrow.script, Script::escrow(buyer_key, seller_key));
}

#[tokio::test]
async fn test_seller_cannot_release_alone() {
    let harness = TwoPartyHarness::new().await;
    let trade = harness.fund_trade().await;

    // The seller holds no buyer release share: its own share leaves the
    // 2-of-2 incomplete.
    let err = harness
        .seller
        .engine
        .release(SELLER_WALLET, &harness.listing, &trade.bid, &trade.accept)
        .await
        .unwrap_err();
    assert!(
        matches!(err, omp::OmpError::IncompleteSignature(_)),
        "{err}"
    );
}
