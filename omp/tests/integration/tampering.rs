//! A counterparty that alters what it sends is caught before anything is
//! signed on its behalf.

use omp::{MarketAction, MarketplaceMessage, OmpError};

use crate::common::{TwoPartyHarness, BUYER_WALLET, SELLER_WALLET};

fn edit_accept(msg: &MarketplaceMessage, f: impl FnOnce(&mut omp::AcceptAction)) -> MarketplaceMessage {
    let mut msg = msg.clone();
    match &mut msg.action {
        MarketAction::Accept(a) => f(a),
        other => panic!("expected accept, got {}", other.kind()),
    }
    msg
}

fn edit_lock(msg: &MarketplaceMessage, f: impl FnOnce(&mut omp::LockAction)) -> MarketplaceMessage {
    let mut msg = msg.clone();
    match &mut msg.action {
        MarketAction::Lock(l) => f(l),
        other => panic!("expected lock, got {}", other.kind()),
    }
    msg
}

fn edit_bid(msg: &MarketplaceMessage, f: impl FnOnce(&mut omp::BidAction)) -> MarketplaceMessage {
    let mut msg = msg.clone();
    match &mut msg.action {
        MarketAction::Bid(b) => f(b),
        other => panic!("expected bid, got {}", other.kind()),
    }
    msg
}

/// Same-length hex with the last digit changed.
fn flip_last_digit(hex: &str) -> String {
    let (head, last) = hex.split_at(hex.len() - 1);
    let flipped = if last == "0" { "1" } else { "0" };
    format!("{head}{flipped}")
}

async fn lock_with(harness: &TwoPartyHarness, bid: &MarketplaceMessage, accept: &MarketplaceMessage) -> OmpError {
    harness
        .buyer
        .engine
        .lock(BUYER_WALLET, &harness.listing, bid, accept)
        .await
        .unwrap_err()
}

#[tokio::test]
async fn test_lock_rejects_altered_release_template() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;
    let accept = harness.accept(&bid).await;

    let tampered = edit_accept(&accept, |a| {
        a.release_tx_unsigned = flip_last_digit(&a.release_tx_unsigned);
    });
    let err = lock_with(&harness, &bid, &tampered).await;
    assert!(matches!(err, OmpError::ProtocolViolation(_)), "{err}");
}

#[tokio::test]
async fn test_lock_rejects_excessive_seller_fee() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;
    let accept = harness.accept(&bid).await;

    let tampered = edit_accept(&accept, |a| a.seller.fee = 50_000_000);
    let err = lock_with(&harness, &bid, &tampered).await;
    assert!(matches!(err, OmpError::ProtocolViolation(_)), "{err}");
}

#[tokio::test]
async fn test_lock_rejects_shortened_destroy_lock() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;
    let accept = harness.accept(&bid).await;

    let tampered = edit_accept(&accept, |a| a.seller.destroy.unlock_time -= 2000);
    let err = lock_with(&harness, &bid, &tampered).await;
    assert!(matches!(err, OmpError::ProtocolViolation(_)), "{err}");
}

#[tokio::test]
async fn test_lock_rejects_share_from_wrong_key() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;
    let accept = harness.accept(&bid).await;
    let buyer_key = bid.action.bid().unwrap().buyer.payment.pub_key.clone();

    let tampered = edit_accept(&accept, |a| {
        a.seller.destroy.signatures[0].pub_key = buyer_key;
    });
    let err = lock_with(&harness, &bid, &tampered).await;
    assert!(matches!(err, OmpError::ProtocolViolation(_)), "{err}");
}

#[tokio::test]
async fn test_lock_rejects_forged_release_signature() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;
    let accept = harness.accept(&bid).await;

    let tampered = edit_accept(&accept, |a| {
        a.seller.release.signatures[0].signature = "00".repeat(64);
    });
    let err = lock_with(&harness, &bid, &tampered).await;
    assert!(matches!(err, OmpError::ProtocolViolation(_)), "{err}");
}

#[tokio::test]
async fn test_lock_rejects_accept_for_another_bid() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;
    let accept = harness.accept(&bid).await;

    let tampered = edit_accept(&accept, |a| a.bid = "ab".repeat(32));
    let err = lock_with(&harness, &bid, &tampered).await;
    assert!(matches!(err, OmpError::ProtocolViolation(_)), "{err}");
}

#[tokio::test]
async fn test_lock_rejects_redirected_seller_change() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;
    let accept = harness.accept(&bid).await;

    // Keeping more change than the inputs allow would underfund the escrow.
    let tampered = edit_accept(&accept, |a| {
        if let Some(change) = a.seller.change_output.as_mut() {
            change.amount += 1_000;
        }
    });
    let err = lock_with(&harness, &bid, &tampered).await;
    assert!(matches!(err, OmpError::ProtocolViolation(_)), "{err}");
}

#[tokio::test]
async fn test_complete_rejects_buyer_share_for_seller_input() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;
    let accept = harness.accept(&bid).await;
    let lock = harness.lock(&bid, &accept).await;

    let tampered = edit_lock(&lock, |l| l.buyer.signatures[0].input = 1);
    let err = harness
        .seller
        .engine
        .complete(SELLER_WALLET, &harness.listing, &bid, &accept, &tampered)
        .await
        .unwrap_err();
    assert!(matches!(err, OmpError::ProtocolViolation(_)), "{err}");
}

#[tokio::test]
async fn test_complete_rejects_forged_refund_signature() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;
    let accept = harness.accept(&bid).await;
    let lock = harness.lock(&bid, &accept).await;

    let tampered = edit_lock(&lock, |l| {
        l.buyer.refund.signatures[0].signature = "11".repeat(64);
    });
    let err = harness
        .seller
        .engine
        .complete(SELLER_WALLET, &harness.listing, &bid, &accept, &tampered)
        .await
        .unwrap_err();
    assert!(matches!(err, OmpError::ProtocolViolation(_)), "{err}");
}

#[tokio::test]
async fn test_complete_rejects_changed_release_echo() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;
    let accept = harness.accept(&bid).await;
    let lock = harness.lock(&bid, &accept).await;

    let tampered = edit_lock(&lock, |l| {
        l.release_tx_unsigned = flip_last_digit(&l.release_tx_unsigned);
    });
    let err = harness
        .seller
        .engine
        .complete(SELLER_WALLET, &harness.listing, &bid, &accept, &tampered)
        .await
        .unwrap_err();
    assert!(matches!(err, OmpError::ProtocolViolation(_)), "{err}");
}

#[tokio::test]
async fn test_accept_rejects_wrong_shipping_price() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;

    let tampered = edit_bid(&bid, |b| b.buyer.payment.shipping_price = 1);
    let err = harness
        .seller
        .engine
        .accept(SELLER_WALLET, &harness.listing, &tampered)
        .await
        .unwrap_err();
    assert!(matches!(err, OmpError::InvalidBid(_)), "{err}");
    // Nothing was reserved for a bid that was turned down.
    assert!(harness
        .seller
        .node
        .locked_outpoints(SELLER_WALLET)
        .await
        .is_empty());
}

#[tokio::test]
async fn test_accept_rejects_duplicated_buyer_input() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;

    let tampered = edit_bid(&bid, |b| {
        let first = b.buyer.payment.inputs[0].clone();
        b.buyer.payment.inputs.push(first);
    });
    let err = harness
        .seller
        .engine
        .accept(SELLER_WALLET, &harness.listing, &tampered)
        .await
        .unwrap_err();
    assert!(matches!(err, OmpError::InvalidBid(_)), "{err}");
}

#[tokio::test]
async fn test_accept_rejects_bid_for_another_listing() {
    let harness = TwoPartyHarness::new().await;
    let bid = harness.bid().await;

    let tampered = edit_bid(&bid, |b| b.item = "cd".repeat(32));
    let err = harness
        .seller
        .engine
        .accept(SELLER_WALLET, &harness.listing, &tampered)
        .await
        .unwrap_err();
    assert!(matches!(err, OmpError::InvalidBid(_)), "{err}");
}
