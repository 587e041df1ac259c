//! Two-party test harness for integration testing.
//!
//! A buyer and a seller share one simulated chain. Each party has its own
//! node (wallets and keys) and its own protocol engine, so messages only
//! travel between them the way they would on the wire.

use std::sync::Arc;

use omp::marketplace::{ShippingAddress, COIN};
use omp::mocks::{MockChain, MockNode, MockTime};
use omp::{
    BidConfiguration, Cryptocurrency, EscrowType, ListingAddAction, MarketplaceMessage, Network,
    OpenMarketProtocol, OutputType,
};

pub const BUYER_WALLET: &str = "buyer-wallet";
pub const SELLER_WALLET: &str = "seller-wallet";

/// Price of the default listing.
pub const PRICE: u64 = 2 * COIN;
/// Settlement fee at the default fee rate (1000 bytes at 5 per byte).
pub const SETTLEMENT_FEE: u64 = 5_000;

/// One side of the trade.
pub struct PartyContext {
    pub node: MockNode,
    pub engine: OpenMarketProtocol,
    pub wallet: &'static str,
}

/// Messages of a trade that made it to a broadcast funding transaction.
#[allow(dead_code)]
pub struct FundedTrade {
    pub bid: MarketplaceMessage,
    pub accept: MarketplaceMessage,
    pub lock: MarketplaceMessage,
    pub funding_txid: String,
}

pub struct TwoPartyHarness {
    pub chain: MockChain,
    pub buyer: PartyContext,
    pub seller: PartyContext,
    pub listing: MarketplaceMessage,
}

#[allow(dead_code)]
impl TwoPartyHarness {
    /// `MAD_CT` listing for 2 PART with 100% bonds on both sides. The buyer
    /// holds 5 PART and the seller 3 PART, in blinded outputs.
    pub async fn new() -> Self {
        Self::with_escrow(EscrowType::MadCt).await
    }

    pub async fn with_escrow(escrow: EscrowType) -> Self {
        let funding_type = match escrow {
            EscrowType::MadCt => OutputType::Blind,
            _ => OutputType::Part,
        };
        let harness = Self::unfunded(escrow);
        harness
            .buyer
            .node
            .fund(BUYER_WALLET, funding_type, 5 * COIN)
            .await
            .expect("fund buyer");
        harness
            .seller
            .node
            .fund(SELLER_WALLET, funding_type, 3 * COIN)
            .await
            .expect("fund seller");
        harness
    }

    /// Same listing, but neither wallet holds anything yet.
    pub fn unfunded(escrow: EscrowType) -> Self {
        let chain = MockChain::new(MockTime::new(1_704_067_200));
        let buyer_node = chain.create_party_view("buyer", 1);
        let seller_node = chain.create_party_view("seller", 2);
        let listing = listing(&chain, escrow, PRICE);
        Self {
            buyer: PartyContext {
                engine: engine_for(&chain, &buyer_node),
                node: buyer_node,
                wallet: BUYER_WALLET,
            },
            seller: PartyContext {
                engine: engine_for(&chain, &seller_node),
                node: seller_node,
                wallet: SELLER_WALLET,
            },
            chain,
            listing,
        }
    }

    pub fn bid_config(&self) -> BidConfiguration {
        let escrow = self
            .listing
            .action
            .listing()
            .expect("listing")
            .escrow()
            .escrow_type;
        BidConfiguration {
            cryptocurrency: Cryptocurrency::Part,
            escrow,
            shipping_address: shipping_address(),
        }
    }

    pub async fn bid(&self) -> MarketplaceMessage {
        self.buyer
            .engine
            .bid(BUYER_WALLET, &self.bid_config(), &self.listing)
            .await
            .expect("bid")
    }

    pub async fn accept(&self, bid: &MarketplaceMessage) -> MarketplaceMessage {
        self.seller
            .engine
            .accept(SELLER_WALLET, &self.listing, bid)
            .await
            .expect("accept")
    }

    pub async fn lock(
        &self,
        bid: &MarketplaceMessage,
        accept: &MarketplaceMessage,
    ) -> MarketplaceMessage {
        self.buyer
            .engine
            .lock(BUYER_WALLET, &self.listing, bid, accept)
            .await
            .expect("lock")
    }

    /// Run bid, accept, lock and complete, then broadcast the funding.
    pub async fn fund_trade(&self) -> FundedTrade {
        let bid = self.bid().await;
        let accept = self.accept(&bid).await;
        let lock = self.lock(&bid, &accept).await;
        let funding = self
            .seller
            .engine
            .complete(SELLER_WALLET, &self.listing, &bid, &accept, &lock)
            .await
            .expect("complete");
        let funding_txid = self
            .seller
            .engine
            .broadcast(Cryptocurrency::Part, &funding)
            .await
            .expect("broadcast funding");
        FundedTrade {
            bid,
            accept,
            lock,
            funding_txid,
        }
    }
}

/// Engine for `node` on the harness chain's clock.
pub fn engine_for(chain: &MockChain, node: &MockNode) -> OpenMarketProtocol {
    OpenMarketProtocol::builder(Network::Testnet)
        .backend(Cryptocurrency::Part, Arc::new(node.clone()))
        .time_provider(Arc::new(chain.time().clone()))
        .build()
}

pub fn listing(chain: &MockChain, escrow: EscrowType, price: u64) -> MarketplaceMessage {
    ListingAddAction::builder_with_time(chain.time().clone())
        .title("Hand-thrown stoneware mug")
        .descriptions("A mug", "A large mug, glazed blue.")
        .category(["Home", "Kitchen"])
        .location("AU")
        .seller("seller-address", "seller-signature")
        .escrow(escrow, 100.0, 100.0)
        .price(Cryptocurrency::Part, price, None)
        .build()
        .expect("listing")
}

pub fn shipping_address() -> ShippingAddress {
    ShippingAddress {
        first_name: "Sam".into(),
        last_name: "Buyer".into(),
        address_line1: "1 Test Street".into(),
        address_line2: None,
        city: "Melbourne".into(),
        state: "VIC".into(),
        zip_code: "3000".into(),
        country: "AU".into(),
    }
}
