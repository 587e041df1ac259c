//! Two-party trade simulator on an in-memory chain.
//!
//! Runs listing, bid, accept, lock and funding between a simulated buyer and
//! seller, then settles the escrow the way the scenario asks.
//! Logging goes to stderr; stdout carries one JSON event per line.
//!
//! Usage:
//!   omp-sim --scenario release|refund|destroy

use std::io::Write;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use omp::marketplace::{ShippingAddress, COIN};
use omp::mocks::{MockChain, MockNode, MockTime};
use omp::{
    BidConfiguration, Cryptocurrency, EscrowType, ListingAddAction, MarketplaceMessage, Network,
    OmpError, OpenMarketProtocol, OutputType,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const BUYER_WALLET: &str = "buyer";
const SELLER_WALLET: &str = "seller";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scenario {
    Release,
    Refund,
    Destroy,
}

impl Scenario {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "release" => Ok(Self::Release),
            "refund" => Ok(Self::Refund),
            "destroy" => Ok(Self::Destroy),
            other => bail!("unknown scenario '{other}' (release, refund or destroy)"),
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Refund => "refund",
            Self::Destroy => "destroy",
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum SimEvent<'a> {
    Message { action: &'a str, hash: &'a str },
    Broadcast { tx: &'a str, txid: &'a str },
    Premature { tx: &'a str, reason: String },
    Settled {
        scenario: &'a str,
        buyer_received: u64,
        seller_received: u64,
        burned: u64,
        fees: u64,
    },
}

fn parse_scenario() -> Result<Scenario> {
    let args: Vec<String> = std::env::args().collect();
    let value = args
        .iter()
        .position(|a| a == "--scenario")
        .and_then(|i| args.get(i + 1))
        .context("usage: omp-sim --scenario release|refund|destroy")?;
    Scenario::parse(value)
}

fn init_logging_stderr() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();
}

fn emit(event: &SimEvent<'_>) -> Result<()> {
    let line = serde_json::to_string(event)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}

fn emit_message(msg: &MarketplaceMessage) -> Result<()> {
    let hash = omp::hash_message(msg)?;
    emit(&SimEvent::Message {
        action: msg.action.kind(),
        hash: &hash,
    })
}

fn engine(chain: &MockChain, node: &MockNode) -> OpenMarketProtocol {
    OpenMarketProtocol::builder(Network::Testnet)
        .backend(Cryptocurrency::Part, Arc::new(node.clone()))
        .time_provider(Arc::new(chain.time().clone()))
        .build()
}

async fn broadcast(protocol: &OpenMarketProtocol, tx: &str, raw: &str) -> Result<String> {
    let txid = protocol.broadcast(Cryptocurrency::Part, raw).await?;
    emit(&SimEvent::Broadcast { tx, txid: &txid })?;
    Ok(txid)
}

#[tokio::main]
async fn main() -> Result<()> {
    let scenario = parse_scenario()?;
    init_logging_stderr();
    info!("omp-sim starting ({})", scenario.name());

    let chain = MockChain::new(MockTime::default());
    let buyer_node = chain.create_party_view("buyer", 1);
    let seller_node = chain.create_party_view("seller", 2);
    buyer_node
        .fund(BUYER_WALLET, OutputType::Blind, 5 * COIN)
        .await?;
    seller_node
        .fund(SELLER_WALLET, OutputType::Blind, 3 * COIN)
        .await?;
    let buyer = engine(&chain, &buyer_node);
    let seller = engine(&chain, &seller_node);

    let listing = ListingAddAction::builder_with_time(chain.time().clone())
        .title("Hand-thrown stoneware mug")
        .category(["Home", "Kitchen"])
        .location("AU")
        .seller(seller_node.name(), "unsigned")
        .escrow(EscrowType::MadCt, 100.0, 100.0)
        .price(Cryptocurrency::Part, 2 * COIN, None)
        .build()
        .map_err(|e| anyhow!(e))?;
    emit_message(&listing)?;

    let config = BidConfiguration {
        cryptocurrency: Cryptocurrency::Part,
        escrow: EscrowType::MadCt,
        shipping_address: ShippingAddress {
            first_name: "Sam".into(),
            last_name: "Buyer".into(),
            address_line1: "1 Test Street".into(),
            address_line2: None,
            city: "Melbourne".into(),
            state: "VIC".into(),
            zip_code: "3000".into(),
            country: "AU".into(),
        },
    };
    let bid = buyer.bid(BUYER_WALLET, &config, &listing).await?;
    emit_message(&bid)?;
    let accept = seller.accept(SELLER_WALLET, &listing, &bid).await?;
    emit_message(&accept)?;
    let lock = buyer.lock(BUYER_WALLET, &listing, &bid, &accept).await?;
    emit_message(&lock)?;
    let funding = seller
        .complete(SELLER_WALLET, &listing, &bid, &accept, &lock)
        .await?;
    broadcast(&seller, "funding", &funding).await?;

    let settlement_txid = match scenario {
        Scenario::Release => {
            let raw = buyer.release(BUYER_WALLET, &listing, &bid, &accept).await?;
            broadcast(&buyer, "release", &raw).await?
        }
        Scenario::Refund => {
            let raw = seller
                .refund(SELLER_WALLET, &listing, &bid, &accept, &lock)
                .await?;
            broadcast(&seller, "refund", &raw).await?
        }
        Scenario::Destroy => {
            let raw = buyer
                .destroy(BUYER_WALLET, &listing, &bid, &accept, &lock)
                .await?;
            match buyer.broadcast(Cryptocurrency::Part, &raw).await {
                Err(OmpError::PrematureBroadcast(reason)) => {
                    warn!("Destroy not final yet: {}", reason);
                    emit(&SimEvent::Premature {
                        tx: "destroy",
                        reason,
                    })?;
                }
                Err(e) => return Err(e.into()),
                Ok(txid) => bail!("destroy {txid} was accepted before its lock time"),
            }
            chain.advance_time(seller.policy().destroy_lock_secs + 120);
            broadcast(&buyer, "destroy", &raw).await?
        }
    };

    emit(&SimEvent::Settled {
        scenario: scenario.name(),
        buyer_received: buyer_node
            .received_from(BUYER_WALLET, &settlement_txid)
            .await,
        seller_received: seller_node
            .received_from(SELLER_WALLET, &settlement_txid)
            .await,
        burned: chain.burned().await,
        fees: chain.fees().await,
    })?;
    Ok(())
}
