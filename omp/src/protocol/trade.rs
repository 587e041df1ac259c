//! Message history of one trade as a state machine.

use serde::{Deserialize, Serialize};

use crate::error::{OmpError, OmpResult};
use crate::marketplace::{hash_message, MarketAction, MarketplaceMessage, Role};

/// Messages exchanged so far. Each state carries everything the next round
/// needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum TradeState {
    Listed {
        listing: MarketplaceMessage,
    },
    BidPlaced {
        listing: MarketplaceMessage,
        bid: MarketplaceMessage,
    },
    Accepted {
        listing: MarketplaceMessage,
        bid: MarketplaceMessage,
        accept: MarketplaceMessage,
    },
    Locked {
        listing: MarketplaceMessage,
        bid: MarketplaceMessage,
        accept: MarketplaceMessage,
        lock: MarketplaceMessage,
    },
}

impl TradeState {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Listed { .. } => "listed",
            Self::BidPlaced { .. } => "bid placed",
            Self::Accepted { .. } => "accepted",
            Self::Locked { .. } => "locked",
        }
    }
}

/// One party's record of a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub role: Role,
    /// Wallet funding this party's side.
    pub wallet: String,
    pub state: TradeState,
    /// Fully signed funding transaction, once `complete` has produced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_tx: Option<String>,
}

impl Trade {
    pub fn new(
        id: impl Into<String>,
        role: Role,
        wallet: impl Into<String>,
        listing: MarketplaceMessage,
    ) -> OmpResult<Self> {
        if listing.action.listing().is_none() {
            return Err(OmpError::InvalidState(format!(
                "a trade starts from a listing, not {}",
                listing.action.kind()
            )));
        }
        Ok(Self {
            id: id.into(),
            role,
            wallet: wallet.into(),
            state: TradeState::Listed { listing },
            funding_tx: None,
        })
    }

    /// Append the next message.
    ///
    /// Only the message valid for the current state is taken, and it must
    /// reference the message it answers.
    pub fn advance(&mut self, msg: MarketplaceMessage) -> OmpResult<()> {
        let next = match (&self.state, &msg.action) {
            (TradeState::Listed { listing }, MarketAction::Bid(bid)) => {
                expect_link("bid", &bid.item, listing)?;
                TradeState::BidPlaced {
                    listing: listing.clone(),
                    bid: msg,
                }
            }
            (TradeState::BidPlaced { listing, bid }, MarketAction::Accept(accept)) => {
                expect_link("accept", &accept.bid, bid)?;
                TradeState::Accepted {
                    listing: listing.clone(),
                    bid: bid.clone(),
                    accept: msg,
                }
            }
            (
                TradeState::Accepted {
                    listing,
                    bid,
                    accept,
                },
                MarketAction::Lock(lock),
            ) => {
                expect_link("lock", &lock.bid, bid)?;
                TradeState::Locked {
                    listing: listing.clone(),
                    bid: bid.clone(),
                    accept: accept.clone(),
                    lock: msg,
                }
            }
            (state, action) => {
                return Err(OmpError::InvalidState(format!(
                    "{} cannot follow a trade in state '{}'",
                    action.kind(),
                    state.name()
                )))
            }
        };
        self.state = next;
        Ok(())
    }

    pub fn record_funding(&mut self, funding_hex: impl Into<String>) -> OmpResult<()> {
        if !matches!(self.state, TradeState::Locked { .. }) {
            return Err(OmpError::InvalidState(format!(
                "funding recorded in state '{}'",
                self.state.name()
            )));
        }
        self.funding_tx = Some(funding_hex.into());
        Ok(())
    }

    pub const fn listing(&self) -> &MarketplaceMessage {
        match &self.state {
            TradeState::Listed { listing }
            | TradeState::BidPlaced { listing, .. }
            | TradeState::Accepted { listing, .. }
            | TradeState::Locked { listing, .. } => listing,
        }
    }

    pub const fn bid(&self) -> Option<&MarketplaceMessage> {
        match &self.state {
            TradeState::Listed { .. } => None,
            TradeState::BidPlaced { bid, .. }
            | TradeState::Accepted { bid, .. }
            | TradeState::Locked { bid, .. } => Some(bid),
        }
    }

    pub const fn accept(&self) -> Option<&MarketplaceMessage> {
        match &self.state {
            TradeState::Accepted { accept, .. } | TradeState::Locked { accept, .. } => {
                Some(accept)
            }
            _ => None,
        }
    }

    pub const fn lock(&self) -> Option<&MarketplaceMessage> {
        match &self.state {
            TradeState::Locked { lock, .. } => Some(lock),
            _ => None,
        }
    }
}

fn expect_link(what: &str, reference: &str, target: &MarketplaceMessage) -> OmpResult<()> {
    let hash = hash_message(target)?;
    if reference == hash {
        Ok(())
    } else {
        Err(OmpError::ProtocolViolation(format!(
            "{what} references {reference}, expected {hash}"
        )))
    }
}
