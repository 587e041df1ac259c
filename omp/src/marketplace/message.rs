use serde::{Deserialize, Serialize};

use super::accept::AcceptAction;
use super::bid::BidAction;
use super::listing::ListingAddAction;
use super::lock::LockAction;
use crate::config::{MAX_TRADE_RECORD_SIZE, PROTOCOL_VERSION};
use crate::error::OmpResult;
use crate::util::{cbor_from_limited_reader, cbor_to_vec};

/// Envelope of every protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceMessage {
    pub version: String,
    pub action: MarketAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MarketAction {
    #[serde(rename = "MPA_LISTING_ADD")]
    ListingAdd(ListingAddAction),
    #[serde(rename = "MPA_BID")]
    Bid(BidAction),
    #[serde(rename = "MPA_ACCEPT")]
    Accept(AcceptAction),
    #[serde(rename = "MPA_LOCK")]
    Lock(LockAction),
}

impl MarketAction {
    /// Wire name of the action type.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ListingAdd(_) => "MPA_LISTING_ADD",
            Self::Bid(_) => "MPA_BID",
            Self::Accept(_) => "MPA_ACCEPT",
            Self::Lock(_) => "MPA_LOCK",
        }
    }

    pub const fn listing(&self) -> Option<&ListingAddAction> {
        match self {
            Self::ListingAdd(a) => Some(a),
            _ => None,
        }
    }

    pub const fn bid(&self) -> Option<&BidAction> {
        match self {
            Self::Bid(a) => Some(a),
            _ => None,
        }
    }

    pub const fn accept(&self) -> Option<&AcceptAction> {
        match self {
            Self::Accept(a) => Some(a),
            _ => None,
        }
    }

    pub const fn lock(&self) -> Option<&LockAction> {
        match self {
            Self::Lock(a) => Some(a),
            _ => None,
        }
    }
}

impl MarketplaceMessage {
    /// Wrap an action with the current protocol version.
    pub fn new(action: MarketAction) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            action,
        }
    }

    pub fn to_json(&self) -> OmpResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> OmpResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the message to CBOR bytes
    pub fn to_cbor(&self) -> OmpResult<Vec<u8>> {
        cbor_to_vec(self)
    }

    /// Deserialize a message from CBOR bytes
    pub fn from_cbor(data: &[u8]) -> OmpResult<Self> {
        cbor_from_limited_reader(data, MAX_TRADE_RECORD_SIZE)
    }
}

impl From<ListingAddAction> for MarketplaceMessage {
    fn from(action: ListingAddAction) -> Self {
        Self::new(MarketAction::ListingAdd(action))
    }
}

impl From<BidAction> for MarketplaceMessage {
    fn from(action: BidAction) -> Self {
        Self::new(MarketAction::Bid(action))
    }
}

impl From<AcceptAction> for MarketplaceMessage {
    fn from(action: AcceptAction) -> Self {
        Self::new(MarketAction::Accept(action))
    }
}

impl From<LockAction> for MarketplaceMessage {
    fn from(action: LockAction) -> Self {
        Self::new(MarketAction::Lock(action))
    }
}
