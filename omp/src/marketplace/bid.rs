use serde::{Deserialize, Serialize};

use super::types::{Cryptocurrency, EscrowType};
use crate::transaction::{Destination, Prevout, TxOutput};

/// What a buyer chooses when bidding on a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidConfiguration {
    pub cryptocurrency: Cryptocurrency,
    pub escrow: EscrowType,
    pub shipping_address: ShippingAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub first_name: String,
    pub last_name: String,
    pub address_line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

/// `MPA_BID`: the buyer's offer, carrying the buyer half of the funding
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidAction {
    pub generated: u64,
    /// Hash of the listing being bid on.
    pub item: String,
    pub buyer: BuyerData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Unsigned funding skeleton with only the buyer side filled in.
    #[serde(
        rename = "_rawbidtx",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub raw_bid_tx: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerData {
    pub shipping_address: ShippingAddress,
    pub payment: BuyerPayment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerPayment {
    pub cryptocurrency: Cryptocurrency,
    pub escrow: EscrowType,
    /// Shipping price the buyer agreed to, in minor units.
    pub shipping_price: u64,
    /// Buyer key of the 2-of-2 escrow output.
    pub pub_key: String,
    pub inputs: Vec<Prevout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_output: Option<TxOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_output: Option<Destination>,
    pub refund_output: Destination,
}

impl BidAction {
    pub fn payment(&self) -> &BuyerPayment {
        &self.buyer.payment
    }

    /// Copy without local-only fields.
    pub fn stripped(&self) -> Self {
        Self {
            raw_bid_tx: None,
            ..self.clone()
        }
    }
}
