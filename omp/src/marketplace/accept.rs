use serde::{Deserialize, Serialize};

use crate::transaction::{Destination, Prevout, SignatureShare, TxOutput};

/// `MPA_ACCEPT`: the seller's answer to a bid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptAction {
    pub generated: u64,
    /// Hash of the bid being accepted.
    pub bid: String,
    pub seller: SellerData,
    /// Unsigned release transaction both parties must agree on.
    pub release_tx_unsigned: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Funding transaction carrying the seller's input signatures.
    #[serde(rename = "_rawbidtx", default, skip_serializing_if = "Option::is_none")]
    pub raw_bid_tx: Option<String>,
    /// Destroy transaction signed by the seller.
    #[serde(rename = "_rawdesttx", default, skip_serializing_if = "Option::is_none")]
    pub raw_dest_tx: Option<String>,
    /// Release transaction signed by the seller.
    #[serde(
        rename = "_rawreleasetx",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub raw_release_tx: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerData {
    /// Seller key of the 2-of-2 escrow output.
    pub pub_key: String,
    pub inputs: Vec<Prevout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_output: Option<TxOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_output: Option<Destination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_output: Option<Destination>,
    /// Fee of each settlement transaction (release, refund, destroy).
    pub fee: u64,
    /// Fee of the funding transaction, paid by the seller.
    pub funding_fee: u64,
    pub destroy: DestroyTerms,
    pub release: SignatureSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyTerms {
    /// Median time after which the destroy transaction becomes final.
    pub unlock_time: u32,
    pub signatures: Vec<SignatureShare>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSet {
    pub signatures: Vec<SignatureShare>,
}

impl AcceptAction {
    /// Copy without local-only fields.
    pub fn stripped(&self) -> Self {
        Self {
            raw_bid_tx: None,
            raw_dest_tx: None,
            raw_release_tx: None,
            ..self.clone()
        }
    }
}
