use serde::{Deserialize, Serialize};

use super::accept::SignatureSet;

/// `MPA_LOCK`: the buyer's signatures over the funding, destroy and refund
/// transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockAction {
    pub generated: u64,
    /// Hash of the bid being locked.
    pub bid: String,
    pub buyer: BuyerSignatures,
    /// Echo of the accepted release template.
    pub release_tx_unsigned: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Funding transaction with the buyer inputs signed.
    #[serde(rename = "_rawbidtx", default, skip_serializing_if = "Option::is_none")]
    pub raw_bid_tx: Option<String>,
    /// Fully signed destroy transaction.
    #[serde(rename = "_rawdesttx", default, skip_serializing_if = "Option::is_none")]
    pub raw_dest_tx: Option<String>,
    /// Refund transaction signed by the buyer.
    #[serde(
        rename = "_rawrefundtx",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub raw_refund_tx: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerSignatures {
    /// Buyer funding-input signatures.
    pub signatures: Vec<crate::transaction::SignatureShare>,
    pub destroy: SignatureSet,
    pub refund: SignatureSet,
}

impl LockAction {
    /// Copy without local-only fields.
    pub fn stripped(&self) -> Self {
        Self {
            raw_bid_tx: None,
            raw_dest_tx: None,
            raw_refund_tx: None,
            ..self.clone()
        }
    }
}
