//! Raw transaction model, serialization, output selection and the escrow
//! transaction templates.
//!
//! Everything in here is deterministic: two parties feeding the same terms
//! into a template get byte-identical unsigned transactions, which is what the
//! later rounds compare.

pub mod amount;
pub mod raw;
pub mod selection;
pub mod templates;
pub mod witness;

use serde::{Deserialize, Serialize};

use crate::marketplace::OutputType;

pub use raw::{RawTransaction, TxInput, SEQUENCE_FINAL, SEQUENCE_LOCKTIME};
pub use selection::select_outputs;

/// Locking condition of an output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Script {
    /// Pay to a single key (hex-encoded public key or node address).
    Address { address: String },
    /// `required`-of-n multisig over hex-encoded public keys, in order.
    Multisig { required: u8, pubkeys: Vec<String> },
    /// Provably unspendable output.
    Burn,
}

impl Script {
    pub fn address(address: impl Into<String>) -> Self {
        Self::Address {
            address: address.into(),
        }
    }

    /// 2-of-2 escrow script. Key order is fixed: buyer first, seller second.
    pub fn escrow(buyer_pubkey: &str, seller_pubkey: &str) -> Self {
        Self::Multisig {
            required: 2,
            pubkeys: vec![buyer_pubkey.to_string(), seller_pubkey.to_string()],
        }
    }
}

/// Where a party wants an output to go. Amounts are assigned by templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub output_type: OutputType,
    pub script: Script,
}

impl Destination {
    pub fn with_amount(&self, amount: u64) -> TxOutput {
        TxOutput {
            output_type: self.output_type,
            amount,
            script: self.script.clone(),
        }
    }
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOutput {
    pub output_type: OutputType,
    pub amount: u64,
    pub script: Script,
}

impl TxOutput {
    pub fn destination(&self) -> Destination {
        Destination {
            output_type: self.output_type,
            script: self.script.clone(),
        }
    }
}

/// Reference to a previous transaction output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: String,
    pub vout: u32,
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// An unspent output being spent, with everything needed to sign and verify
/// the spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prevout {
    pub txid: String,
    pub vout: u32,
    pub amount: u64,
    pub output_type: OutputType,
    pub script: Script,
}

impl Prevout {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.txid.clone(),
            vout: self.vout,
        }
    }

    /// The output this prevout spends, as it appears in its funding transaction.
    pub fn as_output(&self) -> TxOutput {
        TxOutput {
            output_type: self.output_type,
            amount: self.amount,
            script: self.script.clone(),
        }
    }
}

/// One party's signature over one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureShare {
    pub input: u32,
    pub pub_key: String,
    pub signature: String,
}

/// An input the adapter is asked to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningInput {
    pub index: u32,
    pub prevout: Prevout,
}

/// Sum of prevout amounts, `None` on overflow.
pub fn total_amount(prevouts: &[Prevout]) -> Option<u64> {
    prevouts
        .iter()
        .try_fold(0u64, |acc, p| acc.checked_add(p.amount))
}
