//! Node adapter abstraction: everything the protocol needs from a
//! cryptocurrency daemon and its wallet.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::marketplace::OutputType;
use crate::transaction::{Destination, OutPoint, Prevout, SignatureShare, SigningInput};

/// Chain state relevant to time locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainInfo {
    pub blocks: u64,
    /// Median time of the last blocks; lock times are checked against this.
    pub median_time: u64,
}

/// Result of checking a raw transaction's signatures.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxVerification {
    /// Every input carries valid signatures from all required keys.
    pub complete: bool,
    /// Per-input problems, empty when complete.
    pub errors: Vec<String>,
}

/// Reasons a node refuses a broadcast. Adapters return these inside the
/// `anyhow::Error` of [`NodeAdapter::send_raw_transaction`] so the engine can
/// tell a premature broadcast apart from other rejections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastRejection {
    #[error("non-final: lock time {lock_time} not reached (median time {median_time})")]
    NonFinal { lock_time: u32, median_time: u64 },
    #[error("missing or spent inputs: {0}")]
    MissingInputs(String),
    #[error("transaction already in chain")]
    AlreadyKnown,
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("rejected by policy: {0}")]
    Policy(String),
}

/// Abstraction over a cryptocurrency node and one or more of its wallets.
///
/// One adapter serves one currency. The engine never sees private keys: it
/// hands over unsigned transactions and gets signature shares back.
#[async_trait]
pub trait NodeAdapter: Send + Sync {
    /// Unspent, unlocked outputs of `output_type` with at least
    /// `min_confirmations`.
    async fn list_unspent(
        &self,
        wallet: &str,
        output_type: OutputType,
        min_confirmations: u32,
    ) -> Result<Vec<Prevout>>;

    /// Lock (`unlock == false`) or unlock outputs so concurrent selections
    /// skip them.
    async fn lock_unspent(&self, wallet: &str, unlock: bool, outpoints: &[OutPoint]) -> Result<()>;

    /// Fresh public key (hex) for a multisig escrow output.
    async fn get_new_pubkey(&self, wallet: &str) -> Result<String>;

    /// Fresh destination of `output_type` owned by `wallet`.
    async fn get_new_destination(&self, wallet: &str, output_type: OutputType)
        -> Result<Destination>;

    /// Sign `inputs` of the unsigned transaction with the wallet's keys.
    async fn sign_inputs(
        &self,
        wallet: &str,
        unsigned_hex: &str,
        inputs: &[SigningInput],
    ) -> Result<Vec<SignatureShare>>;

    /// Check signatures of `raw_hex`; `prevouts[i]` is spent by input `i`.
    async fn verify_raw_transaction(&self, raw_hex: &str, prevouts: &[Prevout])
        -> Result<TxVerification>;

    /// Broadcast and return the txid.
    async fn send_raw_transaction(&self, raw_hex: &str) -> Result<String>;

    /// Fee for a transaction of `tx_bytes` at the current fee rate.
    async fn estimate_fee(&self, tx_bytes: usize) -> Result<u64>;

    async fn blockchain_info(&self) -> Result<BlockchainInfo>;
}
