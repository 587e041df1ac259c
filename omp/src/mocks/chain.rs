//! In-memory blockchain shared by every simulated node.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::node::MockNode;
use super::random::MockRandom;
use super::time::MockTime;
use crate::marketplace::OutputType;
use crate::traits::{BlockchainInfo, BroadcastRejection, TxVerification};
use crate::transaction::{OutPoint, Prevout, RawTransaction, Script};
use crate::util::sha256d;

/// Fee rate of a fresh chain, in minor units per byte.
pub const DEFAULT_FEE_RATE: u64 = 5;

#[derive(Debug, Clone)]
pub(crate) struct ChainUtxo {
    pub prevout: Prevout,
    pub height: u64,
}

#[derive(Debug, Default)]
pub(crate) struct ChainState {
    pub utxos: BTreeMap<OutPoint, ChainUtxo>,
    pub txids: HashSet<String>,
    pub height: u64,
    pub burned: u64,
    pub fees: u64,
    pub minted: u64,
}

#[derive(Debug)]
pub(crate) struct MockChainInner {
    pub state: RwLock<ChainState>,
    pub time: MockTime,
    pub fee_rate: AtomicU64,
}

/// Handle to a simulated chain for creating party nodes.
///
/// Every node created from the same handle sees the same UTXO set and the
/// same clock. Blocks are mined instantly: a submitted transaction is
/// confirmed by the time `send_raw_transaction` returns.
#[derive(Debug, Clone)]
pub struct MockChain {
    inner: Arc<MockChainInner>,
}

impl MockChain {
    pub fn new(time: MockTime) -> Self {
        Self {
            inner: Arc::new(MockChainInner {
                state: RwLock::new(ChainState::default()),
                time,
                fee_rate: AtomicU64::new(DEFAULT_FEE_RATE),
            }),
        }
    }

    /// Create a node for one party. `seed` pins the keys it generates.
    pub fn create_party_view(&self, name: impl Into<String>, seed: u64) -> MockNode {
        MockNode::with_chain(self.inner.clone(), name.into(), MockRandom::new(seed))
    }

    /// The clock the chain's median time follows.
    pub fn time(&self) -> &MockTime {
        &self.inner.time
    }

    pub fn median_time(&self) -> u64 {
        self.inner.time.get()
    }

    /// Move chain median time forward.
    pub fn advance_time(&self, seconds: u64) {
        self.inner.time.advance(seconds);
    }

    pub fn set_fee_rate(&self, per_byte: u64) {
        self.inner.fee_rate.store(per_byte, Ordering::SeqCst);
    }

    pub async fn height(&self) -> u64 {
        self.inner.state.read().await.height
    }

    /// Total amount sent to burn outputs.
    pub async fn burned(&self) -> u64 {
        self.inner.state.read().await.burned
    }

    /// Total fees collected by mined transactions.
    pub async fn fees(&self) -> u64 {
        self.inner.state.read().await.fees
    }

    pub async fn is_unspent(&self, outpoint: &OutPoint) -> bool {
        self.inner.state.read().await.utxos.contains_key(outpoint)
    }

    pub async fn contains_tx(&self, txid: &str) -> bool {
        self.inner.state.read().await.txids.contains(txid)
    }

    /// Outputs of `txid` still unspent, by output index.
    pub async fn outputs_of(&self, txid: &str) -> Vec<Prevout> {
        self.inner
            .state
            .read()
            .await
            .utxos
            .values()
            .filter(|u| u.prevout.txid == txid)
            .map(|u| u.prevout.clone())
            .collect()
    }

    /// Create a new output out of thin air, as if mined in a coinbase.
    pub async fn mint(&self, script: Script, output_type: OutputType, amount: u64) -> Prevout {
        self.inner.mint(script, output_type, amount).await
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new(MockTime::default())
    }
}

impl MockChainInner {
    pub async fn mint(&self, script: Script, output_type: OutputType, amount: u64) -> Prevout {
        let mut state = self.state.write().await;
        state.minted += 1;
        let mut preimage = b"coinbase".to_vec();
        preimage.extend_from_slice(&state.minted.to_le_bytes());
        let txid = hex::encode(sha256d(&preimage));
        state.height += 1;
        let prevout = Prevout {
            txid: txid.clone(),
            vout: 0,
            amount,
            output_type,
            script,
        };
        let height = state.height;
        state.utxos.insert(
            prevout.outpoint(),
            ChainUtxo {
                prevout: prevout.clone(),
                height,
            },
        );
        state.txids.insert(txid);
        debug!("Minted {} to {:?} at height {}", amount, prevout.script, height);
        prevout
    }

    pub async fn blockchain_info(&self) -> BlockchainInfo {
        BlockchainInfo {
            blocks: self.state.read().await.height,
            median_time: self.time.get(),
        }
    }

    /// Check signatures against `prevouts`, or against the UTXO set when
    /// `prevouts` is empty.
    pub async fn verify(&self, raw_hex: &str, prevouts: &[Prevout]) -> Result<TxVerification> {
        let tx = RawTransaction::from_hex(raw_hex).map_err(|e| anyhow!("{e}"))?;
        let resolved = if prevouts.is_empty() {
            let state = self.state.read().await;
            let mut resolved = Vec::with_capacity(tx.inputs.len());
            for input in &tx.inputs {
                let outpoint = OutPoint {
                    txid: input.txid.clone(),
                    vout: input.vout,
                };
                match state.utxos.get(&outpoint) {
                    Some(utxo) => resolved.push(utxo.prevout.clone()),
                    None => {
                        return Ok(TxVerification {
                            complete: false,
                            errors: vec![format!("input {outpoint} is unknown or spent")],
                        })
                    }
                }
            }
            resolved
        } else {
            prevouts.to_vec()
        };
        verify_signatures(&tx, &resolved)
    }

    /// Validate and mine a transaction.
    pub async fn submit(&self, raw_hex: &str) -> Result<String> {
        let tx = RawTransaction::from_hex(raw_hex)
            .map_err(|e| BroadcastRejection::Policy(e.to_string()))?;
        let txid = tx.txid().map_err(|e| BroadcastRejection::Policy(e.to_string()))?;
        let median_time = self.time.get();

        let mut state = self.state.write().await;
        if state.txids.contains(&txid) {
            return Err(BroadcastRejection::AlreadyKnown.into());
        }

        let mut prevouts = Vec::with_capacity(tx.inputs.len());
        let mut spent = HashSet::new();
        for input in &tx.inputs {
            let outpoint = OutPoint {
                txid: input.txid.clone(),
                vout: input.vout,
            };
            if !spent.insert(outpoint.clone()) {
                return Err(BroadcastRejection::Policy(format!("{outpoint} spent twice")).into());
            }
            let utxo = state
                .utxos
                .get(&outpoint)
                .ok_or_else(|| BroadcastRejection::MissingInputs(outpoint.to_string()))?;
            prevouts.push(utxo.prevout.clone());
        }

        // Final once median time reaches the lock time.
        if tx.lock_time_enforced() && u64::from(tx.lock_time) > median_time {
            return Err(BroadcastRejection::NonFinal {
                lock_time: tx.lock_time,
                median_time,
            }
            .into());
        }

        let verification = verify_signatures(&tx, &prevouts)?;
        if !verification.complete {
            return Err(BroadcastRejection::InvalidSignature(verification.errors.join("; ")).into());
        }

        let input_total = crate::transaction::total_amount(&prevouts)
            .ok_or_else(|| BroadcastRejection::Policy("input total overflows".into()))?;
        let output_total = tx
            .output_total()
            .ok_or_else(|| BroadcastRejection::Policy("output total overflows".into()))?;
        let fee = input_total.checked_sub(output_total).ok_or_else(|| {
            BroadcastRejection::Policy(format!(
                "outputs {output_total} exceed inputs {input_total}"
            ))
        })?;

        state.height += 1;
        let height = state.height;
        for outpoint in spent {
            state.utxos.remove(&outpoint);
        }
        for (vout, output) in tx.outputs.iter().enumerate() {
            if output.script == Script::Burn {
                state.burned += output.amount;
                continue;
            }
            let prevout = Prevout {
                txid: txid.clone(),
                vout: vout as u32,
                amount: output.amount,
                output_type: output.output_type,
                script: output.script.clone(),
            };
            state
                .utxos
                .insert(prevout.outpoint(), ChainUtxo { prevout, height });
        }
        state.fees += fee;
        state.txids.insert(txid.clone());
        info!("Mined {} at height {} (fee {})", txid, height, fee);
        Ok(txid)
    }
}

/// Check every input's witness against the output it spends.
fn verify_signatures(tx: &RawTransaction, prevouts: &[Prevout]) -> Result<TxVerification> {
    if prevouts.len() != tx.inputs.len() {
        return Err(anyhow!(
            "{} prevouts for {} inputs",
            prevouts.len(),
            tx.inputs.len()
        ));
    }
    let mut errors = Vec::new();
    for (index, (input, prevout)) in tx.inputs.iter().zip(prevouts).enumerate() {
        if input.txid != prevout.txid || input.vout != prevout.vout {
            errors.push(format!("input {index}: prevout {} does not match", prevout.outpoint()));
            continue;
        }
        let sighash = tx
            .sighash(index as u32, prevout.amount)
            .map_err(|e| anyhow!("{e}"))?;
        match &prevout.script {
            Script::Address { address } => match input.witness.as_slice() {
                [sig, pubkey] if hex::encode(pubkey) == *address => {
                    if let Err(e) = check_signature(pubkey, sig, &sighash) {
                        errors.push(format!("input {index}: {e}"));
                    }
                }
                [] => errors.push(format!("input {index}: missing signature")),
                _ => errors.push(format!("input {index}: malformed witness")),
            },
            Script::Multisig { required, pubkeys } => {
                if input.witness.is_empty() {
                    errors.push(format!("input {index}: 0 of {required} signatures"));
                    continue;
                }
                if input.witness.len() != pubkeys.len() {
                    errors.push(format!("input {index}: malformed multisig witness"));
                    continue;
                }
                let mut valid = 0usize;
                for (key, sig) in crate::transaction::witness::multisig_signatures(&input.witness, pubkeys) {
                    let key_bytes = hex::decode(key).unwrap_or_default();
                    match check_signature(&key_bytes, sig, &sighash) {
                        Ok(()) => valid += 1,
                        Err(e) => errors.push(format!("input {index}: key {key}: {e}")),
                    }
                }
                if valid < usize::from(*required) {
                    errors.push(format!("input {index}: {valid} of {required} signatures"));
                }
            }
            Script::Burn => errors.push(format!("input {index}: burn outputs are unspendable")),
        }
    }
    Ok(TxVerification {
        complete: errors.is_empty(),
        errors,
    })
}

fn check_signature(pubkey: &[u8], sig: &[u8], msg: &[u8; 32]) -> Result<()> {
    let key_bytes: [u8; 32] = pubkey
        .try_into()
        .map_err(|_| anyhow!("public key must be 32 bytes"))?;
    let key = VerifyingKey::from_bytes(&key_bytes).map_err(|e| anyhow!("bad public key: {e}"))?;
    let sig_bytes: [u8; 64] = sig
        .try_into()
        .map_err(|_| anyhow!("signature must be 64 bytes, got {}", sig.len()))?;
    key.verify(msg, &Signature::from_bytes(&sig_bytes))
        .map_err(|e| anyhow!("signature verification failed: {e}"))
}
