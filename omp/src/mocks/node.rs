//! Simulated node adapter: one party's wallets on top of a shared [`MockChain`].
//!
//! [`MockChain`]: super::chain::MockChain

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use tokio::sync::RwLock;
use tracing::debug;

use super::chain::MockChainInner;
use super::random::MockRandom;
use crate::marketplace::OutputType;
use crate::traits::{BlockchainInfo, NodeAdapter, RandomSource, TxVerification};
use crate::transaction::{
    Destination, OutPoint, Prevout, RawTransaction, Script, SignatureShare, SigningInput,
};

/// Types of failures that can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockNodeFailure {
    /// Fail every call.
    All,
    ListUnspent,
    Signing,
    Broadcast,
    FeeEstimation,
    /// Fail `get_new_pubkey` and `get_new_destination`.
    DestinationCreation,
}

#[derive(Default)]
struct Wallet {
    /// Hex public key to signing key.
    keys: HashMap<String, SigningKey>,
    /// Outputs reserved through `lock_unspent`.
    locked: HashSet<OutPoint>,
}

/// One party's view of the simulated chain.
///
/// Clones share wallets, so a test can keep a handle for inspection while the
/// engine owns another.
#[derive(Clone)]
pub struct MockNode {
    chain: Arc<MockChainInner>,
    name: String,
    wallets: Arc<RwLock<HashMap<String, Wallet>>>,
    rng: MockRandom,
    fail_mode: Arc<RwLock<Option<MockNodeFailure>>>,
}

impl std::fmt::Debug for MockNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockNode").field("name", &self.name).finish()
    }
}

impl MockNode {
    pub(crate) fn with_chain(chain: Arc<MockChainInner>, name: String, rng: MockRandom) -> Self {
        Self {
            chain,
            name,
            wallets: Arc::new(RwLock::new(HashMap::new())),
            rng,
            fail_mode: Arc::new(RwLock::new(None)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set a failure mode for testing error handling.
    pub async fn set_fail_mode(&self, mode: Option<MockNodeFailure>) {
        *self.fail_mode.write().await = mode;
    }

    async fn should_fail(&self, op: MockNodeFailure) -> bool {
        matches!(*self.fail_mode.read().await, Some(m) if m == MockNodeFailure::All || m == op)
    }

    async fn check(&self, op: MockNodeFailure, what: &str) -> Result<()> {
        if self.should_fail(op).await {
            return Err(anyhow!("Mock {} failure on {}", what, self.name));
        }
        Ok(())
    }

    async fn new_key(&self, wallet: &str) -> String {
        let key = SigningKey::from_bytes(&self.rng.random_bytes_32());
        let pubkey = hex::encode(key.verifying_key().to_bytes());
        self.wallets
            .write()
            .await
            .entry(wallet.to_string())
            .or_default()
            .keys
            .insert(pubkey.clone(), key);
        pubkey
    }

    /// Mint a confirmed output of `amount` to a fresh key in `wallet`.
    pub async fn fund(&self, wallet: &str, output_type: OutputType, amount: u64) -> Result<Prevout> {
        let pubkey = self.new_key(wallet).await;
        Ok(self
            .chain
            .mint(Script::address(pubkey), output_type, amount)
            .await)
    }

    /// Unspent value held by `wallet`, reserved outputs included.
    pub async fn balance(&self, wallet: &str) -> u64 {
        self.owned_utxos(wallet)
            .await
            .iter()
            .map(|p| p.amount)
            .sum()
    }

    /// Value `wallet` received from transaction `txid` and still holds.
    pub async fn received_from(&self, wallet: &str, txid: &str) -> u64 {
        self.owned_utxos(wallet)
            .await
            .iter()
            .filter(|p| p.txid == txid)
            .map(|p| p.amount)
            .sum()
    }

    /// Reserved outputs that are still unspent.
    pub async fn locked_outpoints(&self, wallet: &str) -> Vec<OutPoint> {
        let locked: Vec<OutPoint> = match self.wallets.read().await.get(wallet) {
            Some(w) => w.locked.iter().cloned().collect(),
            None => return Vec::new(),
        };
        let state = self.chain.state.read().await;
        let mut unspent: Vec<OutPoint> = locked
            .into_iter()
            .filter(|o| state.utxos.contains_key(o))
            .collect();
        unspent.sort();
        unspent
    }

    async fn owned_utxos(&self, wallet: &str) -> Vec<Prevout> {
        let wallets = self.wallets.read().await;
        let Some(w) = wallets.get(wallet) else {
            return Vec::new();
        };
        let state = self.chain.state.read().await;
        state
            .utxos
            .values()
            .filter(|u| match &u.prevout.script {
                Script::Address { address } => w.keys.contains_key(address),
                _ => false,
            })
            .map(|u| u.prevout.clone())
            .collect()
    }
}

#[async_trait]
impl NodeAdapter for MockNode {
    async fn list_unspent(
        &self,
        wallet: &str,
        output_type: OutputType,
        min_confirmations: u32,
    ) -> Result<Vec<Prevout>> {
        self.check(MockNodeFailure::ListUnspent, "list_unspent").await?;
        let wallets = self.wallets.read().await;
        let Some(w) = wallets.get(wallet) else {
            return Ok(Vec::new());
        };
        let state = self.chain.state.read().await;
        Ok(state
            .utxos
            .values()
            .filter(|u| u.prevout.output_type == output_type)
            .filter(|u| state.height - u.height + 1 >= u64::from(min_confirmations))
            .filter(|u| !w.locked.contains(&u.prevout.outpoint()))
            .filter(|u| match &u.prevout.script {
                Script::Address { address } => w.keys.contains_key(address),
                _ => false,
            })
            .map(|u| u.prevout.clone())
            .collect())
    }

    async fn lock_unspent(&self, wallet: &str, unlock: bool, outpoints: &[OutPoint]) -> Result<()> {
        self.check(MockNodeFailure::All, "lock_unspent").await?;
        let mut wallets = self.wallets.write().await;
        let w = wallets.entry(wallet.to_string()).or_default();
        if unlock {
            for outpoint in outpoints {
                w.locked.remove(outpoint);
            }
            debug!("{}: unlocked {} outputs", self.name, outpoints.len());
            return Ok(());
        }
        if let Some(taken) = outpoints.iter().find(|o| w.locked.contains(*o)) {
            return Err(anyhow!("output {taken} is already locked"));
        }
        w.locked.extend(outpoints.iter().cloned());
        debug!("{}: locked {} outputs", self.name, outpoints.len());
        Ok(())
    }

    async fn get_new_pubkey(&self, wallet: &str) -> Result<String> {
        self.check(MockNodeFailure::DestinationCreation, "get_new_pubkey")
            .await?;
        Ok(self.new_key(wallet).await)
    }

    async fn get_new_destination(
        &self,
        wallet: &str,
        output_type: OutputType,
    ) -> Result<Destination> {
        self.check(MockNodeFailure::DestinationCreation, "get_new_destination")
            .await?;
        let pubkey = self.new_key(wallet).await;
        Ok(Destination {
            output_type,
            script: Script::address(pubkey),
        })
    }

    async fn sign_inputs(
        &self,
        wallet: &str,
        unsigned_hex: &str,
        inputs: &[SigningInput],
    ) -> Result<Vec<SignatureShare>> {
        self.check(MockNodeFailure::Signing, "sign_inputs").await?;
        let tx = RawTransaction::from_hex(unsigned_hex).map_err(|e| anyhow!("{e}"))?;
        let wallets = self.wallets.read().await;
        let w = wallets
            .get(wallet)
            .ok_or_else(|| anyhow!("unknown wallet '{wallet}'"))?;

        let mut shares = Vec::with_capacity(inputs.len());
        for signing in inputs {
            let input = tx
                .inputs
                .get(signing.index as usize)
                .ok_or_else(|| anyhow!("transaction has no input {}", signing.index))?;
            if input.txid != signing.prevout.txid || input.vout != signing.prevout.vout {
                return Err(anyhow!(
                    "input {} does not spend {}",
                    signing.index,
                    signing.prevout.outpoint()
                ));
            }
            let (pub_key, key) = match &signing.prevout.script {
                Script::Address { address } => w.keys.get_key_value(address),
                Script::Multisig { pubkeys, .. } => {
                    pubkeys.iter().find_map(|k| w.keys.get_key_value(k))
                }
                Script::Burn => None,
            }
            .ok_or_else(|| {
                anyhow!(
                    "wallet '{wallet}' has no key for input {} ({})",
                    signing.index,
                    signing.prevout.outpoint()
                )
            })?;
            let sighash = tx
                .sighash(signing.index, signing.prevout.amount)
                .map_err(|e| anyhow!("{e}"))?;
            shares.push(SignatureShare {
                input: signing.index,
                pub_key: pub_key.clone(),
                signature: hex::encode(key.sign(&sighash).to_bytes()),
            });
        }
        Ok(shares)
    }

    async fn verify_raw_transaction(
        &self,
        raw_hex: &str,
        prevouts: &[Prevout],
    ) -> Result<TxVerification> {
        self.check(MockNodeFailure::All, "verify_raw_transaction").await?;
        self.chain.verify(raw_hex, prevouts).await
    }

    async fn send_raw_transaction(&self, raw_hex: &str) -> Result<String> {
        self.check(MockNodeFailure::Broadcast, "send_raw_transaction")
            .await?;
        self.chain.submit(raw_hex).await
    }

    async fn estimate_fee(&self, tx_bytes: usize) -> Result<u64> {
        self.check(MockNodeFailure::FeeEstimation, "estimate_fee").await?;
        let rate = self.chain.fee_rate.load(Ordering::SeqCst);
        (tx_bytes as u64)
            .checked_mul(rate)
            .ok_or_else(|| anyhow!("fee for {tx_bytes} bytes overflows"))
    }

    async fn blockchain_info(&self) -> Result<BlockchainInfo> {
        self.check(MockNodeFailure::All, "blockchain_info").await?;
        Ok(self.chain.blockchain_info().await)
    }
}
