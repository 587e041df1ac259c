//! Configuration constants and escrow policy for the protocol engine.
//!
//! This module centralizes protocol constants and the tunable escrow policy
//! so both parties of a trade can agree on the same numbers.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Protocol version stamped on every outgoing message.
pub const PROTOCOL_VERSION: &str = "0.3.0";

/// Maximum size of a persisted trade record (CBOR).
pub const MAX_TRADE_RECORD_SIZE: usize = 1024 * 1024;

/// Estimated serialized size of a release/refund/destroy transaction.
/// Confidential outputs carry range proofs, so this is deliberately generous.
pub const SETTLEMENT_TX_ESTIMATED_BYTES: usize = 1_000;

/// Fixed part of the funding transaction size estimate.
pub const FUNDING_TX_BASE_BYTES: usize = 200;

/// Estimated bytes contributed by each signed funding input.
pub const FUNDING_INPUT_BYTES: usize = 180;

/// Estimated bytes contributed by each funding output.
pub const FUNDING_OUTPUT_BYTES: usize = 700;

/// Tolerated difference between the two parties' view of chain median time.
pub const MEDIAN_TIME_TOLERANCE_SECS: u64 = 2 * 3600;

/// Upper bound on fee re-estimation passes during seller output selection.
pub const FEE_SELECTION_MAX_PASSES: usize = 3;

/// Environment variable overriding the destroy lock window (seconds).
pub const OMP_DESTROY_LOCK_SECS_ENV: &str = "OMP_DESTROY_LOCK_SECS";

/// Environment variable overriding the maximum accepted settlement fee.
pub const OMP_MAX_SETTLEMENT_FEE_ENV: &str = "OMP_MAX_SETTLEMENT_FEE";

/// Environment variable overriding the minimum confirmations for inputs.
pub const OMP_MIN_CONFIRMATIONS_ENV: &str = "OMP_MIN_CONFIRMATIONS";

/// Network the engine operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Testnet => write!(f, "testnet"),
            Self::Regtest => write!(f, "regtest"),
        }
    }
}

/// How a party's bond is derived from its escrow ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondFormula {
    /// `bond = base_price * ratio / 100`
    PercentOfBasePrice,
    /// `bond = (base_price + shipping) * ratio / 100`
    PercentOfTotal,
}

/// Tunable parameters of the MAD escrow.
///
/// Both parties must run with the same policy, otherwise the templates they
/// derive independently will differ and `lock` reports a protocol violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowPolicy {
    pub bond_formula: BondFormula,
    /// Seconds added to the chain median time to get the destroy unlock time,
    /// unless the listing specifies `secondsToLock`.
    pub destroy_lock_secs: u64,
    /// Largest per-transaction settlement fee a buyer accepts from a seller.
    pub max_settlement_fee: u64,
    /// Minimum confirmations for outputs selected as funding inputs.
    pub min_confirmations: u32,
}

impl EscrowPolicy {
    /// Defaults for the given network.
    pub const fn for_network(network: Network) -> Self {
        let destroy_lock_secs = match network {
            Network::Mainnet => 30 * 24 * 3600,
            Network::Testnet | Network::Regtest => 2_880,
        };
        Self {
            bond_formula: BondFormula::PercentOfBasePrice,
            destroy_lock_secs,
            max_settlement_fee: 100_000,
            min_confirmations: 1,
        }
    }

    /// Network defaults with environment overrides applied.
    pub fn from_env(network: Network) -> Self {
        let mut policy = Self::for_network(network);
        if let Some(v) = env_u64(OMP_DESTROY_LOCK_SECS_ENV) {
            policy.destroy_lock_secs = v;
        }
        if let Some(v) = env_u64(OMP_MAX_SETTLEMENT_FEE_ENV) {
            policy.max_settlement_fee = v;
        }
        if let Some(v) = env_u64(OMP_MIN_CONFIRMATIONS_ENV) {
            match u32::try_from(v) {
                Ok(v) => policy.min_confirmations = v,
                Err(_) => warn!("{} out of range, ignoring", OMP_MIN_CONFIRMATIONS_ENV),
            }
        }
        policy
    }
}

impl Default for EscrowPolicy {
    fn default() -> Self {
        Self::for_network(Network::Testnet)
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Ignoring {}='{}': {}", name, raw, e);
            None
        }
    }
}

/// Return the current Unix timestamp in seconds.
pub fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
