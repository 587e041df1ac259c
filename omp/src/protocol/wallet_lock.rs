//! Per-wallet critical sections.
//!
//! Output selection, reservation and signing for one `(currency, wallet)`
//! pair happen under a single async mutex, so two concurrent rounds on the
//! same wallet never pick the same outputs.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::marketplace::Cryptocurrency;

type LockKey = (Cryptocurrency, String);

/// Async mutex per `(currency, wallet)`, created on first use.
///
/// Entries that no guard or waiter references are dropped on the next
/// `acquire`, so the map only holds wallets with rounds in flight.
#[derive(Debug, Default)]
pub struct WalletLocks {
    locks: parking_lot::Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `wallet` on `currency`.
    pub async fn acquire(&self, currency: Cryptocurrency, wallet: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            // Clones are only taken under this mutex, so a count of one means idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry((currency, wallet.to_string()))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        debug!("Waiting for wallet lock {}/{}", currency, wallet);
        lock.lock_owned().await
    }

    /// Number of wallets held or awaited, plus idle ones not yet pruned.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
