//! Settable clock shared by the simulated chain and the engines under test.
//!
//! The mock chain derives its median time from this clock, so moving it is
//! how tests reach (or stop just short of) a destroy unlock time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::traits::TimeProvider;

/// 2024-01-01 00:00:00 UTC.
const DEFAULT_START: u64 = 1_704_067_200;

/// Clock whose clones all observe the same instant.
#[derive(Debug, Clone)]
pub struct MockTime {
    now: Arc<AtomicU64>,
}

impl MockTime {
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn default_time() -> Self {
        Self::new(DEFAULT_START)
    }

    /// Jump to `timestamp`, possibly backwards.
    pub fn set(&self, timestamp: u64) {
        self.now.store(timestamp, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }

    pub fn get(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl Default for MockTime {
    fn default() -> Self {
        Self::default_time()
    }
}

impl TimeProvider for MockTime {
    fn now_unix(&self) -> u64 {
        self.get()
    }
}
