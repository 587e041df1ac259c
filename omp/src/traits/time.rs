//! Wall clock used for message timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

/// Trait for providing the current wall-clock time.
///
/// Message timestamps (`generated`) come from here. Escrow time locks never
/// do: they are anchored to the chain's median time as reported by the node.
pub trait TimeProvider: Send + Sync {
    /// Returns the current Unix timestamp in seconds.
    fn now_unix(&self) -> u64;

    /// Returns the current Unix timestamp in milliseconds.
    fn now_millis(&self) -> u64 {
        self.now_unix().saturating_mul(1000)
    }
}

/// System clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_unix(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

impl SystemTimeProvider {
    pub const fn new() -> Self {
        Self
    }
}
