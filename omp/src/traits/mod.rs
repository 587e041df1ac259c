//! Trait abstractions for dependency injection and testability.
//!
//! The protocol engine talks to the outside world only through these traits,
//! so every round can run against the in-memory chain in [`crate::mocks`].

pub mod node;
pub mod random;
pub mod time;
pub mod validator;

// Re-export all traits for crate-internal use.
// The public API surface is controlled by lib.rs re-exports.
pub use node::{BlockchainInfo, BroadcastRejection, NodeAdapter, TxVerification};
pub use random::RandomSource;
pub use time::TimeProvider;
pub use validator::{AcceptAll, MessageValidator};

// Re-export default implementations
pub use time::SystemTimeProvider;
