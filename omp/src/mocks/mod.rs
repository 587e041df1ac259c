//! Mock implementations for testing.
//!
//! This module provides mock implementations of the trait abstractions
//! that allow running whole trades without a real node: a shared in-memory
//! chain, per-party node adapters over it, a controllable clock and a seeded
//! random source.

pub mod chain;
pub mod node;
pub mod random;
pub mod time;

pub use chain::{MockChain, DEFAULT_FEE_RATE};
pub use node::{MockNode, MockNodeFailure};
pub use random::MockRandom;
pub use time::MockTime;
