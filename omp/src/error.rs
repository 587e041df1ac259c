use crate::marketplace::{Cryptocurrency, EscrowType};

/// Domain-specific error types for the protocol engine.
///
/// Every variant is local to the round that produced it: no protocol state is
/// persisted on failure, so a round can be retried with the same inputs.
#[derive(Debug, thiserror::Error)]
pub enum OmpError {
    #[error("Invalid listing: {0}")]
    InvalidListing(String),

    #[error("Invalid bid: {0}")]
    InvalidBid(String),

    #[error("Unsupported escrow type: {0}")]
    UnsupportedEscrowType(EscrowType),

    #[error("Escrow mismatch: {0}")]
    EscrowMismatch(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Transaction build failed: {0}")]
    TransactionBuild(String),

    /// The counterparty sent something that does not match what we derive
    /// ourselves. Never retried; needs manual reconciliation.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Incomplete signature: {0}")]
    IncompleteSignature(String),

    /// A message arrived that the trade's current state cannot take.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Premature broadcast: {0}")]
    PrematureBroadcast(String),

    #[error("No node adapter configured for {0}")]
    UnknownCurrency(Cryptocurrency),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OmpError {
    /// Whether re-invoking the same round with the same inputs may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds { .. }
                | Self::TransactionBuild(_)
                | Self::PrematureBroadcast(_)
                | Self::Other(_)
        )
    }
}

impl From<serde_json::Error> for OmpError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience type alias.
pub type OmpResult<T> = Result<T, OmpError>;
