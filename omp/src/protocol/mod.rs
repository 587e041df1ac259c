//! Protocol engine: the escrow rounds, per-wallet locking and trade
//! persistence.

pub mod derivation;
pub mod engine;
pub mod store;
pub mod trade;
pub mod wallet_lock;

pub use derivation::Templates;
pub use engine::{OpenMarketProtocol, ProtocolBuilder};
pub use store::TradeStore;
pub use trade::{Trade, TradeState};
pub use wallet_lock::WalletLocks;
