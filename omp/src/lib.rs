pub mod config;
pub mod error;
pub mod escrow;
pub mod marketplace;
pub mod protocol;
pub mod traits;
pub mod transaction;
pub mod util;
pub mod validation;

#[cfg(any(test, feature = "test-support"))]
pub mod mocks;

pub use config::{BondFormula, EscrowPolicy, Network, PROTOCOL_VERSION};
pub use error::{OmpError, OmpResult};
pub use escrow::{EscrowTerms, Split};
pub use marketplace::{
    hash_message, AcceptAction, BidAction, BidConfiguration, Cryptocurrency, EscrowType,
    ListingAddAction, LockAction, MarketAction, MarketplaceMessage, OutputType, Role,
};
pub use protocol::{OpenMarketProtocol, ProtocolBuilder, Trade, TradeState, TradeStore};
pub use traits::{MessageValidator, NodeAdapter, RandomSource, TimeProvider};
pub use transaction::{Prevout, RawTransaction, SignatureShare};
pub use validation::FormatValidator;
