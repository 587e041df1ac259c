pub mod accept;
pub mod bid;
pub mod codec;
pub mod listing;
pub mod lock;
pub mod message;
pub mod types;

pub use accept::{AcceptAction, DestroyTerms, SellerData, SignatureSet};
pub use bid::{BidAction, BidConfiguration, BuyerData, BuyerPayment, ShippingAddress};
pub use codec::{hash_json, hash_message, strip, strip_json};
pub use listing::{
    EscrowConfig, EscrowRatio, ListingAddAction, ListingBuilder, PaymentOption, ShippingPrice,
};
pub use lock::{BuyerSignatures, LockAction};
pub use message::{MarketAction, MarketplaceMessage};
pub use types::{Cryptocurrency, EscrowType, OutputType, Role, SaleType, COIN};
