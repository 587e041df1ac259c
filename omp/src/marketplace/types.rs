use serde::{Deserialize, Serialize};

/// Minor units per whole coin.
pub const COIN: u64 = 100_000_000;

/// Currencies a payment option can be denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cryptocurrency {
    #[serde(rename = "PART")]
    Part,
    #[serde(rename = "BTC")]
    Btc,
}

impl Cryptocurrency {
    /// Largest amount representable for this currency, in minor units.
    pub const fn max_supply(&self) -> u64 {
        match self {
            Self::Part | Self::Btc => 21_000_000 * COIN,
        }
    }

    /// Whether the chain supports blinded (confidential) outputs.
    pub const fn supports_confidential(&self) -> bool {
        matches!(self, Self::Part)
    }
}

impl std::fmt::Display for Cryptocurrency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Part => write!(f, "PART"),
            Self::Btc => write!(f, "BTC"),
        }
    }
}

/// Escrow types a listing may declare.
///
/// Only the mutually-assured-destruction variants are implemented by the
/// engine; the others are recognised so they can be rejected explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowType {
    #[serde(rename = "MAD")]
    Mad,
    #[serde(rename = "MAD_CT")]
    MadCt,
    #[serde(rename = "MULTISIG")]
    Multisig,
    #[serde(rename = "FE")]
    Fe,
}

impl std::fmt::Display for EscrowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mad => write!(f, "MAD"),
            Self::MadCt => write!(f, "MAD_CT"),
            Self::Multisig => write!(f, "MULTISIG"),
            Self::Fe => write!(f, "FE"),
        }
    }
}

/// On-chain output types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputType {
    /// Transparent amount.
    #[serde(rename = "PART")]
    Part,
    /// Confidential amount (Pedersen commitment).
    #[serde(rename = "BLIND")]
    Blind,
    /// Confidential amount with ring signature inputs.
    #[serde(rename = "ANON")]
    Anon,
}

impl OutputType {
    /// Wire tag used in the raw transaction serialization.
    pub const fn tag(&self) -> u8 {
        match self {
            Self::Part => 1,
            Self::Blind => 2,
            Self::Anon => 3,
        }
    }

    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Part),
            2 => Some(Self::Blind),
            3 => Some(Self::Anon),
            _ => None,
        }
    }

    pub const fn is_confidential(&self) -> bool {
        matches!(self, Self::Blind | Self::Anon)
    }
}

impl std::fmt::Display for OutputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Part => write!(f, "PART"),
            Self::Blind => write!(f, "BLIND"),
            Self::Anon => write!(f, "ANON"),
        }
    }
}

/// Kind of sale a listing offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleType {
    #[serde(rename = "SALE")]
    Sale,
    #[serde(rename = "RENT")]
    Rent,
    #[serde(rename = "FREE")]
    Free,
}

/// Which side of the trade a party is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Buyer,
    Seller,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buyer => write!(f, "buyer"),
            Self::Seller => write!(f, "seller"),
        }
    }
}
