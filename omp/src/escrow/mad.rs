use super::{output_types, OutputTypes};
use crate::config::{BondFormula, EscrowPolicy};
use crate::error::{OmpError, OmpResult};
use crate::marketplace::{Cryptocurrency, EscrowType, ListingAddAction};

/// Amounts owed to each party by a settlement transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    pub buyer: u64,
    pub seller: u64,
}

/// Economic terms of one trade, derived from the listing, the buyer's
/// currency and shipping country, and the local escrow policy.
///
/// Both parties derive these independently; every amount in every template
/// comes from here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowTerms {
    pub escrow_type: EscrowType,
    pub currency: Cryptocurrency,
    pub base_price: u64,
    pub shipping: u64,
    pub buyer_bond: u64,
    pub seller_bond: u64,
    pub output_types: OutputTypes,
    /// Seconds between chain median time at accept and destroy unlock.
    pub lock_secs: u64,
}

impl EscrowTerms {
    pub fn derive(
        listing: &ListingAddAction,
        currency: Cryptocurrency,
        shipping_country: &str,
        policy: &EscrowPolicy,
    ) -> OmpResult<Self> {
        let config = listing.escrow();
        let output_types = output_types(config, currency)?;

        let option = listing.payment_option(currency).ok_or_else(|| {
            OmpError::InvalidBid(format!("listing has no payment option for {currency}"))
        })?;
        if !listing.ships_to(shipping_country) {
            return Err(OmpError::InvalidBid(format!(
                "listing does not ship to '{shipping_country}'"
            )));
        }
        let base_price = option.base_price;
        let shipping = listing.shipping_price_for(option, shipping_country);

        let basis = match policy.bond_formula {
            BondFormula::PercentOfBasePrice => base_price,
            BondFormula::PercentOfTotal => base_price
                .checked_add(shipping)
                .ok_or_else(|| OmpError::InvalidListing("price plus shipping overflows".into()))?,
        };
        let buyer_bond = bond(basis, config.ratio.buyer, "buyer")?;
        let seller_bond = bond(basis, config.ratio.seller, "seller")?;

        let lock_secs = match config.seconds_to_lock {
            Some(0) => {
                return Err(OmpError::InvalidListing(
                    "secondsToLock must be positive".into(),
                ))
            }
            Some(secs) => secs,
            None => policy.destroy_lock_secs,
        };

        let terms = Self {
            escrow_type: config.escrow_type,
            currency,
            base_price,
            shipping,
            buyer_bond,
            seller_bond,
            output_types,
            lock_secs,
        };
        let total = terms.total()?;
        if total > currency.max_supply() {
            return Err(OmpError::InvalidListing(format!(
                "escrow total {total} exceeds the maximum supply of {currency}"
            )));
        }
        Ok(terms)
    }

    /// Price plus shipping.
    fn purchase(&self) -> OmpResult<u64> {
        self.base_price
            .checked_add(self.shipping)
            .ok_or_else(overflow)
    }

    /// What the buyer locks: price, shipping and the buyer bond.
    pub fn buyer_contribution(&self) -> OmpResult<u64> {
        self.purchase()?
            .checked_add(self.buyer_bond)
            .ok_or_else(overflow)
    }

    /// What the seller locks: the seller bond.
    pub const fn seller_contribution(&self) -> u64 {
        self.seller_bond
    }

    /// Value of the escrow output.
    pub fn total(&self) -> OmpResult<u64> {
        self.buyer_contribution()?
            .checked_add(self.seller_contribution())
            .ok_or_else(overflow)
    }

    /// Buyer gets the bond back, seller gets price, shipping and bond.
    pub fn release_split(&self, fee: u64) -> OmpResult<Split> {
        let seller = self
            .purchase()?
            .checked_add(self.seller_bond)
            .ok_or_else(overflow)?;
        take_fee(self.buyer_bond, seller, fee)
    }

    /// Buyer gets everything they locked, seller gets the bond back.
    pub fn refund_split(&self, fee: u64) -> OmpResult<Split> {
        take_fee(self.buyer_contribution()?, self.seller_bond, fee)
    }

    /// Amount burned by the destroy transaction.
    pub fn destroy_amount(&self, fee: u64) -> OmpResult<u64> {
        self.total()?.checked_sub(fee).ok_or_else(|| {
            OmpError::TransactionBuild(format!("fee {fee} exceeds the escrowed amount"))
        })
    }

    /// Destroy unlock time for a chain at `median_time`.
    pub fn unlock_time(&self, median_time: u64) -> OmpResult<u32> {
        median_time
            .checked_add(self.lock_secs)
            .and_then(|t| u32::try_from(t).ok())
            .ok_or_else(|| {
                OmpError::TransactionBuild(format!(
                    "unlock time {median_time} + {} does not fit a lock time",
                    self.lock_secs
                ))
            })
    }
}

/// `basis * ratio / 100`, with `ratio` a whole percentage in `[0, 100]`.
fn bond(basis: u64, ratio: f64, party: &str) -> OmpResult<u64> {
    if !ratio.is_finite() || !(0.0..=100.0).contains(&ratio) || ratio.fract() != 0.0 {
        return Err(OmpError::InvalidListing(format!(
            "invalid percentages: {party} ratio {ratio}"
        )));
    }
    let scaled = u128::from(basis) * (ratio as u128);
    if scaled % 100 != 0 {
        return Err(OmpError::InvalidListing(format!(
            "{party} bond of {ratio}% of {basis} is not a whole number of minor units"
        )));
    }
    u64::try_from(scaled / 100).map_err(|_| overflow())
}

/// Deduct `fee` from the seller's share, the remainder from the buyer's.
fn take_fee(buyer: u64, seller: u64, fee: u64) -> OmpResult<Split> {
    let from_seller = fee.min(seller);
    let from_buyer = fee - from_seller;
    if from_buyer > buyer {
        return Err(OmpError::TransactionBuild(format!(
            "fee {fee} exceeds settlement value {}",
            u128::from(buyer) + u128::from(seller)
        )));
    }
    Ok(Split {
        buyer: buyer - from_buyer,
        seller: seller - from_seller,
    })
}

fn overflow() -> OmpError {
    OmpError::InvalidListing("escrow amount overflows".into())
}
