//! Independent re-derivation of every escrow transaction from the messages.
//!
//! Each round rebuilds the templates from the listing, the bid and the
//! seller's accept data alone. Nothing a counterparty sends is used as a
//! transaction directly; it is only compared against what we build.

use std::collections::HashSet;

use crate::config::{EscrowPolicy, MEDIAN_TIME_TOLERANCE_SECS};
use crate::error::{OmpError, OmpResult};
use crate::escrow::EscrowTerms;
use crate::marketplace::{BidAction, BuyerPayment, ListingAddAction, SellerData};
use crate::transaction::templates::{self, FundingTerms};
use crate::transaction::{total_amount, Prevout, RawTransaction, Script, TxOutput};

/// Every transaction of one trade, unsigned.
#[derive(Debug, Clone)]
pub struct Templates {
    pub funding: RawTransaction,
    /// Outputs spent by `funding`, in input order.
    pub funding_prevouts: Vec<Prevout>,
    /// The 2-of-2 output created by `funding`.
    pub escrow: Prevout,
    pub destroy: RawTransaction,
    pub release: RawTransaction,
    pub refund: RawTransaction,
}

impl Templates {
    pub fn build(terms: &EscrowTerms, buyer: &BuyerPayment, seller: &SellerData) -> OmpResult<Self> {
        let escrow_output = TxOutput {
            output_type: terms.output_types.escrow,
            amount: terms.total()?,
            script: Script::escrow(&buyer.pub_key, &seller.pub_key),
        };
        let funding = templates::funding(&FundingTerms {
            buyer_inputs: &buyer.inputs,
            seller_inputs: &seller.inputs,
            escrow: escrow_output,
            buyer_change: buyer.change_output.as_ref(),
            seller_change: seller.change_output.as_ref(),
        })?;
        let funding_prevouts = templates::funding_prevouts(&buyer.inputs, &seller.inputs);
        let escrow = templates::escrow_prevout(&funding)?;

        let destroy = templates::destroy(
            &escrow,
            terms.destroy_amount(seller.fee)?,
            seller.destroy.unlock_time,
        )?;

        let release_split = terms.release_split(seller.fee)?;
        let release = templates::settlement(
            &escrow,
            &[
                (buyer.release_output.as_ref(), release_split.buyer),
                (seller.release_output.as_ref(), release_split.seller),
            ],
        )?;

        let refund_split = terms.refund_split(seller.fee)?;
        let refund = templates::settlement(
            &escrow,
            &[
                (Some(&buyer.refund_output), refund_split.buyer),
                (seller.refund_output.as_ref(), refund_split.seller),
            ],
        )?;

        Ok(Self {
            funding,
            funding_prevouts,
            escrow,
            destroy,
            release,
            refund,
        })
    }

    pub fn escrow_prevouts(&self) -> [Prevout; 1] {
        [self.escrow.clone()]
    }
}

/// Terms of the trade `bid` proposes for `listing`.
pub fn terms_for_bid(
    listing: &ListingAddAction,
    bid: &BidAction,
    policy: &EscrowPolicy,
) -> OmpResult<EscrowTerms> {
    EscrowTerms::derive(
        listing,
        bid.payment().cryptocurrency,
        &bid.buyer.shipping_address.country,
        policy,
    )
}

/// Change owed back to a party that brings `inputs` to cover `needed`.
pub fn change_amount(inputs: &[Prevout], needed: u64) -> Option<u64> {
    total_amount(inputs)?.checked_sub(needed)
}

/// Seller-side checks of the buyer's declared amounts and output types.
pub fn check_bid(listing: &ListingAddAction, bid: &BidAction, terms: &EscrowTerms) -> OmpResult<()> {
    let payment = bid.payment();
    let invalid = |msg: String| Err(OmpError::InvalidBid(msg));

    if payment.escrow != listing.escrow().escrow_type {
        return invalid(format!(
            "bid escrow {} does not match listing escrow {}",
            payment.escrow,
            listing.escrow().escrow_type
        ));
    }
    if payment.shipping_price != terms.shipping {
        return invalid(format!(
            "shipping price {} differs from the listed {}",
            payment.shipping_price, terms.shipping
        ));
    }
    check_pubkey(&payment.pub_key).map_err(OmpError::InvalidBid)?;
    check_inputs(&payment.inputs, terms.output_types.funding, "buyer").map_err(OmpError::InvalidBid)?;

    let contribution = terms.buyer_contribution()?;
    let change = change_amount(&payment.inputs, contribution).ok_or_else(|| {
        OmpError::InvalidBid(format!("buyer inputs do not cover {contribution}"))
    })?;
    check_change(payment.change_output.as_ref(), change, terms, "buyer")
        .map_err(OmpError::InvalidBid)?;

    if payment.refund_output.output_type != terms.output_types.settlement {
        return invalid(format!(
            "refund output is {}, expected {}",
            payment.refund_output.output_type, terms.output_types.settlement
        ));
    }
    match &payment.release_output {
        Some(d) if d.output_type != terms.output_types.settlement => invalid(format!(
            "release output is {}, expected {}",
            d.output_type, terms.output_types.settlement
        )),
        None if terms.buyer_bond > 0 => invalid("bid has no release output".into()),
        _ => Ok(()),
    }
}

/// Buyer-side checks of the seller's accept data.
pub fn check_seller(
    bid: &BidAction,
    seller: &SellerData,
    terms: &EscrowTerms,
    policy: &EscrowPolicy,
    median_time: u64,
) -> OmpResult<()> {
    let violation = |msg: String| Err(OmpError::ProtocolViolation(msg));
    let payment = bid.payment();

    check_pubkey(&seller.pub_key).map_err(OmpError::ProtocolViolation)?;
    if seller.pub_key == payment.pub_key {
        return violation("seller reused the buyer's escrow key".into());
    }
    if seller.fee > policy.max_settlement_fee {
        return violation(format!(
            "settlement fee {} exceeds the accepted maximum {}",
            seller.fee, policy.max_settlement_fee
        ));
    }

    check_inputs(&seller.inputs, terms.output_types.funding, "seller")
        .map_err(OmpError::ProtocolViolation)?;
    let buyer_outpoints: HashSet<_> = payment.inputs.iter().map(Prevout::outpoint).collect();
    if let Some(p) = seller.inputs.iter().find(|p| buyer_outpoints.contains(&p.outpoint())) {
        return violation(format!("seller input {} belongs to the buyer", p.outpoint()));
    }

    let needed = terms
        .seller_contribution()
        .checked_add(seller.funding_fee)
        .ok_or_else(|| OmpError::ProtocolViolation("seller funding overflows".into()))?;
    let change = change_amount(&seller.inputs, needed).ok_or_else(|| {
        OmpError::ProtocolViolation(format!("seller inputs do not cover {needed}"))
    })?;
    check_change(seller.change_output.as_ref(), change, terms, "seller")
        .map_err(OmpError::ProtocolViolation)?;

    for (name, output) in [
        ("release", seller.release_output.as_ref()),
        ("refund", seller.refund_output.as_ref()),
    ] {
        if let Some(d) = output {
            if d.output_type != terms.output_types.settlement {
                return violation(format!(
                    "seller {name} output is {}, expected {}",
                    d.output_type, terms.output_types.settlement
                ));
            }
        }
    }

    let unlock = u64::from(seller.destroy.unlock_time);
    let expected = median_time.saturating_add(terms.lock_secs);
    if unlock <= median_time {
        return violation(format!(
            "destroy unlock time {unlock} is not after median time {median_time}"
        ));
    }
    if unlock > expected.saturating_add(MEDIAN_TIME_TOLERANCE_SECS)
        || unlock.saturating_add(MEDIAN_TIME_TOLERANCE_SECS) < expected
    {
        return violation(format!(
            "destroy unlock time {unlock} is outside the agreed window around {expected}"
        ));
    }
    Ok(())
}

/// Re-derive the templates from counterparty data, treating any failure as
/// the counterparty's fault.
pub fn templates_from_counterparty(
    terms: &EscrowTerms,
    buyer: &BuyerPayment,
    seller: &SellerData,
) -> OmpResult<Templates> {
    Templates::build(terms, buyer, seller).map_err(|e| match e {
        OmpError::TransactionBuild(msg) => OmpError::ProtocolViolation(msg),
        other => other,
    })
}

fn check_pubkey(pub_key: &str) -> Result<(), String> {
    match hex::decode(pub_key) {
        Ok(bytes) if !bytes.is_empty() => Ok(()),
        _ => Err(format!("'{pub_key}' is not a hex public key")),
    }
}

fn check_inputs(
    inputs: &[Prevout],
    expected: crate::marketplace::OutputType,
    party: &str,
) -> Result<(), String> {
    let mut seen = HashSet::new();
    for input in inputs {
        if input.output_type != expected {
            return Err(format!(
                "{party} input {} is {}, expected {expected}",
                input.outpoint(),
                input.output_type
            ));
        }
        if !matches!(input.script, Script::Address { .. }) {
            return Err(format!("{party} input {} is not single-key", input.outpoint()));
        }
        if !seen.insert(input.outpoint()) {
            return Err(format!("{party} input {} listed twice", input.outpoint()));
        }
    }
    Ok(())
}

fn check_change(
    declared: Option<&TxOutput>,
    expected: u64,
    terms: &EscrowTerms,
    party: &str,
) -> Result<(), String> {
    match declared {
        Some(out) if out.output_type != terms.output_types.funding => Err(format!(
            "{party} change is {}, expected {}",
            out.output_type, terms.output_types.funding
        )),
        Some(out) if out.amount != expected => Err(format!(
            "{party} change {} should be {expected}",
            out.amount
        )),
        None if expected > 0 => Err(format!("{party} change of {expected} has no output")),
        _ => Ok(()),
    }
}
