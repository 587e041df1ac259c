//! The four escrow transactions: funding, destroy, release and refund.
//!
//! Output order is part of the protocol. Both parties build these
//! independently and compare the results byte for byte.

use super::{
    Destination, Prevout, RawTransaction, Script, TxInput, TxOutput, SEQUENCE_FINAL,
    SEQUENCE_LOCKTIME,
};
use crate::error::{OmpError, OmpResult};
use crate::marketplace::OutputType;

/// Index of the 2-of-2 escrow output in the funding transaction.
pub const ESCROW_VOUT: u32 = 0;

/// Inputs and outputs of the bid-funding transaction.
#[derive(Debug, Clone)]
pub struct FundingTerms<'a> {
    pub buyer_inputs: &'a [Prevout],
    pub seller_inputs: &'a [Prevout],
    pub escrow: TxOutput,
    pub buyer_change: Option<&'a TxOutput>,
    pub seller_change: Option<&'a TxOutput>,
}

/// Funding transaction: buyer inputs then seller inputs;
/// outputs `[escrow, buyer change, seller change]`, absent change omitted.
pub fn funding(terms: &FundingTerms<'_>) -> OmpResult<RawTransaction> {
    if !matches!(terms.escrow.script, Script::Multisig { .. }) {
        return Err(OmpError::TransactionBuild(
            "escrow output must be a multisig".into(),
        ));
    }
    let mut tx = RawTransaction::new(0);
    for prevout in terms.buyer_inputs.iter().chain(terms.seller_inputs) {
        tx.inputs
            .push(TxInput::new(prevout.txid.clone(), prevout.vout, SEQUENCE_FINAL));
    }
    tx.outputs.push(terms.escrow.clone());
    for change in [terms.buyer_change, terms.seller_change].into_iter().flatten() {
        if change.amount > 0 {
            tx.outputs.push(change.clone());
        }
    }
    Ok(tx)
}

/// Prevouts spent by a funding transaction, in input order.
pub fn funding_prevouts(buyer_inputs: &[Prevout], seller_inputs: &[Prevout]) -> Vec<Prevout> {
    buyer_inputs.iter().chain(seller_inputs).cloned().collect()
}

/// The escrow output of `funding`, as a prevout for the settlement spends.
pub fn escrow_prevout(funding: &RawTransaction) -> OmpResult<Prevout> {
    let output = funding
        .outputs
        .get(ESCROW_VOUT as usize)
        .ok_or_else(|| OmpError::TransactionBuild("funding transaction has no outputs".into()))?;
    Ok(Prevout {
        txid: funding.txid()?,
        vout: ESCROW_VOUT,
        amount: output.amount,
        output_type: output.output_type,
        script: output.script.clone(),
    })
}

/// Destroy transaction: burns `burn_amount` of the escrow, spendable only once
/// chain median time reaches `unlock_time`.
pub fn destroy(escrow: &Prevout, burn_amount: u64, unlock_time: u32) -> OmpResult<RawTransaction> {
    if unlock_time == 0 {
        return Err(OmpError::TransactionBuild(
            "destroy transaction needs a lock time".into(),
        ));
    }
    let mut tx = RawTransaction::new(unlock_time);
    tx.inputs.push(TxInput::new(
        escrow.txid.clone(),
        escrow.vout,
        SEQUENCE_LOCKTIME,
    ));
    tx.outputs.push(TxOutput {
        output_type: OutputType::Part,
        amount: burn_amount,
        script: Script::Burn,
    });
    Ok(tx)
}

/// Release or refund transaction: one output per `(destination, amount)` pair,
/// in the given order, zero amounts omitted.
pub fn settlement(
    escrow: &Prevout,
    payouts: &[(Option<&Destination>, u64)],
) -> OmpResult<RawTransaction> {
    let mut tx = RawTransaction::new(0);
    tx.inputs
        .push(TxInput::new(escrow.txid.clone(), escrow.vout, SEQUENCE_FINAL));
    for (index, (destination, amount)) in payouts.iter().enumerate() {
        if *amount == 0 {
            continue;
        }
        let destination = destination.ok_or_else(|| {
            OmpError::TransactionBuild(format!(
                "settlement output {index} has an amount but no destination"
            ))
        })?;
        tx.outputs.push(destination.with_amount(*amount));
    }
    if tx.outputs.is_empty() {
        return Err(OmpError::TransactionBuild(
            "settlement transaction pays nothing".into(),
        ));
    }
    Ok(tx)
}
