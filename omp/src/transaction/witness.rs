//! Assembly of signature shares into input witnesses.
//!
//! Witness shapes:
//! - single-key input: `[signature, pubkey]`
//! - multisig input: one slot per script key, in script order, empty until
//!   that key's share arrives.

use super::{Prevout, RawTransaction, Script, SignatureShare};
use crate::error::{OmpError, OmpResult};

/// Merge `shares` into the witnesses of `tx`.
///
/// `prevouts[i]` must be the output spent by input `i`. Shares for keys that
/// do not appear in the spent script are rejected; existing signatures are
/// overwritten by a share for the same key.
pub fn apply_shares(
    tx: &mut RawTransaction,
    prevouts: &[Prevout],
    shares: &[SignatureShare],
) -> OmpResult<()> {
    if prevouts.len() != tx.inputs.len() {
        return Err(OmpError::TransactionBuild(format!(
            "{} prevouts supplied for {} inputs",
            prevouts.len(),
            tx.inputs.len()
        )));
    }

    for share in shares {
        let index = share.input as usize;
        let (input, prevout) = tx
            .inputs
            .get_mut(index)
            .zip(prevouts.get(index))
            .ok_or_else(|| {
                OmpError::TransactionBuild(format!("share for missing input {index}"))
            })?;
        let signature = hex::decode(&share.signature).map_err(|e| {
            OmpError::TransactionBuild(format!("signature for input {index} is not hex: {e}"))
        })?;

        match &prevout.script {
            Script::Address { address } => {
                if *address != share.pub_key {
                    return Err(OmpError::TransactionBuild(format!(
                        "share key {} does not own input {index}",
                        share.pub_key
                    )));
                }
                let pubkey = hex::decode(&share.pub_key).map_err(|e| {
                    OmpError::TransactionBuild(format!("pubkey is not hex: {e}"))
                })?;
                input.witness = vec![signature, pubkey];
            }
            Script::Multisig { pubkeys, .. } => {
                let slot = pubkeys
                    .iter()
                    .position(|k| *k == share.pub_key)
                    .ok_or_else(|| {
                        OmpError::TransactionBuild(format!(
                            "share key {} is not part of the multisig on input {index}",
                            share.pub_key
                        ))
                    })?;
                if input.witness.len() != pubkeys.len() {
                    input.witness = vec![Vec::new(); pubkeys.len()];
                }
                input.witness[slot] = signature;
            }
            Script::Burn => {
                return Err(OmpError::TransactionBuild(format!(
                    "input {index} spends a burn output"
                )));
            }
        }
    }
    Ok(())
}

/// Decode `hex`, merge `shares`, re-encode.
pub fn combine(hex: &str, prevouts: &[Prevout], shares: &[SignatureShare]) -> OmpResult<String> {
    let mut tx = RawTransaction::from_hex(hex)?;
    apply_shares(&mut tx, prevouts, shares)?;
    tx.to_hex()
}

/// Signatures present in a multisig witness, paired with their keys.
pub fn multisig_signatures<'a>(
    witness: &'a [Vec<u8>],
    pubkeys: &'a [String],
) -> impl Iterator<Item = (&'a String, &'a Vec<u8>)> {
    pubkeys
        .iter()
        .zip(witness.iter())
        .filter(|(_, sig)| !sig.is_empty())
}
