//! Unspent output selection.

use super::{total_amount, Prevout};
use crate::error::{OmpError, OmpResult};

/// Pick outputs covering `target`.
///
/// Prefers the smallest single output that covers the target; otherwise
/// accumulates largest-first. Candidates are ordered by `(txid, vout)` before
/// selection so equal-valued outputs always resolve the same way.
pub fn select_outputs(candidates: &[Prevout], target: u64) -> OmpResult<Vec<Prevout>> {
    let available = total_amount(candidates).unwrap_or(u64::MAX);
    if target == 0 {
        return Err(OmpError::TransactionBuild(
            "cannot select outputs for a zero amount".into(),
        ));
    }

    let mut ordered: Vec<&Prevout> = candidates.iter().collect();
    ordered.sort_by(|a, b| (&a.txid, a.vout).cmp(&(&b.txid, b.vout)));

    if let Some(single) = ordered
        .iter()
        .filter(|p| p.amount >= target)
        .min_by_key(|p| p.amount)
    {
        return Ok(vec![(*single).clone()]);
    }

    // Stable sort keeps the (txid, vout) order among equal amounts.
    ordered.sort_by(|a, b| b.amount.cmp(&a.amount));
    let mut selected = Vec::new();
    let mut sum: u64 = 0;
    for prevout in ordered {
        sum = sum.saturating_add(prevout.amount);
        selected.push(prevout.clone());
        if sum >= target {
            return Ok(selected);
        }
    }

    Err(OmpError::InsufficientFunds {
        required: target,
        available,
    })
}
