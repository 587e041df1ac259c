//! Accept and lock: the two messages carrying signature shares.

use super::{
    amount, destination, field, hash, hex_string, integer, join, non_empty_array, object,
    optional, output, prevouts, signature_set, signatures, Object,
};

pub(super) fn validate_accept(action: &Object) -> Result<(), String> {
    hash(field(action, "action", "bid")?, "action.bid")?;
    hex_string(
        field(action, "action", "releaseTxUnsigned")?,
        "action.releaseTxUnsigned",
    )?;

    let path = "action.seller";
    let seller = object(field(action, "action", "seller")?, path)?;
    hex_string(field(seller, path, "pubKey")?, &join(path, "pubKey"))?;
    prevouts(field(seller, path, "inputs")?, &join(path, "inputs"), None)?;
    if let Some(change) = optional(seller, "changeOutput") {
        output(change, &join(path, "changeOutput"), None)?;
    }
    for key in ["releaseOutput", "refundOutput"] {
        if let Some(dest) = optional(seller, key) {
            destination(dest, &join(path, key))?;
        }
    }
    amount(field(seller, path, "fee")?, &join(path, "fee"), "fee", None)?;
    amount(
        field(seller, path, "fundingFee")?,
        &join(path, "fundingFee"),
        "fundingFee",
        None,
    )?;

    let destroy_path = join(path, "destroy");
    let destroy = field(seller, path, "destroy")?;
    let unlock_path = join(&destroy_path, "unlockTime");
    let unlock = integer(
        field(object(destroy, &destroy_path)?, &destroy_path, "unlockTime")?,
        &unlock_path,
    )?;
    if unlock == 0 || u32::try_from(unlock).is_err() {
        return Err(format!("{unlock_path}: out of range"));
    }
    signature_set(destroy, &destroy_path)?;
    signature_set(field(seller, path, "release")?, &join(path, "release"))
}

pub(super) fn validate_lock(action: &Object) -> Result<(), String> {
    hash(field(action, "action", "bid")?, "action.bid")?;
    hex_string(
        field(action, "action", "releaseTxUnsigned")?,
        "action.releaseTxUnsigned",
    )?;

    let path = "action.buyer";
    let buyer = object(field(action, "action", "buyer")?, path)?;
    let funding_path = join(path, "signatures");
    let funding = field(buyer, path, "signatures")?;
    non_empty_array(funding, &funding_path)?;
    signatures(funding, &funding_path)?;
    signature_set(field(buyer, path, "destroy")?, &join(path, "destroy"))?;
    signature_set(field(buyer, path, "refund")?, &join(path, "refund"))
}
