//! Format validation of marketplace messages as received on the wire.
//!
//! Validators work on untyped JSON so a malformed message is reported with
//! the path of the offending field instead of a generic decode error.

mod bid;
mod escrow;
mod listing;

use serde_json::{Map, Value};

use crate::marketplace::Cryptocurrency;
use crate::traits::MessageValidator;

/// Validates listing, bid, accept and lock messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatValidator;

impl FormatValidator {
    pub const fn new() -> Self {
        Self
    }
}

impl MessageValidator for FormatValidator {
    fn validate(&self, message: &Value) -> Result<(), String> {
        let root = object(message, "message")?;
        string(field(root, "", "version")?, "version")?;
        let action = object(field(root, "", "action")?, "action")?;
        match string(field(action, "action", "type")?, "action.type")? {
            "MPA_LISTING_ADD" => listing::validate(action),
            "MPA_BID" => bid::validate(action),
            "MPA_ACCEPT" => escrow::validate_accept(action),
            "MPA_LOCK" => escrow::validate_lock(action),
            other => Err(format!("action.type: unknown action '{other}'")),
        }
    }
}

type Object = Map<String, Value>;

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn object<'a>(value: &'a Value, path: &str) -> Result<&'a Object, String> {
    value
        .as_object()
        .ok_or_else(|| format!("{path}: not an object"))
}

/// Required field; `null` counts as missing.
fn field<'a>(obj: &'a Object, parent: &str, key: &str) -> Result<&'a Value, String> {
    match obj.get(key) {
        Some(Value::Null) | None => Err(format!("{}: missing", join(parent, key))),
        Some(v) => Ok(v),
    }
}

/// Optional field; `null` counts as absent.
fn optional<'a>(obj: &'a Object, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

fn string<'a>(value: &'a Value, path: &str) -> Result<&'a str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("{path}: not a string"))
}

fn hex_string<'a>(value: &'a Value, path: &str) -> Result<&'a str, String> {
    let s = string(value, path)?;
    if s.is_empty() || hex::decode(s).is_err() {
        return Err(format!("{path}: not a hex string"));
    }
    Ok(s)
}

/// Transaction or message hash: 32 bytes of hex.
fn hash(value: &Value, path: &str) -> Result<(), String> {
    let s = hex_string(value, path)?;
    if s.len() != 64 {
        return Err(format!("{path}: not a 32-byte hash"));
    }
    Ok(())
}

fn array<'a>(value: &'a Value, path: &str) -> Result<&'a Vec<Value>, String> {
    value
        .as_array()
        .ok_or_else(|| format!("{path}: not an array"))
}

/// Array with at least one element. An empty one is reported the same way
/// as a missing one.
fn non_empty_array<'a>(value: &'a Value, path: &str) -> Result<&'a Vec<Value>, String> {
    match value.as_array() {
        Some(items) if !items.is_empty() => Ok(items),
        _ => Err(format!("{path}: not an array")),
    }
}

fn string_array(value: &Value, path: &str) -> Result<(), String> {
    for (i, item) in array(value, path)?.iter().enumerate() {
        string(item, &format!("{path}[{i}]"))?;
    }
    Ok(())
}

fn one_of<'a>(value: &'a Value, path: &str, allowed: &[&str]) -> Result<&'a str, String> {
    let s = string(value, path)?;
    if allowed.contains(&s) {
        Ok(s)
    } else {
        Err(format!("{path}: '{s}' is not one of {}", allowed.join(", ")))
    }
}

fn integer(value: &Value, path: &str) -> Result<u64, String> {
    value
        .as_u64()
        .ok_or_else(|| format!("{path}: not a non-negative integer"))
}

/// Amount in minor units: a non-negative integer no larger than the
/// currency's supply.
fn amount(value: &Value, path: &str, what: &str, currency: Option<Cryptocurrency>) -> Result<u64, String> {
    let limit = currency.unwrap_or(Cryptocurrency::Part).max_supply();
    match value.as_u64() {
        Some(v) if v <= limit => Ok(v),
        _ => Err(format!("{path}: faulty {what} (< 0, fractional or overflow)")),
    }
}

fn currency(value: &Value, path: &str) -> Result<Cryptocurrency, String> {
    serde_json::from_value(value.clone()).map_err(|_| format!("{path}: unknown currency {value}"))
}

const OUTPUT_TYPES: &[&str] = &["PART", "BLIND", "ANON"];
const ESCROW_TYPES: &[&str] = &["MAD", "MAD_CT", "MULTISIG", "FE"];

/// `{ type, ... }` locking script.
fn script(value: &Value, path: &str) -> Result<(), String> {
    let obj = object(value, path)?;
    match one_of(field(obj, path, "type")?, &join(path, "type"), &["address", "multisig", "burn"])? {
        "address" => string(field(obj, path, "address")?, &join(path, "address")).map(|_| ()),
        "multisig" => {
            let required = integer(field(obj, path, "required")?, &join(path, "required"))?;
            let keys_path = join(path, "pubkeys");
            let keys = non_empty_array(field(obj, path, "pubkeys")?, &keys_path)?;
            for (i, key) in keys.iter().enumerate() {
                hex_string(key, &format!("{keys_path}[{i}]"))?;
            }
            if required == 0 || required > keys.len() as u64 {
                return Err(format!("{path}.required: {required} of {} keys", keys.len()));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn destination(value: &Value, path: &str) -> Result<(), String> {
    let obj = object(value, path)?;
    one_of(field(obj, path, "outputType")?, &join(path, "outputType"), OUTPUT_TYPES)?;
    script(field(obj, path, "script")?, &join(path, "script"))
}

/// Destination plus amount.
fn output(value: &Value, path: &str, currency: Option<Cryptocurrency>) -> Result<(), String> {
    destination(value, path)?;
    let obj = object(value, path)?;
    amount(field(obj, path, "amount")?, &join(path, "amount"), "amount", currency).map(|_| ())
}

fn prevouts(value: &Value, path: &str, currency: Option<Cryptocurrency>) -> Result<(), String> {
    for (i, input) in array(value, path)?.iter().enumerate() {
        let p = format!("{path}[{i}]");
        let obj = object(input, &p)?;
        hash(field(obj, &p, "txid")?, &join(&p, "txid"))?;
        let vout = integer(field(obj, &p, "vout")?, &join(&p, "vout"))?;
        if u32::try_from(vout).is_err() {
            return Err(format!("{p}.vout: out of range"));
        }
        output(input, &p, currency)?;
    }
    Ok(())
}

fn signatures(value: &Value, path: &str) -> Result<(), String> {
    for (i, share) in array(value, path)?.iter().enumerate() {
        let p = format!("{path}[{i}]");
        let obj = object(share, &p)?;
        integer(field(obj, &p, "input")?, &join(&p, "input"))?;
        hex_string(field(obj, &p, "pubKey")?, &join(&p, "pubKey"))?;
        hex_string(field(obj, &p, "signature")?, &join(&p, "signature"))?;
    }
    Ok(())
}

/// `{ signatures: [...] }` with at least one share.
fn signature_set(value: &Value, path: &str) -> Result<(), String> {
    let obj = object(value, path)?;
    let sigs_path = join(path, "signatures");
    let sigs = field(obj, path, "signatures")?;
    non_empty_array(sigs, &sigs_path)?;
    signatures(sigs, &sigs_path)
}
