//! Stripping of local-only fields and message fingerprints.
//!
//! Fields whose name starts with `_` hold a party's own intermediate
//! transactions. They never leave the party; everything the counterparty
//! needs travels in regular fields.

use serde_json::{Map, Value};

use super::message::{MarketAction, MarketplaceMessage};
use crate::error::OmpResult;
use crate::util::sha256;

/// Copy of `message` with every local-only field cleared.
pub fn strip(message: &MarketplaceMessage) -> MarketplaceMessage {
    let action = match &message.action {
        MarketAction::ListingAdd(a) => MarketAction::ListingAdd(a.clone()),
        MarketAction::Bid(a) => MarketAction::Bid(a.stripped()),
        MarketAction::Accept(a) => MarketAction::Accept(a.stripped()),
        MarketAction::Lock(a) => MarketAction::Lock(a.stripped()),
    };
    MarketplaceMessage {
        version: message.version.clone(),
        action,
    }
}

/// Remove every `_`-prefixed key, at any depth.
pub fn strip_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !k.starts_with('_'))
                .map(|(k, v)| (k.clone(), strip_json(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_json).collect()),
        other => other.clone(),
    }
}

/// Hex SHA-256 over the canonical JSON of the stripped message, with the
/// action's own `hash` field left out.
///
/// Object keys are emitted in sorted order, so the fingerprint does not
/// depend on how the message was produced or relayed.
pub fn hash_message(message: &MarketplaceMessage) -> OmpResult<String> {
    let mut value = serde_json::to_value(strip(message))?;
    if let Some(action) = value.get_mut("action").and_then(Value::as_object_mut) {
        action.remove("hash");
    }
    let canonical = serde_json::to_vec(&strip_json(&value))?;
    Ok(hex::encode(sha256(&canonical)))
}

/// Fingerprint of an untyped message, as received.
pub fn hash_json(value: &Value) -> OmpResult<String> {
    let mut stripped = strip_json(value);
    if let Some(action) = stripped.get_mut("action").and_then(Value::as_object_mut) {
        action.remove("hash");
    }
    Ok(hex::encode(sha256(&serde_json::to_vec(&stripped)?)))
}
