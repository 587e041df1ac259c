//! Message format validation abstraction.

use serde_json::Value;

/// Validates the shape and business rules of a protocol message.
///
/// Implementations report the first rule violated as a human-readable
/// reason. The engine maps a failure to the error kind of the round.
pub trait MessageValidator: Send + Sync {
    fn validate(&self, message: &Value) -> Result<(), String>;
}

/// Validator that accepts everything. Useful when messages were already
/// checked at an outer boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl MessageValidator for AcceptAll {
    fn validate(&self, _message: &Value) -> Result<(), String> {
        Ok(())
    }
}
