//! Utility functions shared across the crate.

use crate::error::{OmpError, OmpResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Deserialize CBOR data with a size limit to prevent oversized payloads.
pub fn cbor_from_limited_reader<T: DeserializeOwned>(data: &[u8], max_bytes: usize) -> OmpResult<T> {
    if data.len() > max_bytes {
        return Err(OmpError::Serialization(format!(
            "CBOR payload too large: {} bytes (max {})",
            data.len(),
            max_bytes
        )));
    }
    ciborium::from_reader(data)
        .map_err(|e| OmpError::Serialization(format!("CBOR deserialization failed: {e}")))
}

/// Serialize a value to CBOR bytes.
pub fn cbor_to_vec<T: Serialize>(value: &T) -> OmpResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::into_writer(value, &mut buffer)
        .map_err(|e| OmpError::Serialization(format!("CBOR serialization failed: {e}")))?;
    Ok(buffer)
}

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Double SHA-256, used for transaction ids and signature hashes.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}
