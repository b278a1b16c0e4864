//! Deterministic encoding used for every hash in the chain
//!
//! Values are encoded as compact JSON with object keys in lexicographic
//! order. Absent optional fields are skipped by their `serde` attributes,
//! so presence is part of each type's declared contract.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Canonical byte encoding of `value`.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    // `Value` objects are BTreeMap-backed, which sorts keys at every depth.
    let normalized = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&normalized)?)
}

/// Lowercase hex SHA-256 of the canonical encoding of `value`.
pub fn hash_hex<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let bytes = canonical_bytes(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
