//! Hashing System - SHA-256 Fingerprints
//!
//! Structural fingerprints for artifacts and review passes. Two values with
//! the same fingerprint are structurally equal regardless of key order.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::artifact::{Artifact, SlotKey};
use crate::overrides::Override;

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    hex_encode(&Sha256::digest(data))
}

/// Serialize with object keys ordered at every depth and no whitespace, so
/// field order in the producer's payload never changes a fingerprint.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let ordered = order_keys(serde_json::to_value(value)?);
    serde_json::to_string(&ordered)
}

fn order_keys(value: Value) -> Value {
    match value {
        Value::Object(fields) => {
            let tree: BTreeMap<String, Value> = fields
                .into_iter()
                .map(|(name, field)| (name, order_keys(field)))
                .collect();
            Value::Object(tree.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(order_keys).collect()),
        scalar => scalar,
    }
}

/// Fingerprint of an artifact's full structure
pub fn artifact_fingerprint(artifact: &Artifact) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(canonical_json(artifact)?.as_bytes()))
}

/// Identity of one review pass: target slot, accepted overrides, the input
/// artifact's fingerprint and the engine version.
pub fn compute_review_hash(
    key: &SlotKey,
    overrides: &[Override],
    input_fingerprint: &str,
    engine_version: &str,
) -> Result<String, serde_json::Error> {
    let combined = format!(
        "{}:{}:{}:{}",
        key,
        canonical_json(&overrides)?,
        input_fingerprint,
        engine_version
    );
    Ok(sha256_hex(combined.as_bytes()))
}

fn hex_encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}
