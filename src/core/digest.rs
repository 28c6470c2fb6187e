// SPDX-License-Identifier: MIT

//! Content hashes for audit fields (config, snapshot and gate hashes)

use serde_json::Value;

/// blake3 hex digest of the compact JSON encoding.
///
/// `serde_json` maps keep keys sorted, so equal documents hash equally
/// regardless of the key order they were parsed with.
pub fn hash_json(value: &Value) -> String {
    let encoded = serde_json::to_string(value).unwrap_or_default();
    blake3::hash(encoded.as_bytes()).to_hex().to_string()
}

/// Digest of several already-computed hashes
pub fn combine(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }
    hasher.finalize().to_hex().to_string()
}
