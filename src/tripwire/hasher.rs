//! SP-008: BLAKE3 fingerprints for configurations and unit subtrees.

use crate::core::types::{Category, StackConfig};

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Fingerprint of the whole configuration.
pub fn hash_config(config: &StackConfig) -> String {
    hash_serialized(config)
}

/// Fingerprint of what a unit sees: its name, the category subtree, and the
/// stack-wide fields every builder receives.
pub fn hash_unit(config: &StackConfig, unit: &str, category: Category) -> String {
    let subtree = serde_json::to_string(&config.category(category)).unwrap_or_default();
    let tags = serde_json::to_string(&config.tags).unwrap_or_default();
    let mut hasher = blake3::Hasher::new();
    for part in [
        unit,
        config.name.as_str(),
        config.environment.as_str(),
        config.region.as_str(),
        subtree.as_str(),
        tags.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}

/// Short, stable identifier suffix derived from arbitrary parts.
pub fn short_id(parts: &[&str]) -> String {
    let joined = parts.join("\0");
    let hex = blake3::hash(joined.as_bytes()).to_hex();
    hex.as_str()[..12].to_string()
}

fn hash_serialized<T: serde::Serialize>(value: &T) -> String {
    // Struct fields serialize in declaration order, so the JSON is canonical
    let json = serde_json::to_string(value).unwrap_or_default();
    hash_string(&json)
}
