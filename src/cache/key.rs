//! Cache key derivation.
//!
//! A key is the SHA-256 digest of the computation's identity plus its
//! arguments: equal logical calls always produce the same key, across
//! repeated calls and across process restarts. Argument pairs are sorted
//! by name and rendered as canonical JSON so insertion order and value
//! formatting cannot perturb the digest.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Prefix marking keys produced by this engine.
const KEY_PREFIX: &str = "swr";

/// Derive the cache key for a computation identity and argument set.
///
/// `function_id` names the computation (e.g. `"metadata.lookup"`); it must
/// be stable across releases for cached data to survive restarts.
///
/// # Example
///
/// ```
/// use swrcache::cache::cache_key;
///
/// let a = cache_key("metadata.lookup", &[("year", 1995.into()), ("title", "Heat".into())]);
/// let b = cache_key("metadata.lookup", &[("title", "Heat".into()), ("year", 1995.into())]);
/// assert_eq!(a, b); // argument order does not matter
/// ```
pub fn cache_key(function_id: &str, args: &[(&str, Value)]) -> String {
    let mut pairs: Vec<(&str, String)> = args
        .iter()
        .map(|(name, value)| (*name, value.to_string()))
        .collect();
    pairs.sort();

    let mut hasher = Sha256::new();
    hasher.update(function_id.as_bytes());
    for (name, value) in &pairs {
        hasher.update(b"|");
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }

    format!("{}.{}", KEY_PREFIX, hex::encode(hasher.finalize()))
}
