//! Cache key generation using SHA-256 hashes

use sha2::{Digest, Sha256};

/// Generate a deterministic cache key from an ESI path and query parameters.
///
/// The key is a SHA-256 hash of the path and sorted parameters, so the same
/// request identity hashes identically regardless of parameter order.
pub fn cache_key(path: &str, params: &[(String, String)]) -> String {
    let mut hasher = Sha256::new();

    hasher.update(path.as_bytes());
    hasher.update(b"|");

    // Sort params for a deterministic key
    let mut sorted_params: Vec<_> = params.iter().collect();
    sorted_params.sort_by(|a, b| a.0.cmp(&b.0));

    for (k, v) in sorted_params {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b"&");
    }

    format!("{:x}", hasher.finalize())
}
