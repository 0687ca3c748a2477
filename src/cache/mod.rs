//! Etag-validated local cache for ESI responses
//!
//! SQLite-backed storage keyed by request identity. Freshness is decided at
//! lookup time against a TTL; stale rows keep their etag so a revalidation
//! can come back as a cheap 304.

pub mod fetch;
pub mod key;
pub mod storage;

pub use fetch::CachedEsi;
pub use key::cache_key;
pub use storage::{CacheStorage, StoredEntry};
