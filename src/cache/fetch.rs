//! Cached wrapper over the ESI client
//!
//! `fetch_with_cache` is the single entry point for API data: a fresh row
//! short-circuits the network entirely, a stale row is revalidated with its
//! etag, and a miss is a full fetch. Failures propagate and leave any stale
//! row untouched; serving stale data is the caller's decision.

use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cache::{CacheStorage, cache_key};
use crate::client::{EsiApi, EsiResponse};
use crate::error::{ApiError, Result};

/// Cached ESI client.
///
/// The storage sits behind a `Mutex` because rusqlite connections are not
/// `Sync`; all scanner workers and foreground callers share one handle.
/// Concurrent fetches for the same key may race - last writer wins, which is
/// fine because payloads are idempotent snapshots of remote state.
pub struct CachedEsi<C: EsiApi> {
    inner: Arc<C>,
    storage: Mutex<CacheStorage>,
}

impl<C: EsiApi> CachedEsi<C> {
    pub fn new(inner: C, storage: CacheStorage) -> Self {
        Self {
            inner: Arc::new(inner),
            storage: Mutex::new(storage),
        }
    }

    /// Fetch a path through the cache.
    ///
    /// Returns the payload bytes. Exactly zero network calls happen when a
    /// fresh entry exists, exactly one otherwise.
    pub async fn fetch_with_cache(
        &self,
        path: &str,
        params: &[(String, String)],
        ttl: Duration,
        access_token: Option<&str>,
    ) -> Result<Vec<u8>> {
        let key = cache_key(path, params);

        // Local read only; never blocks on the network
        let prior = {
            let storage = self.storage.lock().expect("cache mutex poisoned");
            storage.get(&key)?
        };

        if let Some(ref entry) = prior
            && entry.is_fresh(ttl, Utc::now())
        {
            log::debug!("Cache hit: {} ({})", path, entry.status);
            return Ok(entry.payload.clone());
        }

        // A row without an etag cannot be revalidated; it is always a full
        // fetch.
        let etag = prior.as_ref().and_then(|e| e.etag.as_deref());

        let response = self.inner.get(path, params, etag, access_token).await?;

        let now = Utc::now();
        match response {
            EsiResponse::NotModified => {
                log::debug!("Revalidated (304): {}", path);
                let entry = prior.ok_or_else(|| {
                    ApiError::InvalidResponse(format!(
                        "304 for {} without a cached entry to revalidate",
                        path
                    ))
                })?;
                let storage = self.storage.lock().expect("cache mutex poisoned");
                storage.touch(&key, now)?;
                Ok(entry.payload)
            }
            EsiResponse::Ok { status, body, etag } => {
                log::debug!("Cache fill: {} ({} bytes)", path, body.len());
                let storage = self.storage.lock().expect("cache mutex poisoned");
                storage.upsert(&key, path, &body, etag.as_deref(), status, now)?;
                Ok(body)
            }
        }
    }

    /// Get the inner client (for test assertions on call counts)
    #[allow(dead_code)]
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{MockBehavior, MockEsi};
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(300);

    fn cached(mock: MockEsi) -> (CachedEsi<MockEsi>, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = CacheStorage::open_at(dir.path()).unwrap();
        (CachedEsi::new(mock, storage), dir)
    }

    #[tokio::test]
    async fn fresh_entry_issues_zero_network_calls() {
        let mock = MockEsi::new();
        mock.set_behavior(
            "/markets/prices",
            MockBehavior::Full {
                body: b"[1]".to_vec(),
                etag: Some("\"e1\"".to_string()),
            },
        )
        .await;
        let (cached, _dir) = cached(mock);

        let first = cached
            .fetch_with_cache("/markets/prices", &[], TTL, None)
            .await
            .unwrap();
        let second = cached
            .fetch_with_cache("/markets/prices", &[], TTL, None)
            .await
            .unwrap();

        assert_eq!(first, b"[1]");
        assert_eq!(second, b"[1]");
        assert_eq!(cached.inner.call_count().await, 1);
    }

    #[tokio::test]
    async fn miss_issues_exactly_one_call() {
        let (cached, _dir) = cached(MockEsi::new());

        cached
            .fetch_with_cache("/markets/prices", &[], TTL, None)
            .await
            .unwrap();

        assert_eq!(cached.inner.call_count().await, 1);
        let calls = cached.inner.calls().await;
        // nothing cached yet, so no conditional header
        assert!(calls[0].etag.is_none());
    }

    #[tokio::test]
    async fn stale_entry_revalidates_with_etag() {
        let mock = MockEsi::new();
        mock.set_behavior(
            "/markets/prices",
            MockBehavior::Full {
                body: b"[1]".to_vec(),
                etag: Some("\"e1\"".to_string()),
            },
        )
        .await;
        let (cached, _dir) = cached(mock);

        cached
            .fetch_with_cache("/markets/prices", &[], TTL, None)
            .await
            .unwrap();

        // Zero TTL: the row is immediately stale
        cached.inner.set_behavior("/markets/prices", MockBehavior::NotModified).await;
        let payload = cached
            .fetch_with_cache("/markets/prices", &[], Duration::ZERO, None)
            .await
            .unwrap();

        assert_eq!(payload, b"[1]");
        let calls = cached.inner.calls().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].etag.as_deref(), Some("\"e1\""));
    }

    #[tokio::test]
    async fn not_modified_keeps_payload_and_advances_timestamp() {
        let mock = MockEsi::new();
        mock.set_behavior(
            "/markets/prices",
            MockBehavior::Full {
                body: b"[1]".to_vec(),
                etag: Some("\"e1\"".to_string()),
            },
        )
        .await;
        let (cached, _dir) = cached(mock);

        cached
            .fetch_with_cache("/markets/prices", &[], TTL, None)
            .await
            .unwrap();

        let key = cache_key("/markets/prices", &[]);
        let before = {
            let storage = cached.storage.lock().unwrap();
            storage.get(&key).unwrap().unwrap()
        };

        // Backdate the row so the touch visibly advances it
        {
            let storage = cached.storage.lock().unwrap();
            storage
                .upsert(
                    &key,
                    "/markets/prices",
                    &before.payload,
                    before.etag.as_deref(),
                    before.status,
                    before.fetched_at - chrono::Duration::minutes(30),
                )
                .unwrap();
        }

        cached.inner.set_behavior("/markets/prices", MockBehavior::NotModified).await;
        cached
            .fetch_with_cache("/markets/prices", &[], Duration::ZERO, None)
            .await
            .unwrap();

        let after = {
            let storage = cached.storage.lock().unwrap();
            storage.get(&key).unwrap().unwrap()
        };
        assert_eq!(after.payload, before.payload);
        assert!(after.fetched_at > before.fetched_at - chrono::Duration::minutes(30));
    }

    #[tokio::test]
    async fn no_etag_row_refetches_fully() {
        // A row that was never validated (no etag) cannot be revalidated;
        // the next request after expiry must be an unconditional full fetch.
        let mock = MockEsi::new();
        mock.set_behavior(
            "/markets/prices",
            MockBehavior::Full {
                body: b"[1]".to_vec(),
                etag: None,
            },
        )
        .await;
        let (cached, _dir) = cached(mock);

        cached
            .fetch_with_cache("/markets/prices", &[], TTL, None)
            .await
            .unwrap();
        cached
            .fetch_with_cache("/markets/prices", &[], Duration::ZERO, None)
            .await
            .unwrap();

        let calls = cached.inner.calls().await;
        assert_eq!(calls.len(), 2);
        assert!(calls[1].etag.is_none());
    }

    #[tokio::test]
    async fn fetch_failure_propagates_and_leaves_stale_row() {
        let mock = MockEsi::new();
        mock.set_behavior(
            "/markets/prices",
            MockBehavior::Full {
                body: b"[1]".to_vec(),
                etag: Some("\"e1\"".to_string()),
            },
        )
        .await;
        let (cached, _dir) = cached(mock);

        cached
            .fetch_with_cache("/markets/prices", &[], TTL, None)
            .await
            .unwrap();

        cached.inner.set_behavior("/markets/prices", MockBehavior::NetworkError).await;
        let result = cached
            .fetch_with_cache("/markets/prices", &[], Duration::ZERO, None)
            .await;
        assert!(result.is_err());

        // Stale row survives for the next caller
        let key = cache_key("/markets/prices", &[]);
        let storage = cached.storage.lock().unwrap();
        let entry = storage.get(&key).unwrap().unwrap();
        assert_eq!(entry.payload, b"[1]");
    }

    #[tokio::test]
    async fn rate_limit_propagates_with_retry_after() {
        let mock = MockEsi::new();
        mock.set_default(MockBehavior::RateLimited(Duration::from_secs(30)))
            .await;
        let (cached, _dir) = cached(mock);

        let result = cached
            .fetch_with_cache("/markets/prices", &[], TTL, None)
            .await;

        match result {
            Err(crate::error::Error::Api(crate::error::ApiError::RateLimited {
                retry_after,
            })) => assert_eq!(retry_after, Duration::from_secs(30)),
            other => panic!("expected RateLimited, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn access_token_is_forwarded() {
        let (cached, _dir) = cached(MockEsi::new());

        cached
            .fetch_with_cache("/characters/1/assets", &[], TTL, Some("tok-1"))
            .await
            .unwrap();

        let calls = cached.inner.calls().await;
        assert_eq!(calls[0].access_token.as_deref(), Some("tok-1"));
    }
}
