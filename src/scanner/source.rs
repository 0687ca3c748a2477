//! Candidate enumeration for the market sweep
//!
//! Sources yield candidate type IDs one page at a time so the scanner never
//! materializes the whole set. A source is finite and restartable: a new
//! scan run constructs a new source.

use async_trait::async_trait;

use crate::cache::CachedEsi;
use crate::client::EsiApi;
use crate::error::{ApiError, Error, Result};

/// Lazy, paged producer of candidate resource identifiers
#[async_trait]
pub trait CandidateSource: Send {
    /// Yield the next page of candidates, or `None` when exhausted
    async fn next_page(&mut self) -> Result<Option<Vec<i64>>>;
}

/// Pages through `/markets/{region_id}/types/` via the cache.
///
/// ESI returns an empty page (or 404) past the last page; either ends the
/// enumeration.
pub struct MarketTypeSource<C: EsiApi> {
    cached: std::sync::Arc<CachedEsi<C>>,
    region_id: i64,
    ttl: std::time::Duration,
    next_page: u32,
    done: bool,
}

impl<C: EsiApi> MarketTypeSource<C> {
    pub fn new(
        cached: std::sync::Arc<CachedEsi<C>>,
        region_id: i64,
        ttl: std::time::Duration,
    ) -> Self {
        Self {
            cached,
            region_id,
            ttl,
            next_page: 1,
            done: false,
        }
    }
}

#[async_trait]
impl<C: EsiApi + 'static> CandidateSource for MarketTypeSource<C> {
    async fn next_page(&mut self) -> Result<Option<Vec<i64>>> {
        if self.done {
            return Ok(None);
        }

        let path = format!("/markets/{}/types/", self.region_id);
        let params = vec![("page".to_string(), self.next_page.to_string())];

        let payload = match self.cached.fetch_with_cache(&path, &params, self.ttl, None).await {
            Ok(payload) => payload,
            Err(Error::Api(ApiError::NotFound(_))) => {
                self.done = true;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let type_ids: Vec<i64> = serde_json::from_slice(&payload)
            .map_err(|e| ApiError::InvalidResponse(format!("Bad type listing page: {}", e)))?;

        if type_ids.is_empty() {
            self.done = true;
            return Ok(None);
        }

        self.next_page += 1;
        Ok(Some(type_ids))
    }
}

/// In-memory source for tests
#[cfg(test)]
pub struct VecSource {
    pages: std::collections::VecDeque<Vec<i64>>,
    pub pages_served: usize,
}

#[cfg(test)]
impl VecSource {
    /// One page holding all candidates
    pub fn single_page(candidates: Vec<i64>) -> Self {
        Self::pages(vec![candidates])
    }

    pub fn pages(pages: Vec<Vec<i64>>) -> Self {
        Self {
            pages: pages.into_iter().collect(),
            pages_served: 0,
        }
    }

    pub fn empty() -> Self {
        Self::pages(Vec::new())
    }
}

#[cfg(test)]
#[async_trait]
impl CandidateSource for VecSource {
    async fn next_page(&mut self) -> Result<Option<Vec<i64>>> {
        match self.pages.pop_front() {
            Some(page) => {
                self.pages_served += 1;
                Ok(Some(page))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStorage;
    use crate::client::mock::{MockBehavior, MockEsi};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn cached_mock() -> (Arc<CachedEsi<MockEsi>>, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = CacheStorage::open_at(dir.path()).unwrap();
        let cached = Arc::new(CachedEsi::new(MockEsi::new(), storage));
        (cached, dir)
    }

    #[tokio::test]
    async fn market_source_pages_until_empty() {
        let dir = TempDir::new().unwrap();
        let storage = CacheStorage::open_at(dir.path()).unwrap();
        let mock = MockEsi::new();
        mock.set_behavior(
            "/markets/10000002/types/",
            MockBehavior::Full {
                body: b"[34,35,36]".to_vec(),
                etag: None,
            },
        )
        .await;
        let cached = Arc::new(CachedEsi::new(mock, storage));

        let mut source =
            MarketTypeSource::new(cached.clone(), 10000002, Duration::from_secs(300));

        let page = source.next_page().await.unwrap().unwrap();
        assert_eq!(page, vec![34, 35, 36]);

        // Every page returns the same body here because the mock keys on
        // path only; flip to empty to end the enumeration.
        cached
            .inner()
            .set_behavior(
                "/markets/10000002/types/",
                MockBehavior::Full {
                    body: b"[]".to_vec(),
                    etag: None,
                },
            )
            .await;
        assert!(source.next_page().await.unwrap().is_none());
        // exhausted sources stay exhausted
        assert!(source.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn market_source_propagates_non_terminal_errors() {
        let (cached, _dir) = cached_mock();
        cached
            .inner()
            .set_behavior("/markets/10000002/types/", MockBehavior::AuthError)
            .await;

        let mut source =
            MarketTypeSource::new(cached.clone(), 10000002, Duration::from_secs(300));

        // auth errors propagate
        assert!(source.next_page().await.is_err());
    }

    #[tokio::test]
    async fn vec_source_serves_pages_in_order() {
        let mut source = VecSource::pages(vec![vec![1, 2], vec![3]]);
        assert_eq!(source.next_page().await.unwrap(), Some(vec![1, 2]));
        assert_eq!(source.next_page().await.unwrap(), Some(vec![3]));
        assert_eq!(source.next_page().await.unwrap(), None);
        assert_eq!(source.pages_served, 2);
    }
}
