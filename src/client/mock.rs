//! Mock ESI client for testing
//!
//! Programmable responses keyed by path, with call counting and captured
//! conditional-request etags for assertions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{EsiApi, EsiResponse};
use crate::error::{ApiError, Error, Result};

/// Canned behavior for a single path
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return a full response with this body and etag
    Full {
        body: Vec<u8>,
        etag: Option<String>,
    },
    /// Return 304
    NotModified,
    /// Fail with a network error
    NetworkError,
    /// Fail with an auth error
    AuthError,
    /// Fail with a rate-limit error carrying this retry-after
    RateLimited(Duration),
}

/// A captured request for test assertions
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub path: String,
    pub etag: Option<String>,
    pub access_token: Option<String>,
}

/// Mock API client for testing
pub struct MockEsi {
    behaviors: Arc<Mutex<HashMap<String, MockBehavior>>>,
    /// Behavior for any path without an explicit entry
    default: Arc<Mutex<MockBehavior>>,
    calls: Arc<Mutex<Vec<CapturedCall>>>,
}

impl Default for MockEsi {
    fn default() -> Self {
        Self {
            behaviors: Arc::new(Mutex::new(HashMap::new())),
            default: Arc::new(Mutex::new(MockBehavior::Full {
                body: b"[]".to_vec(),
                etag: None,
            })),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockEsi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the behavior for a specific path
    pub async fn set_behavior(&self, path: &str, behavior: MockBehavior) {
        self.behaviors
            .lock()
            .await
            .insert(path.to_string(), behavior);
    }

    /// Set the behavior for paths without an explicit entry
    pub async fn set_default(&self, behavior: MockBehavior) {
        *self.default.lock().await = behavior;
    }

    /// Number of calls made so far
    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    /// Calls captured so far, in order
    pub async fn calls(&self) -> Vec<CapturedCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl EsiApi for MockEsi {
    async fn get(
        &self,
        path: &str,
        _params: &[(String, String)],
        etag: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<EsiResponse> {
        self.calls.lock().await.push(CapturedCall {
            path: path.to_string(),
            etag: etag.map(|s| s.to_string()),
            access_token: access_token.map(|s| s.to_string()),
        });

        let behavior = {
            let behaviors = self.behaviors.lock().await;
            match behaviors.get(path) {
                Some(b) => b.clone(),
                None => self.default.lock().await.clone(),
            }
        };

        match behavior {
            MockBehavior::Full { body, etag } => Ok(EsiResponse::Ok {
                status: 200,
                body,
                etag,
            }),
            MockBehavior::NotModified => Ok(EsiResponse::NotModified),
            MockBehavior::NetworkError => {
                Err(Error::Api(ApiError::Network("mock network failure".to_string())))
            }
            MockBehavior::AuthError => Err(Error::Api(ApiError::Auth {
                character_id: 0,
                reason: "mock auth failure".to_string(),
            })),
            MockBehavior::RateLimited(retry_after) => {
                Err(Error::Api(ApiError::RateLimited { retry_after }))
            }
        }
    }
}
