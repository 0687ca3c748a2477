//! OAuth token lifecycle management
//!
//! Each character owns a short-lived access token and a long-lived rotating
//! refresh token. The manager renews access tokens just before expiry and
//! serializes renewal per character so a rotating refresh token is never
//! burned twice.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, RwLock};

use crate::error::{ApiError, Error, Result};

pub mod store;

pub use store::{TokenRecord, TokenState, TokenStore};

/// Safety margin before expiry at which a token is treated as expired
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Result of a refresh-token exchange against the SSO
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present when the provider rotates the refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

/// The SSO refresh exchange seam, mockable in tests
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchange a refresh token for a new access token
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// reqwest-based SSO client
pub struct SsoClient {
    http: reqwest::Client,
    token_url: String,
    /// `Basic base64(client_id:client_secret)`
    basic_credential: String,
}

impl SsoClient {
    pub fn new(token_url: &str, client_id: &str, client_secret: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let credential =
            general_purpose::STANDARD.encode(format!("{}:{}", client_id, client_secret));

        Ok(Self {
            http,
            token_url: token_url.to_string(),
            basic_credential: format!("Basic {}", credential),
        })
    }
}

#[async_trait]
impl TokenExchange for SsoClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let response = self
            .http
            .post(&self.token_url)
            .header("Authorization", &self.basic_credential)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(ApiError::from)?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST
            || status == reqwest::StatusCode::UNAUTHORIZED
        {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Auth {
                character_id: 0,
                reason: format!("SSO rejected refresh token: {} ({})", status, body),
            }
            .into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Server(format!("SSO error {}: {}", status, body)).into());
        }

        let grant = response
            .json::<TokenGrant>()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Bad token response: {}", e)))?;
        Ok(grant)
    }
}

/// Token lifecycle manager
///
/// Owns the token records exclusively. Per-character renewal is mutually
/// exclusive via a keyed lock map rather than one global lock, so unrelated
/// characters never serialize against each other.
pub struct TokenManager<X: TokenExchange> {
    exchange: X,
    store: Mutex<TokenStore>,
    refresh_locks: RwLock<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl<X: TokenExchange> TokenManager<X> {
    pub fn new(exchange: X, store: TokenStore) -> Self {
        Self {
            exchange,
            store: Mutex::new(store),
            refresh_locks: RwLock::new(HashMap::new()),
        }
    }

    /// Get a valid access token for a character, refreshing when needed.
    ///
    /// Concurrent callers during an in-flight refresh await it and reuse its
    /// result; exactly one exchange happens. A rejected refresh marks the
    /// record revoked and surfaces an auth error - callers must not retry.
    pub async fn get_valid_access_token(&self, character_id: i64) -> Result<String> {
        if let Some(token) = self.current_token_if_valid(character_id)? {
            return Ok(token);
        }

        let lock = self.refresh_lock(character_id).await;
        let _guard = lock.lock().await;

        // Re-check after acquiring the lock: another caller may have just
        // refreshed this character.
        if let Some(token) = self.current_token_if_valid(character_id)? {
            return Ok(token);
        }

        let record = self
            .load_record(character_id)?
            .ok_or_else(|| unregistered(character_id))?;

        log::info!(
            "Refreshing access token for {} ({})",
            record.character_name,
            character_id
        );

        match self.exchange.refresh(&record.refresh_token).await {
            Ok(grant) => {
                let mut renewed = record;
                renewed.access_token = grant.access_token.clone();
                renewed.expires_at = Utc::now() + ChronoDuration::seconds(grant.expires_in as i64);
                if let Some(rotated) = grant.refresh_token
                    && rotated != renewed.refresh_token
                {
                    log::info!("Refresh token rotated for character {}", character_id);
                    renewed.refresh_token = rotated;
                }

                let store = self.store.lock().expect("token store mutex poisoned");
                store.upsert(&renewed)?;
                Ok(grant.access_token)
            }
            Err(Error::Api(ApiError::Auth { reason, .. })) => {
                log::warn!(
                    "Refresh token for character {} rejected, marking revoked",
                    character_id
                );
                {
                    let store = self.store.lock().expect("token store mutex poisoned");
                    store.mark_revoked(character_id)?;
                }
                Err(ApiError::Auth {
                    character_id,
                    reason,
                }
                .into())
            }
            // Transient failures leave the record alone; the next caller
            // may succeed.
            Err(e) => Err(e),
        }
    }

    fn load_record(&self, character_id: i64) -> Result<Option<TokenRecord>> {
        let store = self.store.lock().expect("token store mutex poisoned");
        Ok(store.get(character_id)?)
    }

    /// Return the stored access token when it is still comfortably valid
    fn current_token_if_valid(&self, character_id: i64) -> Result<Option<String>> {
        let record = self
            .load_record(character_id)?
            .ok_or_else(|| unregistered(character_id))?;

        match record.state(Utc::now(), ChronoDuration::seconds(EXPIRY_MARGIN_SECS)) {
            TokenState::Authenticated => Ok(Some(record.access_token)),
            TokenState::Revoked => Err(ApiError::Auth {
                character_id,
                reason: "refresh token revoked; re-authentication required".to_string(),
            }
            .into()),
            TokenState::Expired | TokenState::Unauthenticated => Ok(None),
        }
    }

    async fn refresh_lock(&self, character_id: i64) -> Arc<AsyncMutex<()>> {
        {
            let locks = self.refresh_locks.read().await;
            if let Some(lock) = locks.get(&character_id) {
                return lock.clone();
            }
        }
        let mut locks = self.refresh_locks.write().await;
        locks
            .entry(character_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

fn unregistered(character_id: i64) -> Error {
    ApiError::Auth {
        character_id,
        reason: "character not registered".to_string(),
    }
    .into()
}
