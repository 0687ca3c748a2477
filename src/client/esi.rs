//! reqwest-based ESI client implementation

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client as HttpClient, StatusCode};

use super::{EsiApi, EsiResponse};
use crate::error::{ApiError, Result};

/// Client-side ceiling on request rate. ESI enforces an error budget rather
/// than a strict request quota; staying under this keeps the sweep polite.
const RATE_LIMIT_PER_SECOND: u32 = 20;

/// Fallback pause when a 420/429 response carries no Retry-After header
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// ESI API client
pub struct EsiClient {
    http: HttpClient,
    base_url: String,
    user_agent: String,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl EsiClient {
    /// Create a new ESI client with a per-request timeout
    pub fn new(base_url: &str, user_agent: &str, request_timeout: Duration) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let quota = Quota::per_second(std::num::NonZeroU32::new(RATE_LIMIT_PER_SECOND).unwrap());
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.to_string(),
            rate_limiter,
        })
    }
}

#[async_trait]
impl EsiApi for EsiClient {
    async fn get(
        &self,
        path: &str,
        params: &[(String, String)],
        etag: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<EsiResponse> {
        // Apply rate limiting
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .get(&url)
            .query(params)
            .header("User-Agent", &self.user_agent);

        if let Some(etag) = etag {
            request = request.header("If-None-Match", etag);
        }
        if let Some(token) = access_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(ApiError::from)?;
        let status = response.status();

        match status {
            StatusCode::NOT_MODIFIED => Ok(EsiResponse::NotModified),
            status if status.is_success() => {
                let etag = response
                    .headers()
                    .get("etag")
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string());

                let body = response.bytes().await.map_err(ApiError::from)?.to_vec();

                Ok(EsiResponse::Ok {
                    status: status.as_u16(),
                    body,
                    etag,
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Auth {
                character_id: 0,
                reason: format!("ESI returned {} for {}", status, path),
            }
            .into()),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound(path.to_string()).into()),
            // ESI uses 420 for error-limit throttling alongside the usual 429
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 420 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                Err(ApiError::RateLimited {
                    retry_after: Duration::from_secs(retry_after),
                }
                .into())
            }
            status if status.is_server_error() => {
                let error_msg = response
                    .text()
                    .await
                    .unwrap_or_else(|_| format!("Server error: {}", status));
                Err(ApiError::Server(error_msg).into())
            }
            _ => {
                let error_msg = format!("Unexpected status code: {}", status);
                Err(ApiError::InvalidResponse(error_msg).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn test_client(server_url: &str) -> EsiClient {
        EsiClient::new(server_url, "evetrack-test", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_full_response_carries_etag() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/markets/10000002/orders")
            .match_query(mockito::Matcher::UrlEncoded(
                "type_id".into(),
                "34".into(),
            ))
            .with_status(200)
            .with_header("etag", "\"abc123\"")
            .with_body(r#"[{"order_id":1}]"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let response = client
            .get(
                "/markets/10000002/orders",
                &[("type_id".to_string(), "34".to_string())],
                None,
                None,
            )
            .await
            .unwrap();

        mock.assert_async().await;
        match response {
            EsiResponse::Ok { status, body, etag } => {
                assert_eq!(status, 200);
                assert_eq!(etag.as_deref(), Some("\"abc123\""));
                assert!(!body.is_empty());
            }
            EsiResponse::NotModified => panic!("expected full response"),
        }
    }

    #[tokio::test]
    async fn test_etag_sent_and_304_mapped() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/markets/prices")
            .match_header("if-none-match", "\"abc123\"")
            .with_status(304)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let response = client
            .get("/markets/prices", &[], Some("\"abc123\""), None)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response, EsiResponse::NotModified);
    }

    #[tokio::test]
    async fn test_bearer_header_attached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/characters/90000001/assets")
            .match_header("authorization", "Bearer tok-1")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = test_client(&server.url());
        client
            .get("/characters/90000001/assets", &[], None, Some("tok-1"))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_retry_after() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/markets/prices")
            .with_status(429)
            .with_header("retry-after", "7")
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client.get("/markets/prices", &[], None, None).await;

        match err {
            Err(Error::Api(ApiError::RateLimited { retry_after })) => {
                assert_eq!(retry_after, Duration::from_secs(7));
            }
            other => panic!("expected RateLimited, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_forbidden_maps_to_auth_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/characters/90000001/wallet")
            .with_status(403)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client
            .get("/characters/90000001/wallet", &[], None, Some("tok"))
            .await;

        assert!(matches!(err, Err(Error::Api(ApiError::Auth { .. }))));
    }

    #[tokio::test]
    async fn test_server_error_mapped() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/markets/prices")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client.get("/markets/prices", &[], None, None).await;

        assert!(matches!(err, Err(Error::Api(ApiError::Server(_)))));
    }
}
