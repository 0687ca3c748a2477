//! Backend readiness probing
//!
//! The backend exposes a readiness endpoint that answers 200 before it is
//! actually ready to serve, reporting its initialization state in the body.
//! While it boots, connection refusals, non-2xx answers, and a 200 whose
//! body is not yet `"OK"` all mean "not yet ready" - only the poll timeout
//! running out turns that into a startup failure.

use std::time::Duration;

use tokio::time::{Instant, sleep};

use crate::error::{Result, SupervisorError};

/// One probe attempt: ready on a 2xx whose body reports `"OK"`, not-ready
/// otherwise.
///
/// Connection failure is not an error here; a booting backend is expected to
/// refuse connections for a while.
pub async fn probe_once(http: &reqwest::Client, url: &str) -> bool {
    let response = match http.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            log::debug!("Health probe {} not reachable yet: {}", url, e);
            return false;
        }
    };

    let status = response.status();
    if !status.is_success() {
        log::debug!("Health probe {} returned {}", url, status);
        return false;
    }

    let body = response.text().await.unwrap_or_default();
    let ready = body_is_ok(&body);
    if !ready {
        log::debug!("Health probe {} still initializing: {}", url, body.trim());
    }
    ready
}

/// The endpoint reports `{"status": "OK"}` once ready; earlier it answers
/// 200 with a different status value. A bare `OK` body also counts.
fn body_is_ok(body: &str) -> bool {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body)
        && let Some(status) = value.get("status").and_then(|s| s.as_str())
    {
        return status == "OK";
    }
    body.trim() == "OK"
}

/// Poll the readiness endpoint until it answers OK or the timeout runs out.
pub async fn wait_until_ready(
    http: &reqwest::Client,
    url: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;

    loop {
        if probe_once(http, url).await {
            log::info!("Backend ready at {}", url);
            return Ok(());
        }

        if Instant::now() >= deadline {
            return Err(SupervisorError::StartupTimeout {
                role: "backend",
                timeout,
            }
            .into());
        }

        sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn http() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn probe_ok_on_200() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .with_body("OK")
            .create_async()
            .await;

        assert!(probe_once(&http(), &format!("{}/health", server.url())).await);
    }

    #[tokio::test]
    async fn probe_ok_on_json_status_ok() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "OK"}"#)
            .create_async()
            .await;

        assert!(probe_once(&http(), &format!("{}/health", server.url())).await);
    }

    #[tokio::test]
    async fn probe_not_ready_while_backend_still_initializing() {
        // the endpoint answers 200 before initialization finishes; only the
        // body distinguishes "up" from "ready"
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "not_ready", "init_state": "loading"}"#)
            .create_async()
            .await;

        assert!(!probe_once(&http(), &format!("{}/health", server.url())).await);
    }

    #[tokio::test]
    async fn probe_not_ready_on_500() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(500)
            .create_async()
            .await;

        assert!(!probe_once(&http(), &format!("{}/health", server.url())).await);
    }

    #[tokio::test]
    async fn probe_not_ready_when_unreachable() {
        // nothing listens on this port
        assert!(!probe_once(&http(), "http://127.0.0.1:1/health").await);
    }

    #[tokio::test]
    async fn wait_until_ready_succeeds_once_backend_comes_up() {
        let mut server = mockito::Server::new_async().await;
        // not ready twice, then ready
        server
            .mock("GET", "/health")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .with_body("OK")
            .create_async()
            .await;

        let result = wait_until_ready(
            &http(),
            &format!("{}/health", server.url()),
            Duration::from_millis(10),
            Duration::from_secs(5),
        )
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn wait_until_ready_fails_loudly_on_timeout() {
        let result = wait_until_ready(
            &http(),
            "http://127.0.0.1:1/health",
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
        .await;

        assert!(matches!(
            result,
            Err(Error::Supervisor(SupervisorError::StartupTimeout {
                role: "backend",
                ..
            }))
        ));
    }
}
