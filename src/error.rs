//! Error types for evetrack

use std::time::Duration;
use thiserror::Error;

/// Result type alias for evetrack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the application
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// ESI / SSO errors
///
/// `Network` is transient and retryable at the call site's discretion; the
/// cache layer never retries on its own. `Auth` is surfaced distinctly so
/// callers can prompt re-authentication instead of retrying. `RateLimited`
/// carries the server's retry-after hint for the scanner's pause stretch.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed for character {character_id}: {reason}")]
    Auth { character_id: i64, reason: String },

    #[error("Rate limited by ESI. Retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("ESI server error: {0}")]
    Server(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Network("Request timed out".to_string())
        } else if err.is_connect() {
            ApiError::Network("Failed to connect to ESI".to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Cache storage errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Could not determine home directory")]
    NoHome,
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found. Create ~/.evetrack/config.yaml first.")]
    NotFound,

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),

    #[error("ESI client credentials not configured (client_id/client_secret)")]
    MissingCredentials,
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Process supervisor errors. These are fatal: the supervisor aborts startup
/// and the program exits non-zero.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to spawn {role}: {source}")]
    Spawn {
        role: &'static str,
        source: std::io::Error,
    },

    #[error("{role} did not become ready within {timeout:?}")]
    StartupTimeout {
        role: &'static str,
        timeout: Duration,
    },

    #[error("{role} command is empty")]
    EmptyCommand { role: &'static str },
}
