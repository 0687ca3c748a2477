//! ESI API client

use async_trait::async_trait;

use crate::error::Result;

pub mod esi;
#[cfg(test)]
pub mod mock;

pub use esi::EsiClient;
#[cfg(test)]
#[allow(unused_imports)]
pub use mock::MockEsi;

/// Outcome of a conditional GET against ESI.
///
/// A tagged envelope instead of a loose map: callers pattern-match
/// full-response vs. not-modified explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EsiResponse {
    /// Full response with payload and an optional validator for the next
    /// conditional request
    Ok {
        status: u16,
        body: Vec<u8>,
        etag: Option<String>,
    },

    /// 304: the cached payload is still current
    NotModified,
}

/// ESI API client trait
///
/// The single seam between the integration engine and the network. The cache
/// layer, scanner and tests all talk to this trait.
#[async_trait]
pub trait EsiApi: Send + Sync {
    /// Perform a GET request against an ESI path.
    ///
    /// `etag` is sent as `If-None-Match` when present so the server can
    /// answer 304. `access_token` is attached as a Bearer credential for
    /// authenticated endpoints.
    async fn get(
        &self,
        path: &str,
        params: &[(String, String)],
        etag: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<EsiResponse>;
}
