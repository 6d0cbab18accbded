//! Remote configuration fetcher
//!
//! HTTP client for the remote document, behind a trait so the cache can
//! be driven by scripted fetchers in tests.

use qm_common::config::RemoteConfig;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Fetcher errors. All of them resolve to cache fallback; none is ever
/// surfaced to the user as more than "using older data".
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error {0}")]
    Status(u16),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid document: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(String),
}

/// Source of remote configuration documents.
pub trait ConfigFetcher: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<RemoteConfig, FetchError>> + Send;
}

/// Production fetcher: plain GET, bypassing intermediate caches.
pub struct HttpConfigFetcher {
    http_client: reqwest::Client,
    url: String,
}

impl HttpConfigFetcher {
    pub fn new(url: String) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self { http_client, url })
    }
}

impl ConfigFetcher for HttpConfigFetcher {
    async fn fetch(&self) -> Result<RemoteConfig, FetchError> {
        debug!(url = %self.url, "Fetching remote config");

        let response = self
            .http_client
            .get(&self.url)
            .header("Cache-Control", "no-cache")
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .json::<RemoteConfig>()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))
    }
}
