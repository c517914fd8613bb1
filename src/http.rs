//! HTTP seam used by every fetcher and by the proxy pool.
//!
//! [`HttpClient`] is the narrow interface the rest of the crate talks to; the
//! production implementation wraps one shared `reqwest::Client` carrying a
//! browser-like header set. Tests substitute in-memory stubs.

use reqwest::header::{self, HeaderMap, HeaderValue};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::IngestError;

/// Timeout for direct feed and channel page requests.
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Status code and body of a completed request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body of a 2xx response, or a [`IngestError::Status`] error.
    pub fn into_success_body(self) -> Result<String, IngestError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(IngestError::Status(self.status))
        }
    }
}

/// Trait for issuing a GET request with a per-request timeout.
///
/// Implementors report transport failures as errors and any completed
/// exchange, whatever its status, as an [`HttpResponse`].
pub trait HttpClient {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, IngestError>;
}

/// [`HttpClient`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    /// Build the shared client with a realistic browser header set.
    pub fn new() -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
            ),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,application/rss+xml,*/*;q=0.8",
            ),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let inner = reqwest::Client::builder()
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(4)
            .build()?;
        Ok(Self { inner })
    }
}

impl HttpClient for ReqwestClient {
    #[instrument(level = "debug", skip(self))]
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, IngestError> {
        let resp = self.inner.get(url).timeout(timeout).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        debug!(status, bytes = body.len(), "GET completed");
        Ok(HttpResponse { status, body })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_range() {
        let ok = HttpResponse { status: 204, body: String::new() };
        let bad = HttpResponse { status: 503, body: "down".to_string() };
        assert!(ok.is_success());
        assert!(!bad.is_success());
        assert!(matches!(bad.into_success_body(), Err(IngestError::Status(503))));
    }

    #[test]
    fn test_client_builds() {
        assert!(ReqwestClient::new().is_ok());
    }
}
