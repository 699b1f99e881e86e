//! Shared HTTP client for provider adapters
//!
//! Features:
//! - HTTP/2 with adaptive flow control, HTTP/1.1 fallback
//! - Connection pooling with keep-alive
//! - Brotli, Gzip, Deflate compression (auto-negotiated)
//! - Browser-like default headers so upstream sites serve normal pages

use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36";

const BROWSER_HEADERS: [(&str, &str); 7] = [
    ("accept", "*/*"),
    ("accept-language", "en-GB,en-US;q=0.9,en;q=0.8"),
    ("cache-control", "no-cache"),
    ("pragma", "no-cache"),
    (
        "sec-ch-ua",
        r#""Chromium";v="136", "Google Chrome";v="136", "Not.A/Brand";v="99""#,
    ),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-platform", r#""Windows""#),
];

/// Request timeout applied when a call does not set its own.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client shared by every bundled provider.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct AcceleratedClient {
    client: Client,
}

impl AcceleratedClient {
    /// Create a client with browser-like defaults.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            // Let the server negotiate HTTP/2
            .http2_adaptive_window(true)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .brotli(true)
            .gzip(true)
            .deflate(true)
            .user_agent(USER_AGENT)
            .default_headers(browser_headers())
            .connect_timeout(Duration::from_secs(10))
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .cookie_store(true)
            .build()?;

        Ok(Self { client })
    }

    /// GET `url` with extra headers and a per-request deadline.
    #[instrument(skip(self, headers), fields(url = %url))]
    pub async fn fetch(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Response> {
        let mut request = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().await?;

        debug!(
            status = %response.status(),
            version = ?response.version(),
            "Response received"
        );

        if !response.status().is_success() {
            return Err(anyhow!("HTTP {} from {url}", response.status()));
        }
        Ok(response)
    }

    /// GET `url` and decode the body as JSON.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<T> {
        let response = self.fetch(url, headers, timeout).await?;
        Ok(response.json().await?)
    }

    /// `Content-Length` reported by a HEAD request, if any.
    pub async fn content_length(&self, url: &str, timeout: Duration) -> Option<u64> {
        let response = self.client.head(url).timeout(timeout).send().await.ok()?;
        let length = response
            .headers()
            .get(CONTENT_LENGTH)?
            .to_str()
            .ok()?
            .trim()
            .parse()
            .ok();
        debug!(url, ?length, "HEAD size lookup");
        length
    }
}

fn browser_headers() -> HeaderMap {
    BROWSER_HEADERS
        .iter()
        .map(|&(name, value)| {
            (
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_headers_are_valid() {
        let headers = browser_headers();
        assert_eq!(headers.len(), BROWSER_HEADERS.len());
        assert_eq!(headers["sec-ch-ua-mobile"], "?0");
    }

    #[test]
    fn client_builds() {
        assert!(AcceleratedClient::new().is_ok());
    }
}
