//! Detail page fetching.
//!
//! Tracker detail pages sit behind a session cookie. The fetcher sends it
//! along with a browser-like user agent, and always decodes the body as UTF-8
//! regardless of what the server declares. Non-text and blank responses count
//! as failures.

use crate::error::{Error, Result};
use crate::utils::cookie_header;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE};
use std::time::Duration;
use tracing::debug;

/// Source of detail-page text
///
/// The pipeline only needs "the page as text, or a failure": any error is
/// recorded as a fetch failure on the entry being filtered.
#[async_trait]
pub trait DetailSource: Send + Sync {
    /// Fetch the page at `url` using `cookie` for authentication
    async fn fetch(&self, url: &str, cookie: &str) -> Result<String>;
}

/// HTTP implementation of [`DetailSource`]
pub struct HttpDetailFetcher {
    http_client: reqwest::Client,
}

impl HttpDetailFetcher {
    /// Create a fetcher with a bounded per-request timeout
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl DetailSource for HttpDetailFetcher {
    async fn fetch(&self, url: &str, cookie: &str) -> Result<String> {
        let response = self
            .http_client
            .get(url)
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(COOKIE, cookie_header(cookie))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Other(format!(
                "detail page returned HTTP {}",
                status.as_u16()
            )));
        }

        if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
            let content_type = content_type.to_str().unwrap_or_default();
            if !is_text(content_type) {
                return Err(Error::Other(format!(
                    "detail page is not text: {content_type}"
                )));
            }
        }

        // Some sites declare GBK or nothing at all while serving UTF-8
        let body = response.bytes().await?;
        debug!(url, bytes = body.len(), "fetched detail page");
        let page = String::from_utf8_lossy(&body).into_owned();
        if page.trim().is_empty() {
            return Err(Error::Other("detail page is empty".into()));
        }
        Ok(page)
    }
}

fn is_text(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("text/") || mime == "application/xhtml+xml" || mime == "application/xml"
}
