use anyhow::{Context, Result, anyhow};
use reqwest::blocking::{Client, Response};
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;

use crate::config::SessionCookies;

/// Blocking GET access to the feed service.
///
/// The paginator and downloader only talk to this trait, so tests can swap
/// in an in-memory fake.
pub trait Transport {
    /// GET `url` and parse the body as JSON.
    fn get_json(&self, url: &str) -> Result<Value>;

    /// GET `url` and return the raw body.
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

/// Transport backed by a blocking reqwest client carrying the session cookies.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(cookies: &SessionCookies, timeout: Option<Duration>) -> Result<Self> {
        let mut cookie = HeaderValue::from_str(&cookies.header_value())
            .context("Session credentials contain characters not allowed in a cookie")?;
        cookie.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, cookie);

        // No timeout unless configured: a hung request waits indefinitely
        let client = Client::builder()
            .user_agent(concat!("dojo-sync/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Result<Response> {
        let resp = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Request to {} failed", url))?;
        if !resp.status().is_success() {
            return Err(anyhow!("HTTP error {} for {}", resp.status(), url));
        }
        Ok(resp)
    }
}

impl Transport for HttpFetcher {
    fn get_json(&self, url: &str) -> Result<Value> {
        let bytes = self.get(url)?.bytes()?;
        let value = serde_json::from_slice(&bytes)
            .with_context(|| format!("Response from {} is not valid JSON", url))?;
        Ok(value)
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self
            .get(url)?
            .bytes()
            .with_context(|| format!("Failed to read body of {}", url))?;
        Ok(bytes.to_vec())
    }
}
