use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, USER_AGENT};
use reqwest::Client;
use tracing::debug;

use super::FilingSource;
use crate::error::InsiderError;
use crate::models::Config;

/// The listing rejects non-browser clients, so requests look like one
fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
        ),
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers
}

/// Fetches the latest insider purchases listing
pub struct OpenInsiderClient {
    client: Client,
    url: String,
}

impl OpenInsiderClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .default_headers(default_headers())
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            client,
            url: config.filing_source_url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl FilingSource for OpenInsiderClient {
    async fn fetch_filing_page(&self) -> Result<String> {
        debug!("Fetching filing page {}", self.url);

        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(InsiderError::Status {
                status: response.status().as_u16(),
                url: self.url.clone(),
            }
            .into());
        }

        let body = response.text().await?;
        debug!("Filing page received: {} bytes", body.len());
        Ok(body)
    }
}
