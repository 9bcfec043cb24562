//! Plain HTTP fetcher — GET the page, extract by selector.

use async_trait::async_trait;

use super::ContentFetcher;
use super::extract::{extract_text, validate_selector};
use crate::error::FetchError;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Fetches pages over HTTP(S) with reqwest and extracts text with scraper.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::NotReachable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        include: &[String],
        exclude: &[String],
    ) -> Result<String, FetchError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }
        if include.is_empty() {
            return Err(FetchError::InvalidSelector {
                selector: String::new(),
                reason: "at least one include selector is required".to_string(),
            });
        }
        for selector in include.iter().chain(exclude) {
            validate_selector(selector)?;
        }

        tracing::debug!(url = %parsed, "Fetching page");
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| FetchError::NotReachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::NotReachable(format!("failed to read body: {e}")))?;

        extract_text(&html, include, exclude)
    }
}
