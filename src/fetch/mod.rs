//! Content fetching: retrieve a page and extract text by CSS selector.

pub mod extract;
pub mod http;

pub use http::HttpFetcher;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::retry::{RetryPolicy, retry};
use crate::task::SelectorSet;

/// Retrieves a page and returns the text matched by the selectors.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        include: &[String],
        exclude: &[String],
    ) -> Result<String, FetchError>;
}

/// Fetch with a per-attempt timeout, retrying transient failures.
pub async fn fetch_with_retry(
    fetcher: &dyn ContentFetcher,
    url: &str,
    selectors: &SelectorSet,
    policy: RetryPolicy,
    timeout: Duration,
) -> Result<String, FetchError> {
    retry(
        policy,
        "Fetch",
        || async {
            match tokio::time::timeout(
                timeout,
                fetcher.fetch(url, &selectors.include, &selectors.exclude),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(timeout)),
            }
        },
        FetchError::is_retryable,
    )
    .await
}
