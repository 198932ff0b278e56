//! HTTP client for the arXiv Atom API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::feed::{FeedError, parse_feed};
use super::{ApiError, Page, PageCursor, PageSource, SearchQuery, Throttle};
use crate::retry::{RetryDecision, RetryPolicy};

/// Public arXiv query endpoint.
pub const DEFAULT_BASE_URL: &str = "http://export.arxiv.org/api/query";

/// arXiv asks clients to wait three seconds between calls.
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(3);

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default User-Agent identifying this tool.
#[must_use]
pub fn default_user_agent() -> String {
    format!(
        "arxiv-crawler/{} (academic-research-tool)",
        env!("CARGO_PKG_VERSION")
    )
}

/// Connection settings for [`ArxivClient`].
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: default_user_agent(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Throttled, retrying client for the arXiv query API.
#[derive(Debug, Clone)]
pub struct ArxivClient {
    client: reqwest::Client,
    base_url: Url,
    throttle: Arc<Throttle>,
    retry_policy: RetryPolicy,
}

impl ArxivClient {
    /// Builds a client sharing `throttle` with every other API caller.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidUrl` for an unusable base URL, or
    /// `ApiError::ClientBuild` if the HTTP client cannot be created.
    pub fn new(
        config: &ApiConfig,
        throttle: Arc<Throttle>,
        retry_policy: RetryPolicy,
    ) -> Result<Self, ApiError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| ApiError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl {
                url: config.base_url.clone(),
                reason: format!("unsupported scheme '{}'", base_url.scheme()),
            });
        }

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .gzip(true)
            .build()
            .map_err(ApiError::ClientBuild)?;

        Ok(Self {
            client,
            base_url,
            throttle,
            retry_policy,
        })
    }

    fn page_url(&self, query: &SearchQuery, cursor: PageCursor, page_size: u32) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .extend_pairs(query.query_pairs(cursor.start(), page_size));
        url
    }

    /// One throttled request, no retries.
    async fn request_page(
        &self,
        query: &SearchQuery,
        cursor: PageCursor,
        page_size: u32,
    ) -> Result<Page, ApiError> {
        let url = self.page_url(query, cursor, page_size);
        let url_str = url.as_str().to_string();

        self.throttle.acquire().await;
        debug!(url = %url_str, "requesting page");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/atom+xml")
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(&url_str, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Err(ApiError::HttpStatus {
                url: url_str,
                status: status.as_u16(),
                retry_after,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::from_reqwest(&url_str, e))?;

        let feed = parse_feed(&body).map_err(|e| match e {
            FeedError::Remote(message) => ApiError::Rejected {
                url: url_str.clone(),
                message,
            },
            other => ApiError::malformed(&url_str, other.to_string()),
        })?;

        Ok(Page::from_records(
            cursor,
            page_size,
            feed.records,
            feed.total_results,
        ))
    }
}

#[async_trait]
impl PageSource for ArxivClient {
    /// Fetches a page, retrying transient failures per the retry policy.
    ///
    /// A `Retry-After` header on a failed response replaces the computed
    /// backoff when it is longer.
    #[instrument(skip(self, query, cursor), fields(start = cursor.start()))]
    async fn fetch_page(
        &self,
        query: &SearchQuery,
        cursor: PageCursor,
        page_size: u32,
    ) -> Result<Page, ApiError> {
        let mut attempt = 1;
        loop {
            match self.request_page(query, cursor, page_size).await {
                Ok(page) => return Ok(page),
                Err(error) => {
                    match self.retry_policy.should_retry(error.failure_type(), attempt) {
                        RetryDecision::Retry {
                            delay,
                            attempt: next,
                        } => {
                            let delay = error.retry_after().map_or(delay, |server| server.max(delay));
                            warn!(
                                error = %error,
                                attempt,
                                delay_ms = delay.as_millis(),
                                "API request failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                            attempt = next;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            info!(error = %error, attempt, reason = %reason, "API request failed");
                            return Err(error);
                        }
                    }
                }
            }
        }
    }
}
