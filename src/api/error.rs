//! Error types for remote API requests.

use thiserror::Error;

use crate::retry::{FailureType, classify_http_status, is_tls_error, parse_retry_after};

/// Errors from querying the arXiv API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection-level failure (DNS, refused, reset).
    #[error("network error querying {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The request exceeded the configured timeout.
    #[error("timeout querying {url}")]
    Timeout { url: String },

    /// Non-success HTTP status.
    #[error("HTTP {status} querying {url}")]
    HttpStatus {
        url: String,
        status: u16,
        /// Raw `Retry-After` header, when the server sent one.
        retry_after: Option<String>,
    },

    /// The response body was not a usable Atom feed.
    #[error("malformed feed from {url}: {reason}")]
    MalformedFeed { url: String, reason: String },

    /// The API accepted the request but reported a query error.
    #[error("query rejected by {url}: {message}")]
    Rejected { url: String, message: String },

    /// The configured base URL is unusable.
    #[error("invalid API URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl ApiError {
    pub(crate) fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                source,
            }
        }
    }

    pub(crate) fn malformed(url: &str, reason: impl Into<String>) -> Self {
        Self::MalformedFeed {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Classifies this error for retry decisions.
    #[must_use]
    pub fn failure_type(&self) -> FailureType {
        match self {
            Self::Timeout { .. } => FailureType::Transient,
            Self::Network { source, .. } => {
                if is_tls_error(source) {
                    FailureType::Permanent
                } else {
                    FailureType::Transient
                }
            }
            Self::HttpStatus { status, .. } => classify_http_status(*status),
            Self::MalformedFeed { .. }
            | Self::Rejected { .. }
            | Self::InvalidUrl { .. }
            | Self::ClientBuild(_) => FailureType::Permanent,
        }
    }

    /// Returns true when retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.failure_type().is_retryable()
    }

    /// Server-mandated wait before retrying, parsed from `Retry-After`.
    #[must_use]
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            Self::HttpStatus {
                retry_after: Some(value),
                ..
            } => parse_retry_after(value),
            _ => None,
        }
    }
}
