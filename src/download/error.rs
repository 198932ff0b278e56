//! Error types for the download module.
//!
//! Every variant carries the URL or path it concerns so a failed
//! [`DownloadResult`](super::DownloadResult) can be reported without extra
//! context.

use std::path::PathBuf;

use thiserror::Error;

use crate::retry::{FailureType, classify_http_status, is_tls_error, parse_retry_after};

/// Why a single PDF transfer attempt failed.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// DNS, connect or TLS trouble before a status line arrived.
    #[error("network error downloading {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The per-attempt deadline passed.
    #[error("timeout downloading {url}")]
    Timeout { url: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        url: String,
        status: u16,
        /// Raw Retry-After header, honored for 429 and 503.
        retry_after: Option<String>,
    },

    /// Creating, opening or writing the destination failed.
    #[error("IO error writing to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Bytes on disk do not match what the server announced.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        path: PathBuf,
        expected_bytes: u64,
        actual_bytes: u64,
    },

    /// The server answered with success but sent nothing.
    #[error("empty response body downloading {url}")]
    EmptyBody { url: String },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl DownloadError {
    /// Wraps a transport error, folding reqwest timeouts into [`DownloadError::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    pub fn empty_body(url: impl Into<String>) -> Self {
        Self::EmptyBody { url: url.into() }
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

/// Classifies a download error for retry decisions.
///
/// Timeouts, connection failures, 408, 5xx and truncated transfers are
/// transient; 429 is rate limited; TLS problems, local I/O failures and
/// other 4xx are permanent.
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),
        DownloadError::Timeout { .. }
        | DownloadError::Integrity { .. }
        | DownloadError::EmptyBody { .. } => FailureType::Transient,
        DownloadError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }
        DownloadError::Io { .. } | DownloadError::InvalidUrl { .. } | DownloadError::ClientBuild(_) => {
            FailureType::Permanent
        }
    }
}
