//! arXiv crawler library.
//!
//! Pulls paper metadata from the arXiv API into a local `SQLite` store and
//! downloads the matching PDFs.
//!
//! # Architecture
//!
//! - [`api`] - Throttled, retrying API client and the lazy [`api::Paginator`]
//! - [`store`] - Keyed record store with field-wise merge on upsert
//! - [`download`] - Bounded-concurrency PDF downloads with resume
//! - [`sync`] - Incremental sync and search-driven fetching on top of the rest
//! - [`db`] - Database connection and migrations
//! - [`retry`] - Failure classification and backoff shared by API and downloads

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod db;
pub mod download;
pub mod retry;
pub mod store;
pub mod sync;
#[cfg(test)]
pub mod test_support;

// Re-export commonly used types
pub use api::{ApiConfig, ApiError, ArxivClient, PageSource, Paginator, SearchQuery, Throttle};
pub use db::{Database, DbError};
pub use download::{
    CancelFlag, DownloadEngine, DownloadError, DownloadResult, DownloadStatus, DownloadTask,
    EngineError, HttpClient, NamingScheme, ProgressSnapshot,
};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy};
pub use store::{LocalSearch, MergeReport, PaperRecord, RecordStore, StoreError};
pub use sync::{FetchOptions, SearchAndFetch, SyncCursor, SyncEngine, SyncError, SyncReport};
