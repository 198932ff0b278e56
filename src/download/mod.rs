//! Concurrent PDF downloads with retry, resume and progress reporting.
//!
//! # Features
//!
//! - Bounded worker pool (1 to 100 concurrent transfers)
//! - Resume of partial files via HTTP range requests
//! - Exponential backoff for transient failures, honoring `Retry-After`
//! - Aggregate progress callback and cooperative cancellation
//! - Deterministic destination naming from paper metadata

mod client;
pub mod constants;
mod engine;
mod error;
pub mod naming;
mod progress;
mod task;

pub use client::{HttpClient, TransferEvent, TransferOutcome};
pub use constants::{DEFAULT_CONCURRENCY, DEFAULT_TASK_TIMEOUT};
pub use engine::{DownloadEngine, EngineError, succeeded_paths};
pub use error::{DownloadError, classify_error};
pub use naming::{DEFAULT_FILENAME_PATTERN, NamingScheme, sanitize_filename, with_id_suffix};
pub use progress::{CancelFlag, ProgressSnapshot};
pub use task::{
    DownloadResult, DownloadStatus, DownloadSummary, DownloadTask, TaskStateError,
    retryable_tasks,
};
