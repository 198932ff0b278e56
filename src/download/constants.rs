//! Constants for the download module (timeouts, concurrency bounds).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default upper bound for a single transfer attempt.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of simultaneous transfers.
pub const DEFAULT_CONCURRENCY: usize = 5;

pub const MIN_CONCURRENCY: usize = 1;

pub const MAX_CONCURRENCY: usize = 100;
