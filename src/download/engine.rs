//! Bounded-concurrency download engine with retry and resume.
//!
//! # Concurrency Model
//!
//! - Each `submit` call owns a fair semaphore sized to its limit
//! - Permits are acquired in submission order before a task is spawned
//! - A permit is released when its task finishes (RAII)
//!
//! # Retry Behavior
//!
//! - Transient errors (network issues, 5xx, 408, 429) retry with exponential
//!   backoff; `Retry-After` extends the wait when longer
//! - Permanent errors (404, other 4xx, local I/O) fail immediately
//! - Exhausting attempts leaves the task `FailedRetryable`
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use arxiv_crawler::download::{CancelFlag, DownloadEngine, DownloadTask, HttpClient};
//! use arxiv_crawler::retry::RetryPolicy;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(
//!     HttpClient::with_defaults()?,
//!     RetryPolicy::default(),
//!     Duration::from_secs(60),
//! );
//! let tasks = vec![DownloadTask::new(
//!     "2301.00001v1",
//!     "https://arxiv.org/pdf/2301.00001v1",
//!     "./papers/2301.00001v1.pdf",
//! )];
//! let results = engine.submit(tasks, 5, |_| {}, &CancelFlag::new()).await?;
//! println!("{} results", results.len());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::constants::{DEFAULT_TASK_TIMEOUT, MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::progress::{CancelFlag, ProgressSnapshot, ProgressTracker};
use super::task::{DownloadResult, DownloadStatus, DownloadSummary, DownloadTask, TaskStateError};
use super::{DownloadError, HttpClient, TransferEvent, classify_error};
use crate::retry::{RetryDecision, RetryPolicy};

const CANCELLED_BEFORE_START: &str = "cancelled before start";

/// Errors that reject a whole `submit` call.
///
/// Individual transfer failures never surface here; they are reported per
/// task in the returned results.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency { value: usize },

    #[error("invalid task {record_id}: {reason}")]
    InvalidTask { record_id: String, reason: String },

    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Runs batches of [`DownloadTask`]s.
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    client: HttpClient,
    retry_policy: RetryPolicy,
    task_timeout: Duration,
}

impl DownloadEngine {
    /// `task_timeout` bounds each individual attempt, not the whole task.
    #[must_use]
    pub fn new(client: HttpClient, retry_policy: RetryPolicy, task_timeout: Duration) -> Self {
        Self {
            client,
            retry_policy,
            task_timeout,
        }
    }

    /// Engine with default client, policy and a 60 second attempt timeout.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the HTTP client cannot be
    /// created.
    pub fn with_defaults() -> Result<Self, DownloadError> {
        Ok(Self::new(
            HttpClient::with_defaults()?,
            RetryPolicy::default(),
            DEFAULT_TASK_TIMEOUT,
        ))
    }

    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    #[must_use]
    pub fn task_timeout(&self) -> Duration {
        self.task_timeout
    }

    /// Downloads every task with at most `concurrency_limit` transfers in
    /// flight, returning one result per task in completion order.
    ///
    /// `on_progress` is called after every state change with aggregate
    /// counters. Setting `cancel` stops new tasks from starting; tasks never
    /// started are reported as `FailedRetryable` with zero attempts.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] for a limit outside
    /// 1..=100 and [`EngineError::InvalidTask`] for an empty destination,
    /// one that is an existing directory, or one shared by two tasks.
    /// Nothing is downloaded in any of these cases.
    #[instrument(skip(self, tasks, on_progress, cancel), fields(tasks = tasks.len()))]
    pub async fn submit<F>(
        &self,
        tasks: Vec<DownloadTask>,
        concurrency_limit: usize,
        on_progress: F,
        cancel: &CancelFlag,
    ) -> Result<Vec<DownloadResult>, EngineError>
    where
        F: Fn(&ProgressSnapshot) + Send + Sync + 'static,
    {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency_limit) {
            return Err(EngineError::InvalidConcurrency {
                value: concurrency_limit,
            });
        }
        {
            let mut claimed: HashMap<&Path, &str> = HashMap::with_capacity(tasks.len());
            for task in &tasks {
                validate_destination(task).await?;
                if let Some(owner) = claimed.insert(&task.destination_path, &task.record_id) {
                    return Err(EngineError::InvalidTask {
                        record_id: task.record_id.clone(),
                        reason: format!(
                            "destination {} is also assigned to {owner}",
                            task.destination_path.display()
                        ),
                    });
                }
            }
        }

        let total = tasks.len();
        let tracker = Arc::new(ProgressTracker::new(total, on_progress));
        let semaphore = Arc::new(Semaphore::new(concurrency_limit));
        let mut results = Vec::with_capacity(total);
        let mut handles = Vec::with_capacity(total);

        info!(total, concurrency_limit, "starting download batch");

        for task in tasks {
            if cancel.is_cancelled() {
                results.push(skip(&task, &tracker));
                continue;
            }

            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            // Cancellation may have arrived while waiting for a slot.
            if cancel.is_cancelled() {
                drop(permit);
                results.push(skip(&task, &tracker));
                continue;
            }

            let fallback = (
                task.record_id.clone(),
                task.source_url.clone(),
                task.destination_path.clone(),
            );
            let client = self.client.clone();
            let policy = self.retry_policy.clone();
            let task_timeout = self.task_timeout;
            let tracker = Arc::clone(&tracker);
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                run_task(task, &client, &policy, task_timeout, &tracker, &cancel).await
            });
            handles.push((fallback, handle));
        }

        debug!(spawned = handles.len(), "waiting for downloads to complete");

        for ((record_id, source_url, path), handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(record_id = %record_id, error = %e, "download task panicked");
                    tracker.task_finished(false);
                    results.push(DownloadResult {
                        record_id,
                        source_url,
                        status: DownloadStatus::FailedPermanent,
                        bytes_written: 0,
                        attempts: 0,
                        path,
                        error: Some(format!("download task aborted: {e}")),
                    });
                }
            }
        }

        let summary = DownloadSummary::from_results(&results);
        info!(
            succeeded = summary.succeeded,
            failed_retryable = summary.failed_retryable,
            failed_permanent = summary.failed_permanent,
            bytes = summary.bytes_written,
            "download batch complete"
        );

        Ok(results)
    }
}

async fn validate_destination(task: &DownloadTask) -> Result<(), EngineError> {
    let invalid = |reason: &str| EngineError::InvalidTask {
        record_id: task.record_id.clone(),
        reason: reason.to_string(),
    };
    if task.destination_path.as_os_str().is_empty() {
        return Err(invalid("empty destination path"));
    }
    if tokio::fs::metadata(&task.destination_path)
        .await
        .is_ok_and(|meta| meta.is_dir())
    {
        return Err(invalid(&format!(
            "destination {} is a directory",
            task.destination_path.display()
        )));
    }
    Ok(())
}

fn skip(task: &DownloadTask, tracker: &ProgressTracker) -> DownloadResult {
    debug!(record_id = %task.record_id, "skipping task after cancellation");
    tracker.task_skipped();
    DownloadResult::not_started(task, CANCELLED_BEFORE_START)
}

/// Drives one task through its attempts until it reaches a terminal state.
#[instrument(
    skip(task, client, policy, task_timeout, tracker, cancel),
    fields(record_id = %task.record_id, url = %task.source_url)
)]
async fn run_task(
    mut task: DownloadTask,
    client: &HttpClient,
    policy: &RetryPolicy,
    task_timeout: Duration,
    tracker: &ProgressTracker,
    cancel: &CancelFlag,
) -> DownloadResult {
    tracker.task_started();
    // Lowest offset any attempt wrote from; the file only grows past it.
    let mut write_base = file_len(&task.destination_path).await;

    loop {
        let attempt = match task.begin_attempt() {
            Ok(attempt) => attempt,
            Err(e) => {
                warn!(error = %e, "task cannot start another attempt");
                break;
            }
        };
        debug!(attempt, "attempting download");

        let deadline = Instant::now() + task_timeout;
        let transfer = client.fetch_to_path_until(
            &task.source_url,
            &task.destination_path,
            Some(deadline),
            |event| match event {
                TransferEvent::Started { offset } => write_base = write_base.min(offset),
                TransferEvent::Chunk(len) => tracker.bytes(len),
            },
        );
        let error = match transfer.await {
            Ok(outcome) => {
                debug!(
                    attempt,
                    bytes = outcome.final_size,
                    resumed_from = outcome.resumed_from,
                    "download succeeded"
                );
                log_transition(task.succeed());
                break;
            }
            Err(error) => error,
        };

        let failure_type = classify_error(&error);
        match policy.should_retry(failure_type, attempt) {
            RetryDecision::Retry { delay, .. } if !cancel.is_cancelled() => {
                let delay = error.retry_after().map_or(delay, |server| server.max(delay));
                info!(
                    attempt,
                    max_attempts = policy.max_attempts(),
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "download failed, retrying"
                );
                log_transition(task.fail(error.to_string(), true));
                tokio::time::sleep(delay).await;
            }
            RetryDecision::Retry { .. } => {
                info!(attempt, error = %error, "download failed, not retrying after cancellation");
                log_transition(task.fail(error.to_string(), true));
                break;
            }
            RetryDecision::DoNotRetry { reason } => {
                warn!(attempt, error = %error, reason = %reason, "download failed");
                log_transition(task.fail(error.to_string(), failure_type.is_retryable()));
                break;
            }
        }
    }

    let bytes_written = file_len(&task.destination_path)
        .await
        .saturating_sub(write_base);
    tracker.task_finished(task.status() == DownloadStatus::Succeeded);
    DownloadResult::from_task(&task, bytes_written)
}

async fn file_len(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map_or(0, |meta| meta.len())
}

fn log_transition(result: Result<(), TaskStateError>) {
    if let Err(e) = result {
        warn!(error = %e, "unexpected task state");
    }
}

/// Record ids and file paths of the successful results.
#[must_use]
pub fn succeeded_paths(results: &[DownloadResult]) -> Vec<(String, PathBuf)> {
    results
        .iter()
        .filter(|r| r.is_success())
        .map(|r| (r.record_id.clone(), r.path.clone()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn engine() -> DownloadEngine {
        let policy = RetryPolicy::new(
            3,
            Duration::from_millis(10),
            Duration::from_millis(50),
            2.0,
        )
        .with_max_jitter(Duration::ZERO);
        DownloadEngine::new(HttpClient::with_defaults().unwrap(), policy, DEFAULT_TASK_TIMEOUT)
    }

    // ==================== Validation Tests ====================

    #[tokio::test]
    async fn test_submit_rejects_invalid_concurrency() {
        for value in [0, 101] {
            let result = engine().submit(Vec::new(), value, |_| {}, &CancelFlag::new()).await;
            assert!(matches!(
                result,
                Err(EngineError::InvalidConcurrency { value: v }) if v == value
            ));
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_directory_destination() {
        let temp_dir = TempDir::new().unwrap();
        let tasks = vec![DownloadTask::new("a", "http://localhost/a.pdf", temp_dir.path())];
        let result = engine().submit(tasks, 1, |_| {}, &CancelFlag::new()).await;
        assert!(matches!(result, Err(EngineError::InvalidTask { .. })));
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_destination() {
        let tasks = vec![DownloadTask::new("a", "http://localhost/a.pdf", "")];
        let result = engine().submit(tasks, 1, |_| {}, &CancelFlag::new()).await;
        assert!(matches!(result, Err(EngineError::InvalidTask { .. })));
    }

    #[tokio::test]
    async fn test_submit_rejects_shared_destination() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("cs.LG").join("Same_Title.pdf");
        let tasks = vec![
            DownloadTask::new("2301.00001v1", "http://localhost/v1.pdf", &dest),
            DownloadTask::new("2301.00001v2", "http://localhost/v2.pdf", &dest),
        ];
        let result = engine().submit(tasks, 2, |_| {}, &CancelFlag::new()).await;
        assert!(matches!(
            result,
            Err(EngineError::InvalidTask { record_id, reason })
                if record_id == "2301.00001v2" && reason.contains("2301.00001v1")
        ));
        assert!(!dest.exists());
    }

    // ==================== Cancellation Tests ====================

    #[tokio::test]
    async fn test_cancelled_before_start_reports_every_task() {
        let temp_dir = TempDir::new().unwrap();
        let tasks: Vec<_> = (0..3)
            .map(|i| {
                DownloadTask::new(
                    format!("2401.0000{i}v1"),
                    format!("http://localhost/{i}.pdf"),
                    temp_dir.path().join(format!("{i}.pdf")),
                )
            })
            .collect();

        let cancel = CancelFlag::new();
        cancel.cancel();
        let last = Arc::new(Mutex::new(ProgressSnapshot::default()));
        let sink = Arc::clone(&last);
        let results = engine()
            .submit(tasks, 2, move |s| *sink.lock().unwrap() = *s, &cancel)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| {
            r.status == DownloadStatus::FailedRetryable
                && r.attempts == 0
                && r.error.as_deref() == Some(CANCELLED_BEFORE_START)
        }));
        assert_eq!(last.lock().unwrap().completed_tasks, 3);
    }

    // ==================== Retry Tests ====================

    #[tokio::test]
    async fn test_transient_failure_retried_then_succeeds() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/flaky.pdf"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF"))
            .mount(&mock_server)
            .await;

        let tasks = vec![DownloadTask::new(
            "2401.00001v1",
            format!("{}/flaky.pdf", mock_server.uri()),
            temp_dir.path().join("flaky.pdf"),
        )];
        let results = engine().submit(tasks, 1, |_| {}, &CancelFlag::new()).await.unwrap();

        assert_eq!(results[0].status, DownloadStatus::Succeeded);
        assert_eq!(results[0].attempts, 2);
        assert_eq!(results[0].bytes_written, 4);
        assert_eq!(succeeded_paths(&results).len(), 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let tasks = vec![DownloadTask::new(
            "2401.00002v1",
            format!("{}/gone.pdf", mock_server.uri()),
            temp_dir.path().join("gone.pdf"),
        )];
        let results = engine().submit(tasks, 1, |_| {}, &CancelFlag::new()).await.unwrap();

        assert_eq!(results[0].status, DownloadStatus::FailedPermanent);
        assert_eq!(results[0].attempts, 1);
        assert!(results[0].error.as_deref().unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_exhausted_attempts_leave_task_retryable() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&mock_server)
            .await;

        let tasks = vec![DownloadTask::new(
            "2401.00003v1",
            format!("{}/down.pdf", mock_server.uri()),
            temp_dir.path().join("down.pdf"),
        )];
        let results = engine().submit(tasks, 1, |_| {}, &CancelFlag::new()).await.unwrap();

        assert_eq!(results[0].status, DownloadStatus::FailedRetryable);
        assert_eq!(results[0].attempts, 3);
    }
}
