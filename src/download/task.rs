//! Download tasks, their state machine, and per-task results.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Lifecycle of one download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Pending,
    InProgress,
    Succeeded,
    /// Failed, but a later run may succeed (transient errors, exhausted
    /// attempts, cancellation before start).
    FailedRetryable,
    /// Failed for a reason retrying will not fix.
    FailedPermanent,
}

impl DownloadStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::FailedRetryable | Self::FailedPermanent
        )
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Succeeded => "succeeded",
            Self::FailedRetryable => "failed_retryable",
            Self::FailedPermanent => "failed_permanent",
        };
        f.write_str(s)
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition for {record_id}: {from} -> {to}")]
pub struct TaskStateError {
    pub record_id: String,
    pub from: DownloadStatus,
    pub to: DownloadStatus,
}

/// One artifact to fetch for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub record_id: String,
    pub source_url: String,
    pub destination_path: PathBuf,
    attempt_count: u32,
    status: DownloadStatus,
    last_error: Option<String>,
}

impl DownloadTask {
    #[must_use]
    pub fn new(
        record_id: impl Into<String>,
        source_url: impl Into<String>,
        destination_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            source_url: source_url.into(),
            destination_path: destination_path.into(),
            attempt_count: 0,
            status: DownloadStatus::Pending,
            last_error: None,
        }
    }

    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    #[must_use]
    pub fn status(&self) -> DownloadStatus {
        self.status
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Starts another attempt. Allowed from `Pending` or `FailedRetryable`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStateError`] from any other state.
    pub fn begin_attempt(&mut self) -> Result<u32, TaskStateError> {
        match self.status {
            DownloadStatus::Pending | DownloadStatus::FailedRetryable => {
                self.status = DownloadStatus::InProgress;
                self.attempt_count += 1;
                Ok(self.attempt_count)
            }
            from => Err(self.invalid(from, DownloadStatus::InProgress)),
        }
    }

    /// Marks the running attempt as successful.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStateError`] unless the task is `InProgress`.
    pub fn succeed(&mut self) -> Result<(), TaskStateError> {
        self.finish(DownloadStatus::Succeeded)?;
        self.last_error = None;
        Ok(())
    }

    /// Marks the running attempt as failed.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStateError`] unless the task is `InProgress`.
    pub fn fail(&mut self, message: impl Into<String>, retryable: bool) -> Result<(), TaskStateError> {
        let to = if retryable {
            DownloadStatus::FailedRetryable
        } else {
            DownloadStatus::FailedPermanent
        };
        self.finish(to)?;
        self.last_error = Some(message.into());
        Ok(())
    }

    fn finish(&mut self, to: DownloadStatus) -> Result<(), TaskStateError> {
        if self.status != DownloadStatus::InProgress {
            return Err(self.invalid(self.status, to));
        }
        self.status = to;
        Ok(())
    }

    fn invalid(&self, from: DownloadStatus, to: DownloadStatus) -> TaskStateError {
        TaskStateError {
            record_id: self.record_id.clone(),
            from,
            to,
        }
    }
}

/// Final outcome of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadResult {
    pub record_id: String,
    pub source_url: String,
    pub status: DownloadStatus,
    pub bytes_written: u64,
    pub attempts: u32,
    pub path: PathBuf,
    pub error: Option<String>,
}

impl DownloadResult {
    pub(crate) fn from_task(task: &DownloadTask, bytes_written: u64) -> Self {
        Self {
            record_id: task.record_id.clone(),
            source_url: task.source_url.clone(),
            status: task.status,
            bytes_written,
            attempts: task.attempt_count,
            path: task.destination_path.clone(),
            error: task.last_error.clone(),
        }
    }

    /// Result for a task that never started (cancelled before dispatch).
    pub(crate) fn not_started(task: &DownloadTask, reason: &str) -> Self {
        Self {
            record_id: task.record_id.clone(),
            source_url: task.source_url.clone(),
            status: DownloadStatus::FailedRetryable,
            bytes_written: 0,
            attempts: 0,
            path: task.destination_path.clone(),
            error: Some(reason.to_string()),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == DownloadStatus::Succeeded
    }
}

/// Counts over a batch of results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    pub succeeded: usize,
    pub failed_retryable: usize,
    pub failed_permanent: usize,
    pub bytes_written: u64,
}

impl DownloadSummary {
    #[must_use]
    pub fn from_results(results: &[DownloadResult]) -> Self {
        results.iter().fold(Self::default(), |mut summary, result| {
            match result.status {
                DownloadStatus::Succeeded => summary.succeeded += 1,
                DownloadStatus::FailedPermanent => summary.failed_permanent += 1,
                _ => summary.failed_retryable += 1,
            }
            summary.bytes_written += result.bytes_written;
            summary
        })
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed_retryable + self.failed_permanent
    }
}

/// Fresh tasks for every result worth submitting again.
#[must_use]
pub fn retryable_tasks(results: &[DownloadResult]) -> Vec<DownloadTask> {
    results
        .iter()
        .filter(|r| r.status == DownloadStatus::FailedRetryable)
        .map(|r| DownloadTask::new(&r.record_id, &r.source_url, &r.path))
        .collect()
}
