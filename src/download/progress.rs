//! Aggregate progress reporting and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Point-in-time view of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub bytes_transferred: u64,
}

type ProgressCallback = dyn Fn(&ProgressSnapshot) + Send + Sync;

/// Shared counters for one `submit` call.
///
/// Every update and the callback it triggers run under one lock, so the
/// callback observes `completed_tasks` and `bytes_transferred` in
/// non-decreasing order.
pub(crate) struct ProgressTracker {
    state: Mutex<ProgressSnapshot>,
    callback: Box<ProgressCallback>,
}

impl ProgressTracker {
    pub(crate) fn new<F>(total_tasks: usize, callback: F) -> Self
    where
        F: Fn(&ProgressSnapshot) + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(ProgressSnapshot {
                total_tasks,
                ..ProgressSnapshot::default()
            }),
            callback: Box::new(callback),
        }
    }

    pub(crate) fn task_started(&self) {
        self.update(|s| s.in_progress += 1);
    }

    pub(crate) fn bytes(&self, len: u64) {
        self.update(|s| s.bytes_transferred += len);
    }

    pub(crate) fn task_finished(&self, succeeded: bool) {
        self.update(|s| {
            s.in_progress = s.in_progress.saturating_sub(1);
            s.completed_tasks += 1;
            if succeeded {
                s.succeeded += 1;
            } else {
                s.failed += 1;
            }
        });
    }

    /// Counts a task that was never started as completed and failed.
    pub(crate) fn task_skipped(&self) {
        self.update(|s| {
            s.completed_tasks += 1;
            s.failed += 1;
        });
    }

    pub(crate) fn snapshot(&self) -> ProgressSnapshot {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, apply: impl FnOnce(&mut ProgressSnapshot)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut state);
        (self.callback)(&state);
    }
}

/// Cooperative cancellation shared between a caller and the engine.
///
/// Once set, no new task is started; transfers already running finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_reports_every_update() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let tracker = ProgressTracker::new(2, move |s| sink.lock().unwrap().push(*s));

        tracker.task_started();
        tracker.bytes(10);
        tracker.task_finished(true);
        tracker.task_skipped();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0].in_progress, 1);
        assert_eq!(seen[1].bytes_transferred, 10);
        let last = seen[3];
        assert_eq!(last.completed_tasks, 2);
        assert_eq!(last.succeeded, 1);
        assert_eq!(last.failed, 1);
        assert_eq!(last.in_progress, 0);
        assert_eq!(tracker.snapshot(), last);
    }

    #[test]
    fn test_cancel_flag_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }
}
