//! Progress bar for download batches.

use std::sync::Arc;
use std::time::Duration;

use arxiv_crawler::ProgressSnapshot;
use arxiv_crawler::sync::ProgressFn;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

/// Progress bar driven by engine snapshots.
///
/// A hidden bar is used when `enabled` is false, so callers never branch.
pub(crate) struct DownloadProgress {
    bar: ProgressBar,
}

impl DownloadProgress {
    pub(crate) fn new(enabled: bool) -> Self {
        let bar = if enabled {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner} [{bar:30}] {pos}/{len} papers {msg} ({elapsed})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
            );
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    /// Callback for [`arxiv_crawler::FetchOptions::with_progress`].
    pub(crate) fn callback(&self) -> ProgressFn {
        let bar = self.bar.clone();
        Arc::new(move |snapshot: &ProgressSnapshot| {
            bar.set_length(snapshot.total_tasks as u64);
            bar.set_position(snapshot.completed_tasks as u64);
            bar.set_message(status_message(snapshot));
        })
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn status_message(snapshot: &ProgressSnapshot) -> String {
    let mut message = format!(
        "{} active, {}",
        snapshot.in_progress,
        HumanBytes(snapshot.bytes_transferred)
    );
    if snapshot.failed > 0 {
        message.push_str(&format!(", {} failed", snapshot.failed));
    }
    message
}
