//! Reports returned by the sync engine.

use serde::Serialize;

use super::SyncCursor;
use crate::download::{DownloadResult, DownloadSummary};
use crate::store::{MergeReport, PaperRecord};

/// Outcome of one incremental sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pages_fetched: usize,
    pub records_inserted: usize,
    pub records_updated: usize,
    pub records_unchanged: usize,
    /// Records dropped because they predate the starting watermark.
    pub records_skipped: usize,
    pub final_cursor: SyncCursor,
}

impl SyncReport {
    pub(crate) fn starting_at(cursor: SyncCursor) -> Self {
        Self {
            final_cursor: cursor,
            ..Self::default()
        }
    }

    pub(crate) fn absorb(&mut self, merge: &MergeReport) {
        self.records_inserted += merge.inserted;
        self.records_updated += merge.updated;
        self.records_unchanged += merge.unchanged;
    }

    #[must_use]
    pub fn records_merged(&self) -> usize {
        self.records_inserted + self.records_updated + self.records_unchanged
    }
}

/// Metadata and download outcomes of a search.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchAndFetch {
    /// Records as stored after the merge, in result order.
    pub records: Vec<PaperRecord>,
    pub merge: MergeReport,
    /// One entry per attempted download; empty when downloading was off.
    pub downloads: Vec<DownloadResult>,
}

impl SearchAndFetch {
    #[must_use]
    pub fn download_summary(&self) -> DownloadSummary {
        DownloadSummary::from_results(&self.downloads)
    }
}
