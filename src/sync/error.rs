//! Errors returned by the sync engine.

use thiserror::Error;

use super::SyncCursor;
use crate::api::ApiError;
use crate::download::{DownloadResult, EngineError};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("API request failed: {0}")]
    Api(#[from] ApiError),

    #[error("record store failed: {0}")]
    Store(#[from] StoreError),

    #[error("download batch rejected: {0}")]
    Engine(#[from] EngineError),

    /// Downloads ran but their paths could not be recorded in the store.
    /// The files are on disk; `downloads` says which ones.
    #[error("{} download(s) finished but were not recorded: {source}", .downloads.len())]
    Unrecorded {
        downloads: Vec<DownloadResult>,
        #[source]
        source: StoreError,
    },

    /// A sync stopped partway. Everything up to `cursor` is merged; rerunning
    /// from `cursor` re-fetches the rest.
    #[error("sync interrupted after {pages_fetched} page(s): {source}")]
    Interrupted {
        pages_fetched: usize,
        cursor: SyncCursor,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    pub(crate) fn interrupted(
        pages_fetched: usize,
        cursor: SyncCursor,
        source: impl Into<SyncError>,
    ) -> Self {
        Self::Interrupted {
            pages_fetched,
            cursor,
            source: Box::new(source.into()),
        }
    }

    /// Last durable watermark, when the error interrupted a sync.
    #[must_use]
    pub fn resume_cursor(&self) -> Option<&SyncCursor> {
        match self {
            Self::Interrupted { cursor, .. } => Some(cursor),
            _ => None,
        }
    }
}
