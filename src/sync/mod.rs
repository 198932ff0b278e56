//! Incremental synchronization and search-driven fetching.
//!
//! [`SyncEngine`] is the only writer of the record store: it pulls pages
//! through the paginator, merges them, advances the [`SyncCursor`] after
//! each durable merge, and hands PDFs to the download engine.

mod cursor;
mod engine;
mod error;
mod report;

pub use cursor::SyncCursor;
pub use engine::{DEFAULT_PAGE_SIZE, FetchOptions, ProgressFn, SyncEngine};
pub use error::SyncError;
pub use report::{SearchAndFetch, SyncReport};
