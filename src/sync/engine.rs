//! Orchestration of paginated fetches, store merges and downloads.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::{SearchAndFetch, SyncCursor, SyncError, SyncReport};
use crate::api::{PageSource, Paginator, SearchQuery};
use crate::download::{
    CancelFlag, DEFAULT_CONCURRENCY, DownloadEngine, DownloadResult, DownloadTask, NamingScheme,
    ProgressSnapshot, retryable_tasks, succeeded_paths, with_id_suffix,
};
use crate::store::{MergeReport, PaperRecord, RecordStore};

/// Default page size for searches and syncs.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Shared progress callback for download batches.
pub type ProgressFn = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// How the download phase of a fetch should run.
#[derive(Clone)]
pub struct FetchOptions {
    pub concurrency: usize,
    /// When false, only metadata is fetched and stored.
    pub download: bool,
    /// Resubmit downloads that ended `FailedRetryable` once more.
    pub retry_failed: bool,
    pub cancel: CancelFlag,
    pub on_progress: Option<ProgressFn>,
}

impl FetchOptions {
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            download: true,
            retry_failed: false,
            cancel: CancelFlag::new(),
            on_progress: None,
        }
    }

    #[must_use]
    pub fn metadata_only(mut self) -> Self {
        self.download = false;
        self
    }

    #[must_use]
    pub fn retry_failed(mut self, enabled: bool) -> Self {
        self.retry_failed = enabled;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: ProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl std::fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOptions")
            .field("concurrency", &self.concurrency)
            .field("download", &self.download)
            .field("retry_failed", &self.retry_failed)
            .field("cancel", &self.cancel)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Drives the paginator, the record store and the download engine.
///
/// All store writes go through this single coordinating flow; only the
/// download phase fans out.
pub struct SyncEngine {
    source: Arc<dyn PageSource>,
    store: RecordStore,
    downloads: DownloadEngine,
    naming: NamingScheme,
    page_size: u32,
}

impl SyncEngine {
    #[must_use]
    pub fn new(
        source: Arc<dyn PageSource>,
        store: RecordStore,
        downloads: DownloadEngine,
        naming: NamingScheme,
    ) -> Self {
        Self {
            source,
            store,
            downloads,
            naming,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Page size used by searches and id lookups.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    #[must_use]
    pub fn naming(&self) -> &NamingScheme {
        &self.naming
    }

    /// Cursor persisted by the last sync of `category`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Store` if the cursor cannot be read.
    pub async fn resume_cursor(&self, category: Option<&str>) -> Result<SyncCursor, SyncError> {
        Ok(SyncCursor {
            category: category.map(str::to_string),
            last_synced_at: self.store.load_cursor(category).await?,
        })
    }

    /// Incrementally syncs `since.category` from `since.last_synced_at`,
    /// walking pages until exhausted.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::sync_pages`].
    pub async fn sync(&self, since: SyncCursor, page_size: u32) -> Result<SyncReport, SyncError> {
        self.sync_pages(since, page_size, None).await
    }

    /// Incremental sync stopping after at most `max_pages` pages.
    ///
    /// Pages arrive oldest update first. Each page is merged in one
    /// transaction; only then does the watermark advance to the newest
    /// `updated_at` merged, and the new watermark is persisted. Records older
    /// than the starting watermark are dropped.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Interrupted` carrying the last durable cursor when
    /// a page fetch or merge fails. Rerunning from that cursor re-fetches
    /// everything not yet merged.
    #[instrument(skip(self, since), fields(category = since.category.as_deref().unwrap_or("*")))]
    pub async fn sync_pages(
        &self,
        since: SyncCursor,
        page_size: u32,
        max_pages: Option<usize>,
    ) -> Result<SyncReport, SyncError> {
        let query = SearchQuery::updated_since(since.category.as_deref(), since.last_synced_at);
        let mut paginator = Paginator::new(self.source.as_ref(), query, page_size);
        let mut cursor = since.clone();
        let mut report = SyncReport::starting_at(since.clone());

        info!(since = ?since.last_synced_at, "starting sync");

        loop {
            if max_pages.is_some_and(|max| report.pages_fetched >= max) {
                debug!(pages = report.pages_fetched, "page limit reached");
                break;
            }

            let page = match paginator.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(e) => return Err(SyncError::interrupted(report.pages_fetched, cursor, e)),
            };
            report.pages_fetched += 1;

            let fetched = page.len();
            let records: Vec<PaperRecord> = page
                .records
                .into_iter()
                .map(PaperRecord::from)
                .filter(|record| since.admits(record.updated_at))
                .collect();
            report.records_skipped += fetched - records.len();

            let merge = match self.store.upsert_many(&records).await {
                Ok(merge) => merge,
                Err(e) => return Err(SyncError::interrupted(report.pages_fetched - 1, cursor, e)),
            };
            report.absorb(&merge);

            if let Some(newest) = records.iter().filter_map(|r| r.updated_at).max() {
                if cursor.advance(newest) {
                    if let Err(e) = self.store.save_cursor(cursor.category.as_deref(), newest).await
                    {
                        return Err(SyncError::interrupted(report.pages_fetched, cursor, e));
                    }
                }
            }

            debug!(
                page = report.pages_fetched,
                records = records.len(),
                inserted = merge.inserted,
                updated = merge.updated,
                watermark = ?cursor.last_synced_at,
                "merged page"
            );
        }

        report.final_cursor = cursor;
        info!(
            pages = report.pages_fetched,
            inserted = report.records_inserted,
            updated = report.records_updated,
            unchanged = report.records_unchanged,
            "sync complete"
        );
        Ok(report)
    }

    /// Runs one bounded search, stores the results and downloads their PDFs.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::search_and_fetch_with`].
    pub async fn search_and_fetch(
        &self,
        query: SearchQuery,
        max_results: u64,
        concurrency: usize,
    ) -> Result<SearchAndFetch, SyncError> {
        self.search_and_fetch_with(query, max_results, &FetchOptions::new(concurrency))
            .await
    }

    /// Like [`SyncEngine::search_and_fetch`], with explicit download options.
    ///
    /// Only records without an existing download and with a PDF link are
    /// downloaded. Successful downloads are recorded in the store.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Api` when the search fails, `SyncError::Store`
    /// when merging fails and `SyncError::Engine` for an invalid download
    /// batch. Individual download failures are reported in the result.
    #[instrument(skip(self, query, options), fields(query = %query.search_expression()))]
    pub async fn search_and_fetch_with(
        &self,
        query: SearchQuery,
        max_results: u64,
        options: &FetchOptions,
    ) -> Result<SearchAndFetch, SyncError> {
        let mut paginator =
            Paginator::new(self.source.as_ref(), query, self.page_size).with_max_results(max_results);
        let raw = paginator.collect_records().await?;
        let records: Vec<PaperRecord> = raw.into_iter().map(PaperRecord::from).collect();
        info!(found = records.len(), "search complete");

        let merge = self.store.upsert_many(&records).await?;
        self.finish_fetch(&records, merge, options).await
    }

    /// Ensures the given ids are stored locally and downloaded.
    ///
    /// Ids already in the store are not requested again; the rest are looked
    /// up by id list.
    ///
    /// # Errors
    ///
    /// As for [`SyncEngine::search_and_fetch_with`].
    #[instrument(skip(self, ids, options), fields(ids = ids.len()))]
    pub async fn fetch_by_ids(
        &self,
        ids: &[String],
        options: &FetchOptions,
    ) -> Result<SearchAndFetch, SyncError> {
        let mut records = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        let mut seen = HashSet::new();
        for id in ids {
            let id = id.trim();
            if id.is_empty() || !seen.insert(id.to_string()) {
                continue;
            }
            match self.store.get(id).await? {
                Some(record) => records.push(record),
                None => missing.push(id.to_string()),
            }
        }

        let mut merge = MergeReport::default();
        if !missing.is_empty() {
            debug!(missing = missing.len(), "looking up ids remotely");
            let mut paginator = Paginator::new(
                self.source.as_ref(),
                SearchQuery::by_ids(missing.clone()),
                self.page_size,
            )
            .with_max_results(missing.len() as u64);
            let fetched: Vec<PaperRecord> = paginator
                .collect_records()
                .await?
                .into_iter()
                .map(PaperRecord::from)
                .collect();
            if fetched.len() < missing.len() {
                warn!(
                    requested = missing.len(),
                    found = fetched.len(),
                    "some ids were not found"
                );
            }
            merge = self.store.upsert_many(&fetched).await?;
            records.extend(fetched);
        }

        self.finish_fetch(&records, merge, options).await
    }

    /// Reloads merged records, downloads what is missing and records the
    /// resulting paths.
    async fn finish_fetch(
        &self,
        records: &[PaperRecord],
        merge: MergeReport,
        options: &FetchOptions,
    ) -> Result<SearchAndFetch, SyncError> {
        let mut stored = Vec::with_capacity(records.len());
        for record in records {
            let current = self.store.get(&record.id).await?;
            stored.push(current.unwrap_or_else(|| record.clone()));
        }

        let mut downloads = if options.download {
            self.download_missing(&stored, options).await?
        } else {
            Vec::new()
        };
        if options.retry_failed {
            downloads = self.retry_failed(downloads, options).await?;
        }

        let recorded = succeeded_paths(&downloads);
        if let Err(source) = self.store.mark_downloaded_many(&recorded).await {
            return Err(SyncError::Unrecorded { downloads, source });
        }
        for (id, path) in recorded {
            for record in stored.iter_mut().filter(|r| r.id == id) {
                record.local_path = Some(path.clone());
            }
        }

        Ok(SearchAndFetch {
            records: stored,
            merge,
            downloads,
        })
    }

    async fn download_missing(
        &self,
        records: &[PaperRecord],
        options: &FetchOptions,
    ) -> Result<Vec<DownloadResult>, SyncError> {
        let mut seen = HashSet::new();
        let mut claimed: HashMap<PathBuf, String> = HashMap::new();
        let mut tasks = Vec::new();
        for record in records {
            if !seen.insert(record.id.as_str()) || already_downloaded(record).await {
                continue;
            }
            let Some(url) = record.pdf_url.as_deref() else {
                debug!(record_id = %record.id, "no pdf link, skipping download");
                continue;
            };
            let Some(dest) = self.unclaimed_destination(record, &claimed).await? else {
                warn!(record_id = %record.id, "no free destination, skipping download");
                continue;
            };
            claimed.insert(dest.clone(), record.id.clone());
            tasks.push(DownloadTask::new(&record.id, url, dest));
        }

        if tasks.is_empty() {
            debug!("nothing to download");
            return Ok(Vec::new());
        }
        self.submit(tasks, options).await
    }

    /// Named destination for `record`, or the id-suffixed variant when the
    /// name belongs to another record in this batch or in the store.
    async fn unclaimed_destination(
        &self,
        record: &PaperRecord,
        claimed: &HashMap<PathBuf, String>,
    ) -> Result<Option<PathBuf>, SyncError> {
        let preferred = self.naming.destination_for(record);
        let suffixed = with_id_suffix(&preferred, &record.id);
        for candidate in [preferred, suffixed] {
            let taken_in_batch = claimed.get(&candidate).is_some_and(|owner| *owner != record.id);
            if taken_in_batch {
                continue;
            }
            if let Some(owner) = self.store.path_owner(&candidate, &record.id).await? {
                debug!(record_id = %record.id, owner = %owner, path = %candidate.display(), "destination taken");
                continue;
            }
            return Ok(Some(candidate));
        }
        Ok(None)
    }

    /// Submits the `FailedRetryable` subset of `results` once more and
    /// replaces their entries with the new outcomes.
    async fn retry_failed(
        &self,
        mut results: Vec<DownloadResult>,
        options: &FetchOptions,
    ) -> Result<Vec<DownloadResult>, SyncError> {
        let tasks = retryable_tasks(&results);
        if tasks.is_empty() || options.cancel.is_cancelled() {
            return Ok(results);
        }
        info!(tasks = tasks.len(), "retrying failed downloads");

        for retried in self.submit(tasks, options).await? {
            match results.iter_mut().find(|r| r.record_id == retried.record_id) {
                Some(slot) => *slot = retried,
                None => results.push(retried),
            }
        }
        Ok(results)
    }

    async fn submit(
        &self,
        tasks: Vec<DownloadTask>,
        options: &FetchOptions,
    ) -> Result<Vec<DownloadResult>, SyncError> {
        let callback = options.on_progress.clone();
        let results = self
            .downloads
            .submit(
                tasks,
                options.concurrency,
                move |snapshot| {
                    if let Some(callback) = &callback {
                        callback(snapshot);
                    }
                },
                &options.cancel,
            )
            .await?;
        Ok(results)
    }
}

/// A recorded download counts only while its file is still on disk.
async fn already_downloaded(record: &PaperRecord) -> bool {
    match &record.local_path {
        Some(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
        None => false,
    }
}
