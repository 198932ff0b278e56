//! Lazy, restartable pagination over a [`PageSource`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{ApiError, RawRecord, SearchQuery};
use super::query::MAX_RESULTS_PER_REQUEST;

/// Position of a page within a result set (offset based).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageCursor {
    start: u64,
}

impl PageCursor {
    /// Cursor for the first page.
    #[must_use]
    pub fn first() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn at(start: u64) -> Self {
        Self { start }
    }

    #[must_use]
    pub fn start(self) -> u64 {
        self.start
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub cursor: PageCursor,
    pub records: Vec<RawRecord>,
    /// Cursor of the following page; `None` when this page is the last.
    pub next_cursor: Option<PageCursor>,
    pub total_estimate: Option<u64>,
}

impl Page {
    /// Builds a page, deriving `next_cursor` from what was requested.
    ///
    /// There is a next page only when this one came back full and the
    /// reported total (if any) says more records remain.
    #[must_use]
    pub fn from_records(
        cursor: PageCursor,
        page_size: u32,
        records: Vec<RawRecord>,
        total_estimate: Option<u64>,
    ) -> Self {
        let len = records.len() as u64;
        let end = cursor.start + len;
        let full = len > 0 && len >= u64::from(page_size);
        let more = total_estimate.is_none_or(|total| end < total);
        let next_cursor = (full && more).then(|| PageCursor::at(end));
        Self {
            cursor,
            records,
            next_cursor,
            total_estimate,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Anything that can serve a page of search results.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetches the page at `cursor` holding at most `page_size` records.
    async fn fetch_page(
        &self,
        query: &SearchQuery,
        cursor: PageCursor,
        page_size: u32,
    ) -> Result<Page, ApiError>;
}

#[async_trait]
impl<T: PageSource + ?Sized> PageSource for Arc<T> {
    async fn fetch_page(
        &self,
        query: &SearchQuery,
        cursor: PageCursor,
        page_size: u32,
    ) -> Result<Page, ApiError> {
        (**self).fetch_page(query, cursor, page_size).await
    }
}

/// Pulls pages one at a time from a [`PageSource`].
///
/// The sequence is finite: it ends after a short page, an empty page, a page
/// without a next cursor, or once `max_results` records were returned. After
/// that [`next_page`](Self::next_page) keeps returning `Ok(None)` without
/// issuing requests. A failed fetch leaves the position unchanged, so the
/// same page is requested again on the next call.
pub struct Paginator<'a> {
    source: &'a dyn PageSource,
    query: SearchQuery,
    page_size: u32,
    next: Option<PageCursor>,
    remaining: Option<u64>,
    pages_fetched: usize,
}

impl<'a> Paginator<'a> {
    /// Starts at the first page. `page_size` is clamped to `1..=2000`.
    #[must_use]
    pub fn new(source: &'a dyn PageSource, query: SearchQuery, page_size: u32) -> Self {
        Self {
            source,
            query,
            page_size: page_size.clamp(1, MAX_RESULTS_PER_REQUEST),
            next: Some(PageCursor::first()),
            remaining: None,
            pages_fetched: 0,
        }
    }

    /// Resumes from a previously saved cursor.
    #[must_use]
    pub fn starting_at(mut self, cursor: PageCursor) -> Self {
        self.next = Some(cursor);
        self
    }

    /// Stops after `max_results` records in total.
    #[must_use]
    pub fn with_max_results(mut self, max_results: u64) -> Self {
        self.remaining = Some(max_results);
        if max_results == 0 {
            self.next = None;
        }
        self
    }

    /// Cursor of the page the next call will fetch, if any.
    #[must_use]
    pub fn cursor(&self) -> Option<PageCursor> {
        self.next
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.next.is_none()
    }

    #[must_use]
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Fetches the next page, or `Ok(None)` once the sequence has ended.
    ///
    /// # Errors
    ///
    /// Returns the source's `ApiError` after its own retries gave up.
    #[instrument(skip(self), fields(page = self.pages_fetched + 1))]
    pub async fn next_page(&mut self) -> Result<Option<Page>, ApiError> {
        let Some(cursor) = self.next else {
            return Ok(None);
        };

        let request_size = match self.remaining {
            Some(remaining) => u32::try_from(remaining)
                .unwrap_or(u32::MAX)
                .min(self.page_size),
            None => self.page_size,
        };

        let mut page = self
            .source
            .fetch_page(&self.query, cursor, request_size)
            .await?;
        self.pages_fetched += 1;

        if page.records.len() > request_size as usize {
            // The next page starts where the kept records end.
            debug!(returned = page.len(), request_size, "oversized page, truncating");
            let Page {
                mut records,
                total_estimate,
                ..
            } = page;
            records.truncate(request_size as usize);
            page = Page::from_records(cursor, request_size, records, total_estimate);
        }

        if page.is_empty() {
            debug!(start = cursor.start(), "empty page, pagination finished");
            self.next = None;
            return Ok(None);
        }

        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(page.len() as u64);
        }

        self.next = match self.remaining {
            Some(0) => None,
            _ => page.next_cursor,
        };

        debug!(
            start = cursor.start(),
            records = page.len(),
            total = page.total_estimate,
            exhausted = self.next.is_none(),
            "fetched page"
        );
        Ok(Some(page))
    }

    /// Drains the remaining pages into one record list.
    ///
    /// # Errors
    ///
    /// Returns the first `ApiError`; records from earlier pages are dropped.
    pub async fn collect_records(&mut self) -> Result<Vec<RawRecord>, ApiError> {
        let mut records = Vec::new();
        while let Some(page) = self.next_page().await? {
            records.extend(page.records);
        }
        Ok(records)
    }
}
