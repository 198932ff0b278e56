//! Persistent record store with merge-on-upsert semantics.
//!
//! The store is the source of truth for deduplication: every paper is keyed
//! by its arXiv identifier, and writing a record that already exists merges
//! the two field by field (see [`merge_record`]) instead of adding a row.
//!
//! # Example
//!
//! ```no_run
//! use arxiv_crawler::{Database, PaperRecord, RecordStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RecordStore::new(Database::new_in_memory().await?);
//! let report = store.upsert_many(&[PaperRecord::new("2301.00001v1")]).await?;
//! assert_eq!(report.inserted, 1);
//! # Ok(())
//! # }
//! ```

mod error;
mod merge;
pub mod record;
mod search;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, instrument};

use crate::db::Database;

pub use error::StoreError;
pub use merge::{MergeOutcome, MergeReport, merge_record};
pub use record::PaperRecord;
pub use search::{LocalSearch, SearchField};

use record::{PaperRow, format_timestamp, parse_timestamp};

/// Scope key used for the all-categories sync cursor.
const ALL_CATEGORIES_SCOPE: &str = "*";

/// Number of categories reported by [`RecordStore::stats`].
const TOP_CATEGORY_LIMIT: i64 = 10;

/// Aggregate counts over the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: i64,
    pub downloaded: i64,
    /// `(primary category, count)`, most common first.
    pub top_categories: Vec<(String, i64)>,
    /// `(year, count)`, newest year first.
    pub by_year: Vec<(String, i64)>,
}

/// Keyed paper store backed by `SQLite`.
#[derive(Debug, Clone)]
pub struct RecordStore {
    db: Database,
}

impl RecordStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Merges `records` into the store in a single transaction.
    ///
    /// Absent ids are inserted verbatim. Present ids are merged with
    /// [`merge_record`]; rows whose merge produces no change are left
    /// untouched. Duplicate ids inside the batch merge in order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if any statement fails; nothing from the batch
    /// is committed in that case.
    #[instrument(skip(self, records), fields(batch = records.len()))]
    pub async fn upsert_many(&self, records: &[PaperRecord]) -> Result<MergeReport, StoreError> {
        let mut tx = self.db.pool().begin().await?;
        let mut report = MergeReport::default();

        for incoming in records {
            match fetch_row(&mut tx, &incoming.id).await? {
                None => {
                    insert_record(&mut tx, incoming).await?;
                    report.inserted += 1;
                }
                Some(row) => {
                    let existing = PaperRecord::try_from(row)?;
                    let (merged, outcome) = merge_record(&existing, incoming);
                    match outcome {
                        MergeOutcome::Unchanged => report.unchanged += 1,
                        MergeOutcome::Updated => {
                            update_record(&mut tx, &merged).await?;
                            report.updated += 1;
                        }
                    }
                }
            }
        }

        tx.commit().await?;
        debug!(
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            "upsert batch committed"
        );
        Ok(report)
    }

    /// Returns whether a record with `id` is stored.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the query fails.
    pub async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        let found: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM papers WHERE id = ?)")
            .bind(id)
            .fetch_one(self.db.pool())
            .await?;
        Ok(found != 0)
    }

    /// Loads one record by id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails or the row is corrupt.
    pub async fn get(&self, id: &str) -> Result<Option<PaperRecord>, StoreError> {
        let row: Option<PaperRow> = sqlx::query_as("SELECT * FROM papers WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(PaperRecord::try_from).transpose()
    }

    /// Finds records matching `search`, newest publication first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails or a row is corrupt.
    #[instrument(skip(self))]
    pub async fn find(&self, search: &LocalSearch) -> Result<Vec<PaperRecord>, StoreError> {
        let mut query = search.to_query();
        let rows: Vec<PaperRow> = query.build_query_as().fetch_all(self.db.pool()).await?;
        debug!(matches = rows.len(), "local search complete");
        rows.into_iter().map(PaperRecord::try_from).collect()
    }

    /// Records where the PDF for `id` was saved.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no such record exists.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn mark_downloaded(&self, id: &str, path: &Path) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE papers SET local_path = ?, modified_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') WHERE id = ?",
        )
        .bind(path.to_string_lossy().into_owned())
        .bind(id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Records every `(id, path)` pair in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` for the first unknown id, or a
    /// database error. Either way no path from the batch is recorded.
    #[instrument(skip(self, downloads), fields(batch = downloads.len()))]
    pub async fn mark_downloaded_many(
        &self,
        downloads: &[(String, PathBuf)],
    ) -> Result<(), StoreError> {
        let mut tx = self.db.pool().begin().await?;
        for (id, path) in downloads {
            let result = sqlx::query(
                "UPDATE papers SET local_path = ?, modified_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') WHERE id = ?",
            )
            .bind(path.to_string_lossy().into_owned())
            .bind(id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(id.clone()));
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Id of another record whose recorded download is `path`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the query fails.
    pub async fn path_owner(&self, path: &Path, except_id: &str) -> Result<Option<String>, StoreError> {
        let owner = sqlx::query_scalar("SELECT id FROM papers WHERE local_path = ? AND id != ? LIMIT 1")
            .bind(path.to_string_lossy().into_owned())
            .bind(except_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(owner)
    }

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM papers")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    /// Totals, download coverage, top categories, and papers per year.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if a query fails.
    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let pool = self.db.pool();
        let total = self.count().await?;
        let downloaded =
            sqlx::query_scalar("SELECT COUNT(*) FROM papers WHERE local_path IS NOT NULL")
                .fetch_one(pool)
                .await?;
        let top_categories = sqlx::query_as(
            "SELECT primary_category, COUNT(*) FROM papers \
             WHERE primary_category IS NOT NULL \
             GROUP BY primary_category ORDER BY COUNT(*) DESC, primary_category ASC LIMIT ?",
        )
        .bind(TOP_CATEGORY_LIMIT)
        .fetch_all(pool)
        .await?;
        let by_year = sqlx::query_as(
            "SELECT substr(published_at, 1, 4) AS year, COUNT(*) FROM papers \
             WHERE published_at IS NOT NULL GROUP BY year ORDER BY year DESC",
        )
        .fetch_all(pool)
        .await?;

        Ok(StoreStats {
            total,
            downloaded,
            top_categories,
            by_year,
        })
    }

    /// Loads the persisted sync watermark for `category` (`None` = all categories).
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails or the stored value is corrupt.
    pub async fn load_cursor(
        &self,
        category: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let scope = category.unwrap_or(ALL_CATEGORIES_SCOPE);
        let raw: Option<String> =
            sqlx::query_scalar("SELECT last_synced_at FROM sync_cursors WHERE scope = ?")
                .bind(scope)
                .fetch_optional(self.db.pool())
                .await?;
        raw.map(|value| {
            parse_timestamp(&value)
                .ok_or_else(|| StoreError::corrupt(scope, format!("sync cursor: {value}")))
        })
        .transpose()
    }

    /// Persists the sync watermark for `category`. Never moves it backwards.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the write fails.
    #[instrument(skip(self))]
    pub async fn save_cursor(
        &self,
        category: Option<&str>,
        last_synced_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sync_cursors (scope, last_synced_at) VALUES (?, ?) \
             ON CONFLICT(scope) DO UPDATE SET \
               last_synced_at = excluded.last_synced_at, \
               modified_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') \
             WHERE excluded.last_synced_at > sync_cursors.last_synced_at",
        )
        .bind(category.unwrap_or(ALL_CATEGORIES_SCOPE))
        .bind(format_timestamp(&last_synced_at))
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}

async fn fetch_row(conn: &mut SqliteConnection, id: &str) -> Result<Option<PaperRow>, StoreError> {
    let row = sqlx::query_as("SELECT * FROM papers WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

/// Columns shared by insert and update, in bind order.
struct Encoded {
    authors: String,
    categories: String,
    published_at: Option<String>,
    updated_at: Option<String>,
    local_path: Option<String>,
}

fn encode(record: &PaperRecord) -> Result<Encoded, StoreError> {
    let authors = serde_json::to_string(&record.authors)
        .map_err(|e| StoreError::corrupt(&record.id, format!("authors: {e}")))?;
    let categories = serde_json::to_string(&record.categories)
        .map_err(|e| StoreError::corrupt(&record.id, format!("categories: {e}")))?;
    Ok(Encoded {
        authors,
        categories,
        published_at: record.published_at.as_ref().map(format_timestamp),
        updated_at: record.updated_at.as_ref().map(format_timestamp),
        local_path: record
            .local_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned()),
    })
}

async fn insert_record(conn: &mut SqliteConnection, record: &PaperRecord) -> Result<(), StoreError> {
    let encoded = encode(record)?;
    sqlx::query(
        "INSERT INTO papers (id, title, authors, abstract_text, categories, primary_category, \
         published_at, updated_at, pdf_url, abs_url, doi, comment, local_path) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(&record.title)
    .bind(encoded.authors)
    .bind(&record.abstract_text)
    .bind(encoded.categories)
    .bind(&record.primary_category)
    .bind(encoded.published_at)
    .bind(encoded.updated_at)
    .bind(&record.pdf_url)
    .bind(&record.abs_url)
    .bind(&record.doi)
    .bind(&record.comment)
    .bind(encoded.local_path)
    .execute(conn)
    .await?;
    Ok(())
}

async fn update_record(conn: &mut SqliteConnection, record: &PaperRecord) -> Result<(), StoreError> {
    let encoded = encode(record)?;
    sqlx::query(
        "UPDATE papers SET title = ?, authors = ?, abstract_text = ?, categories = ?, \
         primary_category = ?, published_at = ?, updated_at = ?, pdf_url = ?, abs_url = ?, \
         doi = ?, comment = ?, local_path = ?, \
         modified_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') \
         WHERE id = ?",
    )
    .bind(&record.title)
    .bind(encoded.authors)
    .bind(&record.abstract_text)
    .bind(encoded.categories)
    .bind(&record.primary_category)
    .bind(encoded.published_at)
    .bind(encoded.updated_at)
    .bind(&record.pdf_url)
    .bind(&record.abs_url)
    .bind(&record.doi)
    .bind(&record.comment)
    .bind(encoded.local_path)
    .bind(&record.id)
    .execute(conn)
    .await?;
    Ok(())
}
