//! Paper record type and its database row mapping.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::StoreError;
use crate::api::RawRecord;

/// One paper's metadata, keyed by its arXiv identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Stable arXiv identifier including version, e.g. `2301.12345v2`.
    pub id: String,
    pub title: String,
    /// Author names in feed order.
    pub authors: Vec<String>,
    pub abstract_text: String,
    pub categories: BTreeSet<String>,
    pub primary_category: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pdf_url: Option<String>,
    pub abs_url: Option<String>,
    pub doi: Option<String>,
    pub comment: Option<String>,
    /// Where the PDF was saved, once a download succeeded.
    pub local_path: Option<PathBuf>,
}

impl PaperRecord {
    /// Creates a record with only an identifier set.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            authors: Vec::new(),
            abstract_text: String::new(),
            categories: BTreeSet::new(),
            primary_category: None,
            published_at: None,
            updated_at: None,
            pdf_url: None,
            abs_url: None,
            doi: None,
            comment: None,
            local_path: None,
        }
    }

    /// Publication year, if known.
    #[must_use]
    pub fn year(&self) -> Option<i32> {
        self.published_at.map(|ts| ts.year())
    }

    #[must_use]
    pub fn first_author(&self) -> Option<&str> {
        self.authors.first().map(String::as_str)
    }

    #[must_use]
    pub fn is_downloaded(&self) -> bool {
        self.local_path.is_some()
    }

    /// Category used for folder grouping: primary if set, else the first listed.
    #[must_use]
    pub fn folder_category(&self) -> Option<&str> {
        self.primary_category
            .as_deref()
            .or_else(|| self.categories.iter().next().map(String::as_str))
    }
}

impl From<RawRecord> for PaperRecord {
    fn from(raw: RawRecord) -> Self {
        let mut categories: BTreeSet<String> = raw.categories.into_iter().collect();
        if let Some(primary) = &raw.primary_category {
            categories.insert(primary.clone());
        }
        Self {
            id: raw.id,
            title: raw.title,
            authors: raw.authors,
            abstract_text: raw.summary,
            categories,
            primary_category: raw.primary_category,
            published_at: raw.published,
            updated_at: raw.updated,
            pdf_url: raw.pdf_link,
            abs_url: raw.abs_link,
            doi: raw.doi,
            comment: raw.comment,
            local_path: None,
        }
    }
}

/// Row shape of the `papers` table.
#[derive(Debug, FromRow)]
pub(crate) struct PaperRow {
    pub id: String,
    pub title: String,
    pub authors: String,
    pub abstract_text: String,
    pub categories: String,
    pub primary_category: Option<String>,
    pub published_at: Option<String>,
    pub updated_at: Option<String>,
    pub pdf_url: Option<String>,
    pub abs_url: Option<String>,
    pub doi: Option<String>,
    pub comment: Option<String>,
    pub local_path: Option<String>,
}

impl TryFrom<PaperRow> for PaperRecord {
    type Error = StoreError;

    fn try_from(row: PaperRow) -> Result<Self, Self::Error> {
        let authors: Vec<String> = serde_json::from_str(&row.authors)
            .map_err(|e| StoreError::corrupt(&row.id, format!("authors: {e}")))?;
        let categories: BTreeSet<String> = serde_json::from_str(&row.categories)
            .map_err(|e| StoreError::corrupt(&row.id, format!("categories: {e}")))?;
        let published_at = parse_column(&row.id, "published_at", row.published_at.as_deref())?;
        let updated_at = parse_column(&row.id, "updated_at", row.updated_at.as_deref())?;

        Ok(Self {
            id: row.id,
            title: row.title,
            authors,
            abstract_text: row.abstract_text,
            categories,
            primary_category: row.primary_category,
            published_at,
            updated_at,
            pdf_url: row.pdf_url,
            abs_url: row.abs_url,
            doi: row.doi,
            comment: row.comment,
            local_path: row.local_path.map(PathBuf::from),
        })
    }
}

fn parse_column(
    id: &str,
    column: &str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    value
        .map(|raw| {
            parse_timestamp(raw).ok_or_else(|| StoreError::corrupt(id, format!("{column}: {raw}")))
        })
        .transpose()
}

/// Formats a timestamp the way it is stored: RFC 3339 in UTC with all nine
/// fractional digits, so nothing is lost and stored strings sort by time.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parses an RFC 3339 timestamp into UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn raw_fixture() -> RawRecord {
        RawRecord {
            id: "2301.12345v2".to_string(),
            title: "Graph Networks".to_string(),
            authors: vec!["Ada Lovelace".to_string(), "Alan Turing".to_string()],
            summary: "We study graphs.".to_string(),
            categories: vec!["cs.LG".to_string(), "stat.ML".to_string()],
            primary_category: Some("cs.LG".to_string()),
            published: parse_timestamp("2023-01-29T18:13:01Z"),
            updated: parse_timestamp("2023-02-01T10:00:00Z"),
            pdf_link: Some("http://arxiv.org/pdf/2301.12345v2".to_string()),
            abs_link: Some("http://arxiv.org/abs/2301.12345v2".to_string()),
            doi: None,
            comment: Some("12 pages".to_string()),
        }
    }

    #[test]
    fn test_from_raw_record_maps_fields() {
        let record = PaperRecord::from(raw_fixture());
        assert_eq!(record.id, "2301.12345v2");
        assert_eq!(record.abstract_text, "We study graphs.");
        assert_eq!(record.year(), Some(2023));
        assert_eq!(record.first_author(), Some("Ada Lovelace"));
        assert_eq!(record.folder_category(), Some("cs.LG"));
        assert!(record.categories.contains("stat.ML"));
        assert!(!record.is_downloaded());
    }

    #[test]
    fn test_from_raw_record_includes_primary_category_in_set() {
        let mut raw = raw_fixture();
        raw.categories.clear();
        let record = PaperRecord::from(raw);
        assert!(record.categories.contains("cs.LG"));
    }

    #[test]
    fn test_timestamp_format_is_sortable_utc() {
        let ts = parse_timestamp("2024-03-05T07:08:09+02:00").unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-05T05:08:09.000000000Z");
    }

    #[test]
    fn test_row_with_bad_authors_json_is_corrupt() {
        let row = PaperRow {
            id: "x".to_string(),
            title: String::new(),
            authors: "not json".to_string(),
            abstract_text: String::new(),
            categories: "[]".to_string(),
            primary_category: None,
            published_at: None,
            updated_at: None,
            pdf_url: None,
            abs_url: None,
            doi: None,
            comment: None,
            local_path: None,
        };
        let err = PaperRecord::try_from(row).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
