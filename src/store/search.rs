//! Local search over stored records.

use std::fmt;
use std::str::FromStr;

use sqlx::{QueryBuilder, Sqlite};

/// Record field that a local search can match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchField {
    Title,
    Abstract,
    Authors,
}

impl SearchField {
    fn column(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Abstract => "abstract_text",
            Self::Authors => "authors",
        }
    }
}

impl fmt::Display for SearchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Title => "title",
            Self::Abstract => "abstract",
            Self::Authors => "authors",
        };
        write!(f, "{label}")
    }
}

impl FromStr for SearchField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "title" => Ok(Self::Title),
            "abstract" | "summary" => Ok(Self::Abstract),
            "author" | "authors" => Ok(Self::Authors),
            other => Err(format!(
                "unknown search field '{other}' (expected title, abstract, or authors)"
            )),
        }
    }
}

/// Filter for [`RecordStore::find`](super::RecordStore::find).
///
/// Clauses on different fields are ANDed; tokens within one field are ORed.
/// Matching is case-insensitive substring matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalSearch {
    clauses: Vec<(SearchField, Vec<String>)>,
    category: Option<String>,
    downloaded_only: bool,
    limit: Option<u32>,
}

impl LocalSearch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `field` to contain at least one of `tokens`.
    ///
    /// Blank tokens are dropped; a clause with no tokens left is ignored.
    #[must_use]
    pub fn field<I, S>(mut self, field: SearchField, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<String> = tokens
            .into_iter()
            .map(Into::into)
            .filter(|token| !token.trim().is_empty())
            .collect();
        if !tokens.is_empty() {
            self.clauses.push((field, tokens));
        }
        self
    }

    /// Restricts results to records listing `category`.
    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn downloaded_only(mut self, downloaded_only: bool) -> Self {
        self.downloaded_only = downloaded_only;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Builds the `SELECT` statement for this filter.
    pub(crate) fn to_query(&self) -> QueryBuilder<'static, Sqlite> {
        let mut qb = QueryBuilder::new("SELECT * FROM papers WHERE 1 = 1");

        for (field, tokens) in &self.clauses {
            qb.push(" AND (");
            for (index, token) in tokens.iter().enumerate() {
                if index > 0 {
                    qb.push(" OR ");
                }
                qb.push(field.column());
                qb.push(" LIKE ");
                qb.push_bind(like_pattern(token));
                qb.push(" ESCAPE '\\'");
            }
            qb.push(")");
        }

        if let Some(category) = &self.category {
            qb.push(" AND categories LIKE ");
            qb.push_bind(like_pattern(&format!("\"{category}\"")));
            qb.push(" ESCAPE '\\'");
        }

        if self.downloaded_only {
            qb.push(" AND local_path IS NOT NULL");
        }

        qb.push(" ORDER BY published_at DESC, id ASC");

        if let Some(limit) = self.limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::from(limit));
        }

        qb
    }
}

/// Wraps `token` in `%` after escaping LIKE metacharacters.
fn like_pattern(token: &str) -> String {
    let mut escaped = String::with_capacity(token.len() + 2);
    escaped.push('%');
    for ch in token.trim().chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}
