//! Query construction for the arXiv API.

use chrono::{DateTime, NaiveDate, Utc};

/// Hard cap the API enforces per request.
pub const MAX_RESULTS_PER_REQUEST: u32 = 2000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    Relevance,
    LastUpdatedDate,
    SubmittedDate,
}

impl SortBy {
    fn as_api_str(self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::LastUpdatedDate => "lastUpdatedDate",
            Self::SubmittedDate => "submittedDate",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    fn as_api_str(self) -> &'static str {
        match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
        }
    }
}

/// A search against the arXiv API.
///
/// Field terms are combined with `AND`. When `id_list` is non-empty the
/// request also carries `id_list`, and the search expression (if any)
/// filters within those ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub all: Option<String>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub category: Option<String>,
    pub submitted_from: Option<NaiveDate>,
    pub submitted_to: Option<NaiveDate>,
    /// Only records last updated at or after this instant.
    pub updated_since: Option<DateTime<Utc>>,
    pub id_list: Vec<String>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl SearchQuery {
    /// Free-text search across all fields.
    #[must_use]
    pub fn keywords(terms: impl Into<String>) -> Self {
        Self {
            all: Some(terms.into()),
            ..Self::default()
        }
    }

    /// Incremental refresh: records in `category` updated since `since`,
    /// oldest update first so a watermark can advance page by page.
    #[must_use]
    pub fn updated_since(category: Option<&str>, since: Option<DateTime<Utc>>) -> Self {
        Self {
            category: category.map(str::to_string),
            updated_since: since,
            sort_by: SortBy::LastUpdatedDate,
            sort_order: SortOrder::Ascending,
            ..Self::default()
        }
    }

    /// Direct lookup of specific identifiers.
    #[must_use]
    pub fn by_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id_list: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_submitted_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.submitted_from = from;
        self.submitted_to = to;
        self
    }

    #[must_use]
    pub fn sorted(mut self, sort_by: SortBy, sort_order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.sort_order = sort_order;
        self
    }

    fn has_terms(&self) -> bool {
        self.all.is_some()
            || self.author.is_some()
            || self.title.is_some()
            || self.abstract_text.is_some()
            || self.category.is_some()
            || self.submitted_from.is_some()
            || self.submitted_to.is_some()
            || self.updated_since.is_some()
    }

    /// The `search_query` expression, e.g. `ti:transformer AND cat:cs.CL`.
    ///
    /// Returns `all:*` when no term is set.
    #[must_use]
    pub fn search_expression(&self) -> String {
        let mut parts = Vec::new();

        let fields = [
            ("all", &self.all),
            ("au", &self.author),
            ("ti", &self.title),
            ("abs", &self.abstract_text),
            ("cat", &self.category),
        ];
        for (prefix, value) in fields {
            if let Some(term) = value.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                parts.push(format!("{prefix}:{}", quote_term(term)));
            }
        }

        if self.submitted_from.is_some() || self.submitted_to.is_some() {
            let from = self
                .submitted_from
                .map_or_else(|| "*".to_string(), |d| d.format("%Y%m%d").to_string());
            let to = self
                .submitted_to
                .map_or_else(|| "*".to_string(), |d| d.format("%Y%m%d").to_string());
            parts.push(format!("submittedDate:[{from} TO {to}]"));
        }

        if let Some(since) = self.updated_since {
            parts.push(format!(
                "lastUpdatedDate:[{} TO *]",
                since.format("%Y%m%d%H%M")
            ));
        }

        if parts.is_empty() {
            "all:*".to_string()
        } else {
            parts.join(" AND ")
        }
    }

    /// Query-string pairs for one page request.
    pub(crate) fn query_pairs(&self, start: u64, max_results: u32) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(6);
        if !self.id_list.is_empty() {
            pairs.push(("id_list", self.id_list.join(",")));
        }
        if self.id_list.is_empty() || self.has_terms() {
            pairs.push(("search_query", self.search_expression()));
        }
        pairs.push(("start", start.to_string()));
        pairs.push((
            "max_results",
            max_results.min(MAX_RESULTS_PER_REQUEST).to_string(),
        ));
        pairs.push(("sortBy", self.sort_by.as_api_str().to_string()));
        pairs.push(("sortOrder", self.sort_order.as_api_str().to_string()));
        pairs
    }
}

/// Multi-word terms are phrase-quoted so they bind to one field.
fn quote_term(term: &str) -> String {
    if term.contains(char::is_whitespace) && !term.starts_with('"') {
        format!("\"{term}\"")
    } else {
        term.to_string()
    }
}
