//! Atom feed parsing for API responses.
//!
//! The parser is a streaming pass over the document with `quick_xml`,
//! matching on local names so the `arxiv:` and `opensearch:` namespace
//! prefixes need no special handling.

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

/// One feed entry, normalized but not yet merged into the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    /// Identifier with version, taken from the `/abs/` suffix of the entry id.
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    pub categories: Vec<String>,
    pub primary_category: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub pdf_link: Option<String>,
    pub abs_link: Option<String>,
    pub doi: Option<String>,
    pub comment: Option<String>,
}

/// A parsed response page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub records: Vec<RawRecord>,
    /// `opensearch:totalResults`.
    pub total_results: Option<u64>,
    pub start_index: Option<u64>,
    pub items_per_page: Option<u64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("invalid XML: {0}")]
    Xml(String),

    #[error("document has no <feed> root element")]
    NotAFeed,

    #[error("entry has no identifier")]
    MissingId,

    #[error("invalid {field} value '{value}'")]
    InvalidValue { field: &'static str, value: String },

    /// The API answered with an error entry instead of results.
    #[error("{0}")]
    Remote(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Title,
    Summary,
    Published,
    Updated,
    AuthorName,
    Doi,
    Comment,
    TotalResults,
    StartIndex,
    ItemsPerPage,
}

/// Parses an Atom response body.
///
/// # Errors
///
/// Returns `FeedError` when the body is not well-formed XML, is not an Atom
/// feed, carries an entry without an id or with a bad timestamp, or is an
/// API error document.
pub fn parse_feed(xml: &str) -> Result<ParsedFeed, FeedError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut feed = ParsedFeed::default();
    let mut saw_feed = false;
    let mut entry: Option<RawRecord> = None;
    let mut in_author = false;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(element) => {
                let local = element.local_name();
                let name = local.as_ref();
                text.clear();
                field = None;
                if name == b"feed" {
                    saw_feed = true;
                } else if name == b"entry" {
                    entry = Some(RawRecord::default());
                    in_author = false;
                } else if let Some(record) = entry.as_mut() {
                    if name == b"author" {
                        in_author = true;
                    } else {
                        apply_attributes(record, name, &element)?;
                        field = entry_field(name, in_author);
                    }
                } else {
                    field = feed_field(name);
                }
            }
            Event::Empty(element) => {
                let local = element.local_name();
                if local.as_ref() == b"feed" {
                    saw_feed = true;
                } else if let Some(record) = entry.as_mut() {
                    apply_attributes(record, local.as_ref(), &element)?;
                }
            }
            Event::Text(content) => {
                if field.is_some() {
                    text.push_str(&content.unescape().map_err(xml_error)?);
                }
            }
            Event::CData(content) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&content));
                }
            }
            Event::End(element) => {
                match element.local_name().as_ref() {
                    b"entry" => {
                        if let Some(record) = entry.take() {
                            feed.records.push(finish_entry(record)?);
                        }
                    }
                    b"author" => in_author = false,
                    _ => {
                        if let Some(current) = field.take() {
                            let value = collapse_whitespace(&text);
                            match entry.as_mut() {
                                Some(record) => assign_entry(record, current, value)?,
                                None => assign_feed(&mut feed, current, &value)?,
                            }
                        }
                    }
                }
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_feed {
        return Err(FeedError::NotAFeed);
    }
    Ok(feed)
}

fn xml_error(error: impl std::fmt::Display) -> FeedError {
    FeedError::Xml(error.to_string())
}

fn entry_field(name: &[u8], in_author: bool) -> Option<Field> {
    match name {
        b"name" if in_author => Some(Field::AuthorName),
        _ if in_author => None,
        b"id" => Some(Field::Id),
        b"title" => Some(Field::Title),
        b"summary" => Some(Field::Summary),
        b"published" => Some(Field::Published),
        b"updated" => Some(Field::Updated),
        b"doi" => Some(Field::Doi),
        b"comment" => Some(Field::Comment),
        _ => None,
    }
}

fn feed_field(name: &[u8]) -> Option<Field> {
    match name {
        b"totalResults" => Some(Field::TotalResults),
        b"startIndex" => Some(Field::StartIndex),
        b"itemsPerPage" => Some(Field::ItemsPerPage),
        _ => None,
    }
}

fn assign_entry(record: &mut RawRecord, field: Field, value: String) -> Result<(), FeedError> {
    match field {
        Field::Id => record.id = value,
        Field::Title => record.title = value,
        Field::Summary => record.summary = value,
        Field::Published => record.published = Some(parse_timestamp("published", &value)?),
        Field::Updated => record.updated = Some(parse_timestamp("updated", &value)?),
        Field::AuthorName => {
            if !value.is_empty() {
                record.authors.push(value);
            }
        }
        Field::Doi => record.doi = non_empty(value),
        Field::Comment => record.comment = non_empty(value),
        Field::TotalResults | Field::StartIndex | Field::ItemsPerPage => {}
    }
    Ok(())
}

fn assign_feed(feed: &mut ParsedFeed, field: Field, value: &str) -> Result<(), FeedError> {
    let parse = |name: &'static str| {
        value.parse::<u64>().map_err(|_| FeedError::InvalidValue {
            field: name,
            value: value.to_string(),
        })
    };
    match field {
        Field::TotalResults => feed.total_results = Some(parse("totalResults")?),
        Field::StartIndex => feed.start_index = Some(parse("startIndex")?),
        Field::ItemsPerPage => feed.items_per_page = Some(parse("itemsPerPage")?),
        _ => {}
    }
    Ok(())
}

fn apply_attributes(
    record: &mut RawRecord,
    name: &[u8],
    element: &BytesStart<'_>,
) -> Result<(), FeedError> {
    match name {
        b"link" => {
            let Some(href) = attribute(element, b"href")? else {
                return Ok(());
            };
            let title = attribute(element, b"title")?;
            let kind = attribute(element, b"type")?;
            let rel = attribute(element, b"rel")?;

            if kind.as_deref() == Some("application/pdf") || title.as_deref() == Some("pdf") {
                record.pdf_link = Some(href);
            } else if title.as_deref() == Some("doi") {
                if record.doi.is_none() {
                    record.doi = Some(strip_doi_resolver(&href));
                }
            } else if rel.as_deref() == Some("alternate") {
                record.abs_link = Some(href);
            }
        }
        b"category" => {
            if let Some(term) = attribute(element, b"term")?.and_then(non_empty) {
                if !record.categories.contains(&term) {
                    record.categories.push(term);
                }
            }
        }
        b"primary_category" => {
            record.primary_category = attribute(element, b"term")?.and_then(non_empty);
        }
        _ => {}
    }
    Ok(())
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, FeedError> {
    for attr in element.attributes() {
        let attr = attr.map_err(xml_error)?;
        if attr.key.local_name().as_ref() == key {
            let value = attr.unescape_value().map_err(xml_error)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn finish_entry(mut record: RawRecord) -> Result<RawRecord, FeedError> {
    let raw_id = record.id.trim().to_string();

    if raw_id.contains("/api/errors") {
        let message = if record.summary.is_empty() {
            record.title
        } else {
            record.summary
        };
        return Err(FeedError::Remote(message));
    }

    let id = raw_id
        .rsplit_once("/abs/")
        .map_or(raw_id.as_str(), |(_, suffix)| suffix)
        .to_string();
    if id.is_empty() {
        return Err(FeedError::MissingId);
    }

    if record.abs_link.is_none() && raw_id.contains("/abs/") {
        record.abs_link = Some(raw_id.clone());
    }
    if record.pdf_link.is_none() {
        record.pdf_link = record
            .abs_link
            .as_deref()
            .filter(|link| link.contains("/abs/"))
            .map(|link| link.replacen("/abs/", "/pdf/", 1));
    }

    record.id = id;
    Ok(record)
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, FeedError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| FeedError::InvalidValue {
            field,
            value: value.to_string(),
        })
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn strip_doi_resolver(href: &str) -> String {
    ["https://doi.org/", "http://doi.org/", "http://dx.doi.org/", "https://dx.doi.org/"]
        .iter()
        .find_map(|prefix| href.strip_prefix(prefix))
        .unwrap_or(href)
        .to_string()
}
