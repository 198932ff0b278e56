//! Rate-limited access to the arXiv search API.
//!
//! - [`Throttle`] enforces the minimum interval between requests, process-wide.
//! - [`ArxivClient`] issues one page request at a time and retries transient
//!   failures.
//! - [`Paginator`] walks a result set page by page on top of any
//!   [`PageSource`].
//! - [`feed`] turns Atom responses into [`RawRecord`]s.

pub mod categories;
mod client;
mod error;
pub mod feed;
mod paginator;
mod query;
mod throttle;

pub use categories::{KNOWN_CATEGORIES, describe_category};
pub use client::{
    ApiConfig, ArxivClient, DEFAULT_BASE_URL, DEFAULT_REQUEST_DELAY, DEFAULT_REQUEST_TIMEOUT,
    default_user_agent,
};
pub use error::ApiError;
pub use feed::{FeedError, ParsedFeed, RawRecord, parse_feed};
pub use paginator::{Page, PageCursor, PageSource, Paginator};
pub use query::{MAX_RESULTS_PER_REQUEST, SearchQuery, SortBy, SortOrder};
pub use throttle::Throttle;

#[cfg(test)]
pub(crate) use paginator::tests::FixedSource;
