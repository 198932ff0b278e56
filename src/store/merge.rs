//! Field-wise merge of an incoming record into a stored one.
//!
//! Precedence rules:
//! - an empty incoming value never replaces a stored value;
//! - when both are non-empty, the record with the newer `updated_at` wins,
//!   and on equal timestamps the incoming record wins;
//! - an incoming record older than the stored one only fills empty fields;
//! - `updated_at` itself becomes the later of the two.

use std::ops::AddAssign;

use serde::Serialize;

use super::PaperRecord;

/// Whether merging changed the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Unchanged,
    Updated,
}

/// Counts produced by one `upsert_many` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl MergeReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }
}

impl AddAssign for MergeReport {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.updated += rhs.updated;
        self.unchanged += rhs.unchanged;
    }
}

/// Merges `incoming` into `existing`, returning the merged record and whether
/// it differs from `existing`. The identifier of `existing` is kept.
#[must_use]
pub fn merge_record(existing: &PaperRecord, incoming: &PaperRecord) -> (PaperRecord, MergeOutcome) {
    let incoming_wins = match (incoming.updated_at, existing.updated_at) {
        (Some(new), Some(old)) => new >= old,
        (None, Some(_)) => false,
        (Some(_) | None, None) => true,
    };

    let merged = PaperRecord {
        id: existing.id.clone(),
        title: pick_text(&existing.title, &incoming.title, incoming_wins),
        authors: pick_with(&existing.authors, &incoming.authors, incoming_wins, Vec::is_empty),
        abstract_text: pick_text(&existing.abstract_text, &incoming.abstract_text, incoming_wins),
        categories: pick_with(
            &existing.categories,
            &incoming.categories,
            incoming_wins,
            std::collections::BTreeSet::is_empty,
        ),
        primary_category: pick_opt_text(
            existing.primary_category.as_ref(),
            incoming.primary_category.as_ref(),
            incoming_wins,
        ),
        published_at: pick_option(existing.published_at, incoming.published_at, incoming_wins),
        updated_at: existing.updated_at.max(incoming.updated_at),
        pdf_url: pick_opt_text(existing.pdf_url.as_ref(), incoming.pdf_url.as_ref(), incoming_wins),
        abs_url: pick_opt_text(existing.abs_url.as_ref(), incoming.abs_url.as_ref(), incoming_wins),
        doi: pick_opt_text(existing.doi.as_ref(), incoming.doi.as_ref(), incoming_wins),
        comment: pick_opt_text(existing.comment.as_ref(), incoming.comment.as_ref(), incoming_wins),
        local_path: pick_with(
            &existing.local_path,
            &incoming.local_path,
            incoming_wins,
            |path| path.as_ref().is_none_or(|p| p.as_os_str().is_empty()),
        ),
    };

    let outcome = if merged == *existing {
        MergeOutcome::Unchanged
    } else {
        MergeOutcome::Updated
    };
    (merged, outcome)
}

fn pick_with<T: Clone>(current: &T, incoming: &T, incoming_wins: bool, is_empty: impl Fn(&T) -> bool) -> T {
    if is_empty(incoming) {
        current.clone()
    } else if incoming_wins || is_empty(current) {
        incoming.clone()
    } else {
        current.clone()
    }
}

fn pick_text(current: &str, incoming: &str, incoming_wins: bool) -> String {
    pick_with(&current.to_string(), &incoming.to_string(), incoming_wins, |s| {
        s.trim().is_empty()
    })
}

fn pick_opt_text(
    current: Option<&String>,
    incoming: Option<&String>,
    incoming_wins: bool,
) -> Option<String> {
    pick_with(&current.cloned(), &incoming.cloned(), incoming_wins, |value| {
        value.as_deref().is_none_or(|s| s.trim().is_empty())
    })
}

fn pick_option<T: Copy>(current: Option<T>, incoming: Option<T>, incoming_wins: bool) -> Option<T> {
    pick_with(&current, &incoming, incoming_wins, Option::is_none)
}
