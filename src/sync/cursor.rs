//! Incremental-sync watermark.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How far a category has been synchronized.
///
/// `last_synced_at` is the newest `updated_at` that has been durably merged
/// into the store. It only ever moves forward.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// `None` means all categories.
    pub category: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SyncCursor {
    /// A cursor that has never synced.
    #[must_use]
    pub fn new(category: Option<&str>) -> Self {
        Self {
            category: category.map(str::to_string),
            last_synced_at: None,
        }
    }

    #[must_use]
    pub fn since(mut self, last_synced_at: DateTime<Utc>) -> Self {
        self.last_synced_at = Some(last_synced_at);
        self
    }

    /// Moves the watermark to `ts` if that is newer. Returns whether it moved.
    pub fn advance(&mut self, ts: DateTime<Utc>) -> bool {
        if self.last_synced_at.is_some_and(|current| current >= ts) {
            return false;
        }
        self.last_synced_at = Some(ts);
        true
    }

    /// Whether a record last updated at `updated_at` is at or after the
    /// watermark. Records without a timestamp are always admitted.
    #[must_use]
    pub fn admits(&self, updated_at: Option<DateTime<Utc>>) -> bool {
        match (self.last_synced_at, updated_at) {
            (Some(since), Some(updated)) => updated >= since,
            _ => true,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_advance_is_monotonic() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        let mut cursor = SyncCursor::new(Some("cs.AI"));
        assert!(cursor.advance(late));
        assert!(!cursor.advance(early));
        assert_eq!(cursor.last_synced_at, Some(late));
    }

    #[test]
    fn test_admits_boundary_and_undated() {
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let cursor = SyncCursor::new(None).since(since);
        assert!(cursor.admits(Some(since)));
        assert!(!cursor.admits(Some(since - chrono::Duration::seconds(1))));
        assert!(cursor.admits(None));
        assert!(SyncCursor::new(None).admits(Some(since)));
    }
}
