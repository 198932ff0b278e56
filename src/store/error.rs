//! Error types for record store operations.

use thiserror::Error;

/// Errors that can occur during record store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Another writer held the database past the busy timeout.
    ///
    /// The only store failure worth retrying as-is.
    #[error("paper database is busy: {0}")]
    Busy(String),

    /// Any other database failure.
    #[error("database error: {0}")]
    Database(String),

    /// A write would have created a second row for an existing identifier.
    ///
    /// Merge logic should make this unreachable; seeing it means the store
    /// and the merge path disagree about what exists.
    #[error("storage integrity violation: {message}")]
    Integrity {
        /// Database error text.
        message: String,
    },

    /// A stored row could not be decoded into a record.
    #[error("stored record {id} is corrupt: {reason}")]
    Corrupt {
        /// Identifier of the bad row.
        id: String,
        /// What failed to decode.
        reason: String,
    },

    /// No record with this identifier exists.
    #[error("paper not found: {0}\n  Suggestion: fetch it first with `arxiv-crawler fetch {0}`")]
    NotFound(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let sqlx::Error::Database(db_error) = &err else {
            return Self::Database(err.to_string());
        };
        if db_error.is_unique_violation() {
            return Self::Integrity {
                message: db_error.message().to_string(),
            };
        }
        // SQLITE_BUSY and SQLITE_LOCKED, by name or by primary result code.
        let busy = matches!(
            db_error.code().as_deref(),
            Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
        ) || db_error.message().contains("database is locked");
        if busy {
            Self::Busy(db_error.message().to_string())
        } else {
            Self::Database(err.to_string())
        }
    }
}

impl StoreError {
    pub(crate) fn corrupt(id: &str, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// True when retrying the same operation later may succeed.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}
