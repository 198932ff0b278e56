//! Destination paths for downloaded papers.
//!
//! Filenames follow a pattern such as `{year}_{first_author}_{title}` and
//! are sanitized to be safe on both Windows and Unix file systems.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::store::PaperRecord;

/// Pattern used when none is configured.
pub const DEFAULT_FILENAME_PATTERN: &str = "{year}_{first_author}_{title}";

/// Placeholders a filename pattern may use.
pub const PLACEHOLDERS: [&str; 4] = ["year", "first_author", "title", "arxiv_id"];

const MAX_FILENAME_CHARS: usize = 150;

/// Characters reserved on at least one major platform.
#[allow(clippy::expect_used)]
static RESERVED_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[<>:"/\\|?*]"#).expect("reserved-char regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static CONTROL_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x1f\x7f-\x9f]").expect("control-char regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static NON_NAME_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^a-zA-Z\s]").expect("author regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static NON_TITLE_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\w\s-]").expect("title regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+").expect("whitespace regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([^{}]*)\}").expect("placeholder regex is valid") // Static pattern, safe to panic
});

/// Makes `name` safe to use as a single path component.
///
/// Reserved characters become `_`, control characters are dropped, the
/// result is capped at 150 characters and never ends in a dot or space.
/// An empty result becomes `untitled`.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let replaced = RESERVED_CHARS.replace_all(name, "_");
    let cleaned = CONTROL_CHARS.replace_all(&replaced, "");
    let capped: String = cleaned.trim().chars().take(MAX_FILENAME_CHARS).collect();
    let trimmed = capped.trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Returns the placeholder names in `pattern` that cannot be expanded.
#[must_use]
pub fn unknown_placeholders(pattern: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(pattern)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|name| !PLACEHOLDERS.contains(name))
        .map(str::to_string)
        .collect()
}

/// Builds `<name>.pdf` for `record` from `pattern`.
///
/// A pattern with unknown placeholders falls back to the record id.
#[must_use]
pub fn filename_for(record: &PaperRecord, pattern: &str) -> String {
    let unknown = unknown_placeholders(pattern);
    if !unknown.is_empty() {
        warn!(
            record_id = %record.id,
            pattern,
            unknown = ?unknown,
            "filename pattern has unknown placeholders, using id"
        );
        return format!("{}.pdf", sanitize_filename(&record.id));
    }

    let year = record
        .year()
        .map_or_else(|| "unknown".to_string(), |y| y.to_string());

    let author = record.first_author().unwrap_or("");
    let author = NON_NAME_CHARS.replace_all(author, "");
    let author = author.trim();
    let first_author = if author.is_empty() {
        "unknown".to_string()
    } else {
        author.replace(' ', "_")
    };

    let title = if record.title.trim().is_empty() {
        "untitled"
    } else {
        record.title.as_str()
    };
    let title = NON_TITLE_CHARS.replace_all(title, "");
    let title = WHITESPACE_RUN.replace_all(title.trim(), "_").into_owned();

    let expanded = PLACEHOLDER.replace_all(pattern, |caps: &regex::Captures<'_>| {
        match caps.get(1).map(|m| m.as_str()) {
            Some("year") => year.clone(),
            Some("first_author") => first_author.clone(),
            Some("title") => title.clone(),
            Some("arxiv_id") => record.id.clone(),
            _ => String::new(),
        }
    });

    format!("{}.pdf", sanitize_filename(&expanded))
}

/// Where downloaded papers go and how they are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingScheme {
    pub base_dir: PathBuf,
    pub pattern: String,
    /// Nest files under a folder named after the primary category.
    pub category_folders: bool,
}

impl NamingScheme {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            pattern: DEFAULT_FILENAME_PATTERN.to_string(),
            category_folders: true,
        }
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    #[must_use]
    pub fn with_category_folders(mut self, enabled: bool) -> Self {
        self.category_folders = enabled;
        self
    }

    /// Full destination path for `record`.
    ///
    /// Deterministic, so a rerun targets the same file and can resume it.
    #[must_use]
    pub fn destination_for(&self, record: &PaperRecord) -> PathBuf {
        destination_for(record, &self.base_dir, &self.pattern, self.category_folders)
    }
}

/// Full destination path for `record` under `base_dir`.
#[must_use]
pub fn destination_for(
    record: &PaperRecord,
    base_dir: &Path,
    pattern: &str,
    category_folders: bool,
) -> PathBuf {
    let filename = filename_for(record, pattern);
    if category_folders {
        let folder = sanitize_filename(record.folder_category().unwrap_or("unknown"));
        base_dir.join(folder).join(filename)
    } else {
        base_dir.join(filename)
    }
}

/// `path` with `_<record_id>` appended to the file stem.
///
/// Used when another record already claims `path`; the suffix depends only
/// on the id, so a rerun picks the same file and can resume it.
#[must_use]
pub fn with_id_suffix(path: &Path, record_id: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let id = sanitize_filename(record_id);
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{id}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{id}"),
    };
    path.with_file_name(name)
}
