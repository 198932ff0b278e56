//! Plain-text and JSON rendering for command results.

use anyhow::{Context, Result};
use arxiv_crawler::download::{DownloadStatus, DownloadSummary};
use arxiv_crawler::{DownloadResult, PaperRecord, SearchAndFetch};
use serde::Serialize;

const TITLE_WIDTH: usize = 80;

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}

/// One line per record: id, year, first author, title, download marker.
pub(crate) fn render_record_row(record: &PaperRecord) -> String {
    let year = record
        .year()
        .map_or_else(|| "----".to_string(), |y| y.to_string());
    let author = match (record.first_author(), record.authors.len()) {
        (Some(first), n) if n > 1 => format!("{first} et al."),
        (Some(first), _) => first.to_string(),
        (None, _) => "unknown".to_string(),
    };
    let marker = if record.is_downloaded() { " [pdf]" } else { "" };
    format!(
        "{:<18} {year}  {}  {}{marker}",
        record.id,
        truncate(&author, 28),
        truncate(&record.title, TITLE_WIDTH)
    )
}

pub(crate) fn print_records(records: &[PaperRecord]) {
    for record in records {
        println!("{}", render_record_row(record));
    }
}

pub(crate) fn render_download_failure(result: &DownloadResult) -> Option<String> {
    let kind = match result.status {
        DownloadStatus::FailedRetryable => "retryable",
        DownloadStatus::FailedPermanent => "permanent",
        _ => return None,
    };
    Some(format!(
        "  {} ({kind}, {} attempt(s)): {}",
        result.record_id,
        result.attempts,
        result.error.as_deref().unwrap_or("unknown error")
    ))
}

pub(crate) fn render_fetch_summary(result: &SearchAndFetch, downloads_enabled: bool) -> String {
    let merge = &result.merge;
    let mut summary = format!(
        "{} paper(s): {} new, {} updated, {} unchanged",
        result.records.len(),
        merge.inserted,
        merge.updated,
        merge.unchanged
    );
    if downloads_enabled {
        let DownloadSummary {
            succeeded,
            bytes_written,
            ..
        } = result.download_summary();
        summary.push_str(&format!(
            "; downloaded {succeeded} ({})",
            indicatif::HumanBytes(bytes_written)
        ));
        let failed = result.download_summary().failed();
        if failed > 0 {
            summary.push_str(&format!(", {failed} failed"));
        }
    }
    summary
}

/// Prints records, failures and the summary line.
pub(crate) fn print_fetch_result(result: &SearchAndFetch, downloads_enabled: bool) {
    print_records(&result.records);
    let failures: Vec<String> = result
        .downloads
        .iter()
        .filter_map(render_download_failure)
        .collect();
    if !failures.is_empty() {
        println!();
        println!("Failed downloads:");
        for line in failures {
            println!("{line}");
        }
    }
    println!();
    println!("{}", render_fetch_summary(result, downloads_enabled));
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use arxiv_crawler::MergeReport;
    use chrono::{TimeZone, Utc};

    use super::*;

    fn record() -> PaperRecord {
        let mut record = PaperRecord::new("2301.12345v1");
        record.title = "Graph Neural Networks".to_string();
        record.authors = vec!["Ada Lovelace".to_string(), "Alan Turing".to_string()];
        record.published_at = Some(Utc.with_ymd_and_hms(2023, 1, 5, 0, 0, 0).unwrap());
        record
    }

    #[test]
    fn test_record_row_shows_year_author_and_marker() {
        let mut record = record();
        let row = render_record_row(&record);
        assert!(row.contains("2023"));
        assert!(row.contains("Ada Lovelace et al."));
        assert!(!row.contains("[pdf]"));

        record.local_path = Some(PathBuf::from("/papers/x.pdf"));
        assert!(render_record_row(&record).ends_with("[pdf]"));
    }

    #[test]
    fn test_truncate_long_titles() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
    }

    #[test]
    fn test_fetch_summary_counts() {
        let result = SearchAndFetch {
            records: vec![record()],
            merge: MergeReport {
                inserted: 1,
                updated: 0,
                unchanged: 0,
            },
            downloads: Vec::new(),
        };
        assert_eq!(
            render_fetch_summary(&result, false),
            "1 paper(s): 1 new, 0 updated, 0 unchanged"
        );
        assert!(render_fetch_summary(&result, true).contains("downloaded 0"));
    }
}
