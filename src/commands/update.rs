//! Update command handler: incremental sync from the saved cursor.

use anyhow::{Result, anyhow};
use arxiv_crawler::{SyncCursor, SyncError};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::app::runtime::AppContext;
use crate::cli::UpdateArgs;
use crate::output;

pub async fn run_update_command(ctx: &AppContext, args: &UpdateArgs) -> Result<()> {
    let engine = ctx.sync_engine(None).await?;
    let category = args.category.as_deref();

    let saved = engine.resume_cursor(category).await?;
    let cursor = starting_cursor(saved, args, Utc::now());
    info!(
        category = category.unwrap_or("*"),
        since = ?cursor.last_synced_at,
        "updating"
    );

    let page_size = args
        .page_size
        .unwrap_or(ctx.config.api.max_results_per_query);
    let report = match engine.sync_pages(cursor, page_size, args.max_pages).await {
        Ok(report) => report,
        Err(error) => return Err(interrupted_error(error)),
    };

    if args.json {
        return output::print_json(&report);
    }
    println!(
        "Fetched {} page(s): {} new, {} updated, {} unchanged, {} skipped",
        report.pages_fetched,
        report.records_inserted,
        report.records_updated,
        report.records_unchanged,
        report.records_skipped
    );
    match report.final_cursor.last_synced_at {
        Some(ts) => println!("Cursor: {}", ts.to_rfc3339()),
        None => println!("Cursor: not set"),
    }
    Ok(())
}

/// Saved cursor, unless `--full` or no prior sync; then `--days` back from `now`.
fn starting_cursor(saved: SyncCursor, args: &UpdateArgs, now: DateTime<Utc>) -> SyncCursor {
    if !args.full && saved.last_synced_at.is_some() {
        return saved;
    }
    SyncCursor::new(args.category.as_deref()).since(now - Duration::days(i64::from(args.days)))
}

fn interrupted_error(error: SyncError) -> anyhow::Error {
    let Some(cursor) = error.resume_cursor() else {
        return anyhow!(error).context("Update failed");
    };
    let resume_at = cursor
        .last_synced_at
        .map_or_else(|| "the start".to_string(), |ts| ts.to_rfc3339());
    warn!(resume_at = %resume_at, "sync interrupted, progress saved");
    anyhow!(error).context(format!(
        "Update interrupted; rerun to resume from {resume_at}"
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn args(full: bool, days: u32) -> UpdateArgs {
        UpdateArgs {
            category: Some("cs.AI".to_string()),
            days,
            full,
            max_pages: None,
            page_size: None,
            json: false,
        }
    }

    #[test]
    fn test_saved_cursor_is_resumed() {
        let saved_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let saved = SyncCursor::new(Some("cs.AI")).since(saved_at);
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();

        let cursor = starting_cursor(saved, &args(false, 7), now);
        assert_eq!(cursor.last_synced_at, Some(saved_at));
    }

    #[test]
    fn test_missing_cursor_looks_back_days() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let cursor = starting_cursor(SyncCursor::new(Some("cs.AI")), &args(false, 7), now);
        assert_eq!(
            cursor.last_synced_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap())
        );
        assert_eq!(cursor.category.as_deref(), Some("cs.AI"));
    }

    #[test]
    fn test_full_ignores_saved_cursor() {
        let saved = SyncCursor::new(Some("cs.AI"))
            .since(Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap());
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let cursor = starting_cursor(saved, &args(true, 30), now);
        assert_eq!(
            cursor.last_synced_at,
            Some(Utc.with_ymd_and_hms(2024, 2, 9, 0, 0, 0).unwrap())
        );
    }
}
