//! Fetch command handler: store and download papers by id.

use anyhow::{Context, Result};

use super::fetch_options;
use crate::app::progress_manager::DownloadProgress;
use crate::app::runtime::AppContext;
use crate::cli::FetchArgs;
use crate::output;

pub async fn run_fetch_command(
    ctx: &AppContext,
    args: &FetchArgs,
    show_progress: bool,
) -> Result<()> {
    let ids: Vec<String> = args.ids.iter().map(|id| normalize_id(id)).collect();

    let engine = ctx.sync_engine(args.download.output_dir.as_deref()).await?;
    let progress = DownloadProgress::new(show_progress && !args.json);
    let options = fetch_options(ctx, &args.download, &progress);
    let result = engine.fetch_by_ids(&ids, &options).await;
    progress.finish();
    let result = result.context("Fetch failed")?;

    if args.json {
        return output::print_json(&result);
    }
    if result.records.is_empty() {
        println!("No papers found for the given ids.");
        return Ok(());
    }
    output::print_fetch_result(&result, !args.download.no_download);
    Ok(())
}

/// Accepts bare ids as well as `arXiv:` prefixes and abs/pdf URLs.
fn normalize_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_prefix = trimmed
        .strip_prefix("arXiv:")
        .or_else(|| trimmed.strip_prefix("arxiv:"))
        .unwrap_or(trimmed);
    let id = ["/abs/", "/pdf/"]
        .iter()
        .find_map(|marker| {
            without_prefix
                .find(marker)
                .map(|idx| &without_prefix[idx + marker.len()..])
        })
        .unwrap_or(without_prefix);
    id.trim_end_matches(".pdf").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_id_variants() {
        assert_eq!(normalize_id("2301.12345v2"), "2301.12345v2");
        assert_eq!(normalize_id(" arXiv:2301.12345 "), "2301.12345");
        assert_eq!(
            normalize_id("https://arxiv.org/abs/hep-th/9901001v1"),
            "hep-th/9901001v1"
        );
        assert_eq!(normalize_id("http://arxiv.org/pdf/2301.12345v1.pdf"), "2301.12345v1");
    }
}
