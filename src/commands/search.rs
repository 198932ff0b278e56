//! Search command handler: remote search, store, download.

use anyhow::{Context, Result, bail};
use arxiv_crawler::SearchQuery;
use tracing::info;

use super::fetch_options;
use crate::app::progress_manager::DownloadProgress;
use crate::app::runtime::AppContext;
use crate::cli::SearchArgs;
use crate::output;

pub async fn run_search_command(
    ctx: &AppContext,
    args: &SearchArgs,
    show_progress: bool,
) -> Result<()> {
    if !args.has_criteria() {
        bail!(
            "At least one search criterion is required: a query, --author, --title, --abstract or --category"
        );
    }
    if let (Some(from), Some(to)) = (args.date_from, args.date_to) {
        if from > to {
            bail!("Invalid date range: --date-from {from} is after --date-to {to}");
        }
    }

    let query = build_query(args);
    info!(query = %query.search_expression(), max_results = args.max_results, "searching arXiv");

    let engine = ctx.sync_engine(args.download.output_dir.as_deref()).await?;
    let progress = DownloadProgress::new(show_progress && !args.json);
    let options = fetch_options(ctx, &args.download, &progress);
    let result = engine
        .search_and_fetch_with(query, args.max_results, &options)
        .await;
    progress.finish();
    let result = result.context("Search failed")?;

    if args.json {
        return output::print_json(&result);
    }
    if result.records.is_empty() {
        println!("No papers found.");
        return Ok(());
    }
    output::print_fetch_result(&result, !args.download.no_download);
    Ok(())
}

fn build_query(args: &SearchArgs) -> SearchQuery {
    let mut query = match args.query.as_deref().map(str::trim) {
        Some(terms) if !terms.is_empty() => SearchQuery::keywords(terms),
        _ => SearchQuery::default(),
    };
    if let Some(author) = &args.author {
        query = query.with_author(author.as_str());
    }
    if let Some(title) = &args.title {
        query = query.with_title(title.as_str());
    }
    if let Some(text) = &args.abstract_text {
        query = query.with_abstract(text.as_str());
    }
    if let Some(category) = &args.category {
        query = query.with_category(category.as_str());
    }
    query
        .with_submitted_range(args.date_from, args.date_to)
        .sorted(args.sort_by.into(), args.sort_order.into())
}
