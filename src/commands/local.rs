//! Search-local command handler: query the record store.

use anyhow::{Context, Result};
use arxiv_crawler::LocalSearch;

use crate::app::runtime::AppContext;
use crate::cli::SearchLocalArgs;
use crate::output;

pub async fn run_search_local_command(ctx: &AppContext, args: &SearchLocalArgs) -> Result<()> {
    let store = ctx.open_store().await?;
    let search = build_search(args);
    let records = store.find(&search).await.context("Local search failed")?;

    if args.json {
        return output::print_json(&records);
    }
    if records.is_empty() {
        println!("No matching papers in the local store.");
        return Ok(());
    }
    output::print_records(&records);
    println!();
    println!("{} paper(s)", records.len());
    Ok(())
}

/// Each field is matched against every query word.
fn build_search(args: &SearchLocalArgs) -> LocalSearch {
    let tokens: Vec<&str> = args.query.split_whitespace().collect();
    let mut search = LocalSearch::new()
        .downloaded_only(args.downloaded)
        .limit(args.limit);
    if let Some(category) = &args.category {
        search = search.category(category.as_str());
    }
    for field in &args.fields {
        search = search.field(*field, tokens.iter().copied());
    }
    search
}
