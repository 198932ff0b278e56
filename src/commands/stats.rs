//! Stats command handler.

use anyhow::{Context, Result};
use arxiv_crawler::store::StoreStats;

use crate::app::runtime::AppContext;
use crate::cli::StatsArgs;
use crate::output;

pub async fn run_stats_command(ctx: &AppContext, args: &StatsArgs) -> Result<()> {
    let store = ctx.open_store().await?;
    let stats = store.stats().await.context("Failed to read store statistics")?;

    if args.json {
        return output::print_json(&stats);
    }
    print!("{}", render_stats(&stats));
    Ok(())
}

fn render_stats(stats: &StoreStats) -> String {
    let mut out = String::new();
    out.push_str(&format!("total_papers = {}\n", stats.total));
    out.push_str(&format!("downloaded = {}\n", stats.downloaded));
    if !stats.top_categories.is_empty() {
        out.push_str("\nTop categories:\n");
        for (category, count) in &stats.top_categories {
            out.push_str(&format!("  {category:<16} {count}\n"));
        }
    }
    if !stats.by_year.is_empty() {
        out.push_str("\nBy year:\n");
        for (year, count) in &stats.by_year {
            out.push_str(&format!("  {year:<16} {count}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_stats_sections() {
        let stats = StoreStats {
            total: 3,
            downloaded: 1,
            top_categories: vec![("cs.AI".to_string(), 2)],
            by_year: Vec::new(),
        };
        let rendered = render_stats(&stats);
        assert!(rendered.starts_with("total_papers = 3\ndownloaded = 1\n"));
        assert!(rendered.contains("Top categories:"));
        assert!(!rendered.contains("By year:"));
    }
}
