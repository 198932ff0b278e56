//! Categories command handler.

use std::collections::BTreeMap;

use anyhow::Result;
use arxiv_crawler::api::KNOWN_CATEGORIES;

use crate::cli::CategoriesArgs;
use crate::output;

pub fn run_categories_command(args: &CategoriesArgs) -> Result<()> {
    let selected = select(args.prefix.as_deref());

    if args.json {
        let map: BTreeMap<&str, &str> = selected.into_iter().collect();
        return output::print_json(&map);
    }
    if selected.is_empty() {
        println!("No known categories match.");
        return Ok(());
    }
    for (code, description) in selected {
        println!("{code:<16} {description}");
    }
    Ok(())
}

fn select(prefix: Option<&str>) -> Vec<(&'static str, &'static str)> {
    KNOWN_CATEGORIES
        .iter()
        .filter(|(code, _)| prefix.is_none_or(|p| code.starts_with(p)))
        .copied()
        .collect()
}
