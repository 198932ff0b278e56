//! CLI entry point for the arXiv crawler.

use std::io::{self, IsTerminal};

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod app;
mod app_config;
mod cli;
mod commands;
mod output;

use app::runtime::AppContext;
use app::terminal;
use cli::{Cli, Command, ConfigAction};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    let loaded = app_config::load_config(cli.config.as_deref())?;

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config level
    let default_level =
        terminal::default_log_level(cli.quiet, cli.verbose, loaded.config.log_directive());
    terminal::init_tracing(default_level);

    debug!(?cli, "CLI arguments parsed");
    debug!(
        config_path = ?loaded.path,
        loaded_from_file = loaded.loaded_from_file,
        "configuration loaded"
    );

    let ctx = AppContext::new(loaded.config.clone(), cli.database.as_deref());
    let show_progress = terminal::should_use_progress_bar(
        io::stderr().is_terminal(),
        cli.quiet,
        terminal::is_dumb_terminal(),
    );

    match &cli.command {
        Command::Search(args) => commands::run_search_command(&ctx, args, show_progress).await,
        Command::Update(args) => commands::run_update_command(&ctx, args).await,
        Command::Fetch(args) => commands::run_fetch_command(&ctx, args, show_progress).await,
        Command::SearchLocal(args) => commands::run_search_local_command(&ctx, args).await,
        Command::Stats(args) => commands::run_stats_command(&ctx, args).await,
        Command::Categories(args) => commands::run_categories_command(args),
        Command::Config {
            action: ConfigAction::Show,
        } => commands::run_config_show_command(&loaded, &ctx),
    }
}
