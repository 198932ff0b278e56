//! CLI command handlers.

mod categories;
mod config;
mod fetch;
mod local;
mod search;
mod stats;
mod update;

pub use categories::run_categories_command;
pub use config::run_config_show_command;
pub use fetch::run_fetch_command;
pub use local::run_search_local_command;
pub use search::run_search_command;
pub use stats::run_stats_command;
pub use update::run_update_command;

use arxiv_crawler::FetchOptions;

use crate::app::progress_manager::DownloadProgress;
use crate::app::runtime::{AppContext, cancel_on_ctrl_c};
use crate::cli::DownloadArgs;

/// Download options for one command run, wired to Ctrl-C and the progress bar.
fn fetch_options(
    ctx: &AppContext,
    download_args: &DownloadArgs,
    progress: &DownloadProgress,
) -> FetchOptions {
    let options = FetchOptions::new(ctx.concurrency(download_args))
        .retry_failed(download_args.retry_failed)
        .with_cancel(cancel_on_ctrl_c())
        .with_progress(progress.callback());
    if download_args.no_download {
        options.metadata_only()
    } else {
        options
    }
}
