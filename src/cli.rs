//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use arxiv_crawler::api::{SortBy, SortOrder};
use arxiv_crawler::store::SearchField;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Crawl arXiv metadata into a local store and download paper PDFs.
#[derive(Parser, Debug)]
#[command(name = "arxiv-crawler")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file to load instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Database file (overrides `storage.database_path`)
    #[arg(long, global = true, value_name = "PATH")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search arXiv, store the results and download their PDFs
    Search(SearchArgs),
    /// Incrementally sync recently updated papers
    Update(UpdateArgs),
    /// Fetch papers by arXiv id
    Fetch(FetchArgs),
    /// Search the local store
    SearchLocal(SearchLocalArgs),
    /// Show store statistics
    Stats(StatsArgs),
    /// List well-known arXiv categories
    Categories(CategoriesArgs),
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CategoriesArgs {
    /// Only codes starting with this prefix, such as `cs.`
    pub prefix: Option<String>,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
}

/// Options shared by commands that download PDFs.
#[derive(Args, Debug, Clone, Default)]
pub struct DownloadArgs {
    /// Store metadata only, skip PDF downloads
    #[arg(long)]
    pub no_download: bool,

    /// Directory for downloaded PDFs (overrides `download.output_directory`)
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Maximum concurrent downloads (1-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Run failed downloads once more after the batch finishes
    #[arg(long, conflicts_with = "no_download")]
    pub retry_failed: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Keywords matched against all fields
    pub query: Option<String>,

    /// Author name
    #[arg(short, long)]
    pub author: Option<String>,

    /// Words in the title
    #[arg(short, long)]
    pub title: Option<String>,

    /// Words in the abstract
    #[arg(long = "abstract", value_name = "TEXT")]
    pub abstract_text: Option<String>,

    /// arXiv category such as cs.AI
    #[arg(short, long)]
    pub category: Option<String>,

    /// Earliest submission date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub date_from: Option<NaiveDate>,

    /// Latest submission date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub date_to: Option<NaiveDate>,

    /// Maximum number of results
    #[arg(short = 'n', long, default_value_t = 50, value_parser = clap::value_parser!(u64).range(1..=30000))]
    pub max_results: u64,

    #[arg(long, value_enum, default_value_t = SortField::Relevance)]
    pub sort_by: SortField,

    #[arg(long, value_enum, default_value_t = SortDirection::Descending)]
    pub sort_order: SortDirection,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub download: DownloadArgs,
}

impl SearchArgs {
    /// At least one search criterion is required.
    #[must_use]
    pub fn has_criteria(&self) -> bool {
        [
            &self.query,
            &self.author,
            &self.title,
            &self.abstract_text,
            &self.category,
        ]
        .iter()
        .any(|value| value.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    /// Category to sync; all categories when omitted
    #[arg(short, long)]
    pub category: Option<String>,

    /// Days to look back when no previous sync exists
    #[arg(short, long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(1..=3650))]
    pub days: u32,

    /// Ignore the saved cursor and look back `--days` days
    #[arg(long)]
    pub full: bool,

    /// Stop after this many pages
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Records per API request (defaults to `api.max_results_per_query`)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=2000))]
    pub page_size: Option<u32>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// arXiv ids such as 2301.12345 or hep-th/9901001
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub download: DownloadArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SearchLocalArgs {
    /// Words to look for
    pub query: String,

    /// Fields to search, comma separated
    #[arg(short, long, value_delimiter = ',', default_value = "title,abstract,authors")]
    pub fields: Vec<SearchField>,

    /// Restrict to a category
    #[arg(short, long)]
    pub category: Option<String>,

    /// Only papers with a downloaded PDF
    #[arg(long)]
    pub downloaded: bool,

    /// Maximum number of results
    #[arg(short = 'n', long, default_value_t = 50)]
    pub limit: u32,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    /// Print statistics as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Relevance,
    #[value(name = "updated")]
    LastUpdated,
    #[value(name = "submitted")]
    Submitted,
}

impl From<SortField> for SortBy {
    fn from(value: SortField) -> Self {
        match value {
            SortField::Relevance => Self::Relevance,
            SortField::LastUpdated => Self::LastUpdatedDate,
            SortField::Submitted => Self::SubmittedDate,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    #[value(name = "asc")]
    Ascending,
    #[value(name = "desc")]
    Descending,
}

impl From<SortDirection> for SortOrder {
    fn from(value: SortDirection) -> Self {
        match value {
            SortDirection::Ascending => Self::Ascending,
            SortDirection::Descending => Self::Descending,
        }
    }
}
