//! Builds library components from the effective configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use arxiv_crawler::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use arxiv_crawler::{
    ApiConfig, ArxivClient, CancelFlag, Database, DownloadEngine, HttpClient, NamingScheme,
    RecordStore, RetryPolicy, SyncEngine, Throttle,
};
use tracing::{debug, warn};

use crate::app_config::FileConfig;
use crate::cli::DownloadArgs;

/// Resolved per-invocation settings.
pub(crate) struct AppContext {
    pub config: FileConfig,
    pub database_path: PathBuf,
}

impl AppContext {
    pub(crate) fn new(config: FileConfig, database_override: Option<&Path>) -> Self {
        let database_path = database_override
            .map_or_else(|| config.storage.database_path.clone(), Path::to_path_buf);
        Self {
            config,
            database_path,
        }
    }

    pub(crate) async fn open_store(&self) -> Result<RecordStore> {
        let db = Database::new(&self.database_path).await.with_context(|| {
            format!(
                "Failed to open database '{}'",
                self.database_path.display()
            )
        })?;
        Ok(RecordStore::new(db))
    }

    /// Naming scheme rooted at `--output-dir` or the configured directory.
    pub(crate) fn naming(&self, output_override: Option<&Path>) -> NamingScheme {
        let download = &self.config.download;
        let base_dir = output_override.map_or_else(
            || download.output_directory.clone(),
            Path::to_path_buf,
        );
        NamingScheme::new(base_dir)
            .with_pattern(download.filename_pattern.clone())
            .with_category_folders(download.create_category_folders)
    }

    /// Concurrency from `--concurrency` or the configured default.
    pub(crate) fn concurrency(&self, download_args: &DownloadArgs) -> usize {
        download_args
            .concurrency
            .map_or(self.config.download.max_concurrent_downloads, usize::from)
    }

    /// Wires API client, store, download engine and naming into a sync engine.
    pub(crate) async fn sync_engine(&self, output_override: Option<&Path>) -> Result<SyncEngine> {
        let config = &self.config;
        let user_agent = config.user_agent();

        let throttle = Arc::new(Throttle::new(config.request_delay()));
        let api_config = ApiConfig {
            base_url: config.api.base_url.clone(),
            user_agent: user_agent.clone(),
            request_timeout: Duration::from_secs(config.api.timeout),
            ..ApiConfig::default()
        };
        let client = ArxivClient::new(&api_config, throttle, RetryPolicy::default())
            .context("Failed to build arXiv API client")?;

        let http = HttpClient::new(
            &user_agent,
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
        .context("Failed to build download client")?;
        // `retry_attempts` counts retries after the first attempt.
        let retry_policy = RetryPolicy::with_max_attempts(config.download.retry_attempts + 1);
        let downloads = DownloadEngine::new(
            http,
            retry_policy,
            Duration::from_secs(config.download.timeout),
        );

        let store = self.open_store().await?;
        let naming = self.naming(output_override);
        debug!(
            base_url = %api_config.base_url,
            database = %self.database_path.display(),
            output_dir = %naming.base_dir.display(),
            "engine configured"
        );

        Ok(
            SyncEngine::new(Arc::new(client), store, downloads, naming)
                .with_page_size(config.api.max_results_per_query),
        )
    }
}

/// Cancels `flag` on the first Ctrl-C.
///
/// Transfers already running finish; nothing new starts.
pub(crate) fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight downloads");
            signal.cancel();
        }
    });
    cancel
}
