//! SQLite connection and schema management for the paper store.
//!
//! The database holds two tables, `papers` (one row per arXiv identifier)
//! and `sync_cursors` (incremental sync watermarks). Migrations live in
//! `./migrations` and are applied on every open.
//!
//! ```no_run
//! # async fn open() -> Result<(), arxiv_crawler::DbError> {
//! let db = arxiv_crawler::Database::new("arxiv_papers.db".as_ref()).await?;
//! # let _ = db;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, instrument};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite serializes writers, so a handful of connections is plenty.
const POOL_SIZE: u32 = 5;

/// Connections wait this long before returning `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure to open or prepare the paper database.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("cannot open paper database: {0}")]
    Open(#[from] sqlx::Error),

    #[error("cannot apply schema migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("cannot create directory {dir} for the paper database: {source}")]
    CreateDir {
        dir: String,
        #[source]
        source: std::io::Error,
    },
}

/// Shared handle to the paper database. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the database file at `db_path`, creating it and any missing
    /// parent directories, then brings the schema up to date.
    ///
    /// Every connection runs in WAL mode with a busy timeout so the
    /// downloader's status writes can interleave with metadata merges.
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be created, the file cannot be
    /// opened or a migration does not apply.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn new(db_path: &Path) -> Result<Self, DbError> {
        if let Some(dir) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| DbError::CreateDir {
                    dir: dir.display().to_string(),
                    source,
                })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(POOL_SIZE)
            .connect_with(options)
            .await?;

        Self::migrated(pool).await
    }

    /// Throwaway database for tests. One connection that never expires,
    /// since the data dies with it.
    ///
    /// # Errors
    ///
    /// Fails when SQLite cannot be opened or a migration does not apply.
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, DbError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, DbError> {
        MIGRATOR.run(&pool).await?;
        debug!(migrations = MIGRATOR.iter().count(), "schema up to date");
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Current `PRAGMA journal_mode`, lowercased.
    ///
    /// # Errors
    ///
    /// Fails when the pragma query fails.
    pub async fn journal_mode(&self) -> Result<String, DbError> {
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await?;
        Ok(mode.to_lowercase())
    }
}
