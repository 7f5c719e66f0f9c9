//! SQLite connection management.
//!
//! Opens the credential store pool with foreign keys enforced and runs the
//! embedded migrations. Data lives at `$APP_DATA/portgate/portgate.db`
//! unless a `DATABASE_URL` says otherwise.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use thiserror::Error;

/// File name of the default database.
const DEFAULT_DATABASE_FILE: &str = "portgate.db";

/// How long a writer waits on SQLite's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur while opening the database.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data directory not available")]
    NoDataDir,
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DbError>;

/// Connect to the database at `url`, creating the file if missing, and
/// apply migrations.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await?;

    crate::migrate::migrate(&pool).await?;
    tracing::debug!(url, max_connections, "database ready");
    Ok(pool)
}

/// Open a private in-memory database with migrations applied.
///
/// The pool is pinned to one connection because every SQLite in-memory
/// connection is a separate database.
pub async fn memory_pool() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    crate::migrate::migrate(&pool).await?;
    Ok(pool)
}

/// Connection URL for the default on-disk database.
pub fn default_database_url() -> Result<String> {
    let dir = default_data_dir().ok_or(DbError::NoDataDir)?;
    std::fs::create_dir_all(&dir)?;
    Ok(format!(
        "sqlite://{}?mode=rwc",
        dir.join(DEFAULT_DATABASE_FILE).display()
    ))
}

/// Returns the default data directory.
///
/// Platform paths:
/// - macOS: `~/Library/Application Support/portgate`
/// - Linux: `~/.local/share/portgate`
/// - Windows: `%APPDATA%\portgate`
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("portgate"))
}

/// Open a migrated pool on a fresh file in a temp dir.
///
/// Unlike [`memory_pool`], connections here really run side by side, so
/// races between writers are observable. The database lives as long as
/// the returned dir.
#[cfg(test)]
pub(crate) async fn file_pool(max_connections: u32) -> (tempfile::TempDir, SqlitePool) {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join(DEFAULT_DATABASE_FILE).display()
    );
    let pool = connect(&url, max_connections).await.expect("connect");
    (dir, pool)
}
