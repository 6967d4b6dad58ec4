use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use thiserror::Error;

const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 5;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

// Path relative to crates/mcat-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// Connection settings for the catalog database.
///
/// The pool always holds a single connection: SQLite serializes writers, and
/// every mutating operation in this crate relies on that serialization
/// instead of application-level locks.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub busy_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            busy_timeout_secs: DEFAULT_BUSY_TIMEOUT_SECS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &mcat_core::AppConfig) -> Self {
        Self {
            busy_timeout_secs: config.db_busy_timeout_secs,
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("invalid input: {0}")]
    Invalid(#[from] mcat_core::CoreError),
    #[error("corrupt row: {0}")]
    Decode(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connect to the catalog database, creating the file if it does not exist.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the URL is malformed or the connection cannot
/// be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

    SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(options)
        .await
}

/// Open a migrated, private in-memory database.
///
/// The single connection is never recycled, since dropping it would discard
/// the database.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or a migration fails.
pub async fn open_in_memory() -> Result<SqlitePool, DbError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    MIGRATOR.run(&pool).await?;
    Ok(pool)
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &SqlitePool) -> Result<usize, sqlx::migrate::MigrateError> {
    // The _sqlx_migrations table does not exist on a fresh database; treat
    // absence as zero applied.
    let applied_before: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    MIGRATOR.run(pool).await?;

    let applied_after: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    let delta = (applied_after - applied_before).max(0);
    Ok(usize::try_from(delta).unwrap_or(0))
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}


pub mod categories;
pub mod duplicates;
pub mod products;
pub mod store;

pub use categories::{
    clear_category_mappings, get_category_mapping, list_leaf_categories, upsert_category_mapping,
    upsert_platform_categories, CategoryMappingRow,
};
pub use duplicates::{list_duplicate_events, DuplicateDetector, DuplicateEvent};
pub use products::{
    apply_sync_outcome, count_dirty, fetch_dirty_batch, get_product, mark_sync_result, set_markup,
    set_price, upsert_product, ChannelSyncResult, UpsertOutcome,
};
pub use store::CatalogStore;
