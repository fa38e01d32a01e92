//! SQLite pool for the local worksite store
//!
//! The store is written by the pull pipeline one batch transaction at a
//! time while the CLI and the change log read and write alongside it, so
//! every connection is opened with:
//!
//! - WAL journaling, `synchronous = NORMAL`
//! - foreign keys on (work types, flags, notes and form data cascade with
//!   their worksite)
//! - a busy timeout long enough to wait out one batch commit
//!
//! The schema version lives in `PRAGMA user_version`. A fresh database is
//! migrated and stamped; a database stamped by a newer build is refused
//! rather than written with an older schema.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::CacheError;

/// Version stamped into `PRAGMA user_version` by [`SCHEMA_SQL`]
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = include_str!("migrations/20261016_initial.sql");

/// A commit of `commit_batch_size` worksites with their sub-entities holds
/// the write lock for the whole transaction
const BUSY_TIMEOUT: Duration = Duration::from_secs(15);

/// One writer (the pull pipeline) plus readers
const MAX_CONNECTIONS: u32 = 4;

pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Open (creating if needed) the store at `db_path`
    ///
    /// # Errors
    ///
    /// `CacheError::ConnectionFailed` if the file cannot be opened, or
    /// `CacheError::MigrationFailed` if the schema cannot be brought to
    /// [`SCHEMA_VERSION`].
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = Self::store_options(SqliteConnectOptions::new().filename(db_path))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to connect to database at {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        let version = Self::migrate(&pool).await?;
        tracing::info!(path = %db_path.display(), schema_version = version, "Worksite store opened");

        Ok(Self { pool })
    }

    /// A private in-memory store
    ///
    /// In-memory databases are per connection, so the pool holds exactly one.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            CacheError::ConnectionFailed(format!("Invalid in-memory database URL: {}", e))
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(Self::store_options(options))
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("Failed to create in-memory database: {}", e))
            })?;

        Self::migrate(&pool).await?;
        tracing::debug!("In-memory worksite store opened");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Schema version stamped in the database
    pub async fn schema_version(&self) -> Result<i64, CacheError> {
        Self::read_version(&self.pool).await
    }

    fn store_options(options: SqliteConnectOptions) -> SqliteConnectOptions {
        options
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
    }

    async fn read_version(pool: &SqlitePool) -> Result<i64, CacheError> {
        sqlx::query_scalar::<_, i64>("PRAGMA user_version")
            .fetch_one(pool)
            .await
            .map_err(|e| CacheError::MigrationFailed(format!("Failed to read schema version: {}", e)))
    }

    /// Bring the schema to [`SCHEMA_VERSION`]; returns the resulting version
    async fn migrate(pool: &SqlitePool) -> Result<i64, CacheError> {
        match Self::read_version(pool).await? {
            SCHEMA_VERSION => Ok(SCHEMA_VERSION),
            0 => {
                let script = format!("{SCHEMA_SQL}\nPRAGMA user_version = {SCHEMA_VERSION};");
                sqlx::raw_sql(&script).execute(pool).await.map_err(|e| {
                    CacheError::MigrationFailed(format!("Failed to create worksite schema: {}", e))
                })?;
                tracing::debug!(schema_version = SCHEMA_VERSION, "Worksite schema created");
                Ok(SCHEMA_VERSION)
            }
            found => Err(CacheError::MigrationFailed(format!(
                "Database schema version {found} is not supported (expected {SCHEMA_VERSION})"
            ))),
        }
    }
}
