//! ReliefSync Cache - Local store persistence
//!
//! SQLite-based store for:
//! - Worksites with their work types, flags, notes and form data
//! - Per-incident sync statistics
//! - The append-only change log of local edits
//! - Teams
//!
//! ## Architecture
//!
//! This crate implements the `IWorksiteRepository` and
//! `IWorksiteChangeRepository` ports from `reliefsync-core` using SQLite as
//! the storage backend. It is a driven (secondary) adapter in the hexagonal
//! architecture. Remote batches pass through the conflict guard from
//! `reliefsync-conflict` before anything is written.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteWorksiteRepository`] - Remote batch application, reads, sync stats, teams
//! - [`SqliteWorksiteChangeRepository`] - Local edits and change log bookkeeping
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use reliefsync_cache::{DatabasePool, SqliteWorksiteRepository};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/reliefsync/reliefsync.db")).await?;
//! let repo = SqliteWorksiteRepository::new(pool.pool().clone());
//! // Use repo as IWorksiteRepository...
//! # Ok(())
//! # }
//! ```

pub mod change_repository;
pub mod pool;
pub mod repository;
mod rows;

pub use change_repository::SqliteWorksiteChangeRepository;
pub use pool::{DatabasePool, SCHEMA_VERSION};
pub use repository::SqliteWorksiteRepository;

use reliefsync_core::domain::DomainError;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A write that must affect a row affected none; the transaction is
    /// rolled back
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The referenced row does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}

impl From<DomainError> for CacheError {
    fn from(e: DomainError) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}
