//! Integration tests for DatabasePool schema management

use tempfile::TempDir;

use reliefsync_cache::{CacheError, DatabasePool, SqliteWorksiteRepository, SCHEMA_VERSION};
use reliefsync_core::domain::{IncidentId, SyncCategory, SyncStats};
use reliefsync_core::ports::IWorksiteRepository;

fn incident() -> IncidentId {
    IncidentId::new(151).unwrap()
}

#[tokio::test]
async fn test_fresh_store_is_stamped() {
    let pool = DatabasePool::in_memory().await.unwrap();
    assert_eq!(pool.schema_version().await.unwrap(), SCHEMA_VERSION);

    let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
        .fetch_one(pool.pool())
        .await
        .unwrap();
    assert_eq!(foreign_keys, 1);
}

#[tokio::test]
async fn test_reopening_keeps_data() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("reliefsync.db");

    {
        let pool = DatabasePool::new(&path).await.unwrap();
        let repo = SqliteWorksiteRepository::new(pool.pool().clone());
        let stats = SyncStats::new(incident(), SyncCategory::Short, 230, chrono::Utc::now());
        repo.save_sync_stats(&stats).await.unwrap();
        pool.pool().close().await;
    }

    let pool = DatabasePool::new(&path).await.unwrap();
    assert_eq!(pool.schema_version().await.unwrap(), SCHEMA_VERSION);
    let repo = SqliteWorksiteRepository::new(pool.pool().clone());
    assert_eq!(repo.list_sync_stats(incident()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_newer_schema_is_refused() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reliefsync.db");

    {
        let pool = DatabasePool::new(&path).await.unwrap();
        let bump = format!("PRAGMA user_version = {}", SCHEMA_VERSION + 1);
        sqlx::raw_sql(&bump).execute(pool.pool()).await.unwrap();
        pool.pool().close().await;
    }

    let result = DatabasePool::new(&path).await;
    assert!(matches!(result, Err(CacheError::MigrationFailed(_))));
}
