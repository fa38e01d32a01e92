//! Shared state handed to every syncer

use std::sync::Arc;

use chrono::Utc;

use reliefsync_core::config::SyncConfig;
use reliefsync_core::domain::{IncidentId, SyncCategory, SyncStats};
use reliefsync_core::ports::{IRemoteDataSource, IWorksiteRepository, RemoteError};

use crate::progress::ProgressPublisher;
use crate::staging::PageStagingCache;
use crate::SyncError;

#[derive(Clone)]
pub struct SyncContext {
    pub remote: Arc<dyn IRemoteDataSource>,
    pub store: Arc<dyn IWorksiteRepository>,
    pub staging: Arc<PageStagingCache>,
    pub progress: ProgressPublisher,
    pub config: Arc<SyncConfig>,
    pub app_build_version: i64,
}

impl SyncContext {
    /// Stored stats for `category`, or fresh stats if none are usable
    ///
    /// Stats written by an older payload format are deleted together with
    /// their staged pages, forcing a clean pull.
    pub async fn load_stats(
        &self,
        incident_id: IncidentId,
        category: SyncCategory,
    ) -> Result<SyncStats, SyncError> {
        let fresh = || SyncStats::new(incident_id, category, self.app_build_version, Utc::now());

        match self.store.get_sync_stats(incident_id, category).await? {
            Some(stats) if stats.is_current_version() => Ok(stats),
            Some(stats) => {
                tracing::info!(
                    incident_id = %incident_id,
                    category = %category,
                    stored_version = stats.data_version,
                    current_version = category.current_data_version(),
                    "Discarding sync stats from an older data version"
                );
                self.store.delete_sync_stats(incident_id, category).await?;
                self.staging.clear_incident(incident_id, category).await;
                Ok(fresh())
            }
            None => Ok(fresh()),
        }
    }

    pub async fn save_stats(&self, stats: &SyncStats) -> Result<(), SyncError> {
        self.store.save_sync_stats(stats).await?;
        Ok(())
    }

    /// Record the attempt that failed with `error` and save the stats
    ///
    /// A transient error yields the reason to report as incomplete; any
    /// other error is returned once the attempt is stored.
    pub async fn record_failure(
        &self,
        stats: &mut SyncStats,
        error: RemoteError,
    ) -> Result<String, SyncError> {
        let transient = error.is_transient();
        tracing::warn!(
            incident_id = %stats.incident_id,
            category = %stats.category,
            error = %error,
            transient,
            "Pull attempt failed"
        );
        stats.record_attempt(Utc::now());
        self.save_stats(stats).await?;
        if transient {
            Ok(error.to_string())
        } else {
            Err(error.into())
        }
    }
}
