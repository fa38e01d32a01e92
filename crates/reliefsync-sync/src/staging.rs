//! Disk staging cache for fetched pages
//!
//! Every page pulled from the server is written to disk before any of it is
//! committed to the local store. If a run is interrupted between the fetch and
//! the commit, the next run finds the staged page and skips the network
//! request. Pages are deleted once committed.
//!
//! ## Layout
//!
//! ```text
//! <staging_dir>/
//! ├── 151-full-all-0.json        # linear page 0 of incident 151
//! ├── 151-full-c3-1.json         # page 1 of grid cell 3
//! └── 151-secondary-all-4.json
//! ```
//!
//! Files are written to `<name>.tmp` and renamed into place so a crash never
//! leaves a half-written page behind.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use reliefsync_core::domain::{BoundingBox, IncidentId, SyncCategory};
use reliefsync_core::ports::RemoteError;

use crate::SyncError;

/// Identifies one staged page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageKey {
    pub incident_id: IncidentId,
    pub category: SyncCategory,
    pub page_index: u64,
    /// Target count of the epoch the page belongs to
    pub expected_count: u64,
    pub updated_after: Option<DateTime<Utc>>,
    /// Grid cell for spatial pages
    pub cell: Option<usize>,
    /// Spatial area the grid covers, `south,west,north,east` to six decimals
    pub area: Option<String>,
}

impl StageKey {
    pub fn new(
        incident_id: IncidentId,
        category: SyncCategory,
        page_index: u64,
        expected_count: u64,
    ) -> Self {
        Self {
            incident_id,
            category,
            page_index,
            expected_count,
            updated_after: None,
            cell: None,
            area: None,
        }
    }

    pub fn updated_after(mut self, updated_after: Option<DateTime<Utc>>) -> Self {
        self.updated_after = updated_after;
        self
    }

    /// Key a page of grid cell `cell` laid over `area`
    ///
    /// Cell indexes only mean something for one grid, so pages staged for an
    /// area with another center or radius never match.
    pub fn in_cell(mut self, area: &BoundingBox, cell: usize) -> Self {
        self.cell = Some(cell);
        self.area = Some(format!(
            "{:.6},{:.6},{:.6},{:.6}",
            area.south, area.west, area.north, area.east
        ));
        self
    }

    fn file_prefix(incident_id: IncidentId, category: SyncCategory) -> String {
        format!("{incident_id}-{category}-")
    }

    fn file_name(&self) -> String {
        let cell = match self.cell {
            Some(cell) => format!("c{cell}"),
            None => "all".to_string(),
        };
        format!(
            "{}{cell}-{}.json",
            Self::file_prefix(self.incident_id, self.category),
            self.page_index
        )
    }
}

/// On-disk form of a staged page
#[derive(Debug, Serialize, Deserialize)]
struct StagedPage<R> {
    requested_at: DateTime<Utc>,
    key: StageKey,
    records: Vec<R>,
}

/// Stages fetched pages on disk until they are committed
#[derive(Debug, Clone)]
pub struct PageStagingCache {
    dir: PathBuf,
    max_age: Duration,
}

impl PageStagingCache {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            max_age,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &StageKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Read a staged page
    ///
    /// Returns `None` when no page is staged, when the staged page belongs to
    /// a different epoch or delta, when it is older than `max_age`, or when
    /// it cannot be decoded. Undecodable files are removed.
    pub async fn load<R: DeserializeOwned>(&self, key: &StageKey) -> Option<Vec<R>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(_) => return None,
        };

        let page: StagedPage<R> = match serde_json::from_slice(&bytes) {
            Ok(page) => page,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding unreadable staged page");
                let _ = tokio::fs::remove_file(&path).await;
                return None;
            }
        };

        if &page.key != key {
            trace!(path = %path.display(), "Staged page belongs to another epoch");
            return None;
        }

        let age = Utc::now() - page.requested_at;
        if age.to_std().is_ok_and(|age| age > self.max_age) {
            trace!(path = %path.display(), age_secs = age.num_seconds(), "Staged page expired");
            return None;
        }

        debug!(
            incident_id = %key.incident_id,
            category = %key.category,
            page_index = key.page_index,
            records = page.records.len(),
            "Reusing staged page"
        );
        Some(page.records)
    }

    /// Return the staged page for `key`, or fetch and stage it
    pub async fn save<R, F, Fut>(&self, key: &StageKey, fetch: F) -> Result<Vec<R>, SyncError>
    where
        R: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<R>, RemoteError>>,
    {
        if let Some(records) = self.load(key).await {
            return Ok(records);
        }

        let requested_at = Utc::now();
        let records = fetch().await?;

        let page = StagedPage {
            requested_at,
            key: key.clone(),
            records,
        };
        self.write(key, &page).await?;
        Ok(page.records)
    }

    async fn write<R: Serialize>(&self, key: &StageKey, page: &StagedPage<R>) -> Result<(), SyncError> {
        let staging_err = |e: std::io::Error| SyncError::Staging(e.to_string());

        tokio::fs::create_dir_all(&self.dir).await.map_err(staging_err)?;
        let data = serde_json::to_vec(page).map_err(|e| SyncError::Staging(e.to_string()))?;

        let target = self.path_for(key);
        let mut tmp_path = target.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        tokio::fs::write(&tmp_path, &data).await.map_err(staging_err)?;
        tokio::fs::rename(&tmp_path, &target)
            .await
            .map_err(staging_err)?;

        trace!(path = %target.display(), bytes = data.len(), "Staged page");
        Ok(())
    }

    /// Remove the staged page for `key`, if any
    pub async fn delete(&self, key: &StageKey) {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => trace!(path = %path.display(), "Removed staged page"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove staged page"),
        }
    }

    /// Remove every staged page of an incident and category
    pub async fn clear_incident(&self, incident_id: IncidentId, category: SyncCategory) {
        let prefix = StageKey::file_prefix(incident_id, category);
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(_) => return,
        };

        let mut removed = 0usize;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(&prefix)
                && tokio::fs::remove_file(entry.path()).await.is_ok()
            {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(incident_id = %incident_id, category = %category, removed, "Cleared staged pages");
        }
    }
}
