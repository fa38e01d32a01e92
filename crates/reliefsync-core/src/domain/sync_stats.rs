//! Per-incident sync bookkeeping
//!
//! Each incident keeps one [`SyncStats`] row per [`SyncCategory`]. A row
//! describes one sync *epoch* (identified by `sync_start`): how many records
//! the server reported, how many were paged in so far, and when the last
//! attempt and the last success happened. Pagination resumes from these
//! values after an interruption.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::geo::Coordinates;
use super::newtypes::IncidentId;

/// Data version for the short (core + work types) payload
pub const SHORT_DATA_VERSION: i64 = 1;

/// Data version for the full case payload
pub const FULL_DATA_VERSION: i64 = 1;

/// Data version for the secondary (flags + form data) payload
///
/// Bumping this forces every device to drop its secondary stats and pull the
/// secondary data again from scratch.
pub const SECONDARY_DATA_VERSION: i64 = 2;

// ============================================================================
// SyncCategory
// ============================================================================

/// The independent pulls tracked per incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCategory {
    /// Core fields and work types only
    Short,
    /// Complete cases with notes, flags and form data
    Full,
    /// Flags and form data for every case in the incident
    Secondary,
}

impl SyncCategory {
    pub const ALL: [SyncCategory; 3] = [
        SyncCategory::Short,
        SyncCategory::Full,
        SyncCategory::Secondary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncCategory::Short => "short",
            SyncCategory::Full => "full",
            SyncCategory::Secondary => "secondary",
        }
    }

    /// Data version a stats row must carry to be resumable
    pub fn current_data_version(&self) -> i64 {
        match self {
            SyncCategory::Short => SHORT_DATA_VERSION,
            SyncCategory::Full => FULL_DATA_VERSION,
            SyncCategory::Secondary => SECONDARY_DATA_VERSION,
        }
    }
}

impl fmt::Display for SyncCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short" => Ok(SyncCategory::Short),
            "full" => Ok(SyncCategory::Full),
            "secondary" => Ok(SyncCategory::Secondary),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown sync category '{other}'"
            ))),
        }
    }
}

// ============================================================================
// SyncStats
// ============================================================================

/// How the current epoch walks the server's records
///
/// Stored with the stats so an interrupted epoch is resumed the way it was
/// started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochKind {
    /// Every record, page by page in id order
    #[default]
    Paged,
    /// Grid cells around a center
    Spatial,
    /// Records updated after the previous success
    Delta,
}

impl EpochKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpochKind::Paged => "paged",
            EpochKind::Spatial => "spatial",
            EpochKind::Delta => "delta",
        }
    }
}

impl FromStr for EpochKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paged" => Ok(EpochKind::Paged),
            "spatial" => Ok(EpochKind::Spatial),
            "delta" => Ok(EpochKind::Delta),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown epoch kind '{other}'"
            ))),
        }
    }
}

/// Resume point of a spatial-bounded sync
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundedSyncState {
    pub center: Coordinates,
    pub radius_km: f64,
    /// Index of the next grid cell to fetch
    pub cell_index: usize,
    /// Records fetched across all cells of this epoch
    pub fetched_count: u64,
}

impl BoundedSyncState {
    pub fn new(center: Coordinates, radius_km: f64) -> Self {
        Self {
            center,
            radius_km,
            cell_index: 0,
            fetched_count: 0,
        }
    }
}

/// Sync statistics for one incident and category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    pub incident_id: IncidentId,
    pub category: SyncCategory,
    /// Start of the current epoch
    pub sync_start: DateTime<Utc>,
    pub epoch: EpochKind,
    /// Record count the server reported for this epoch
    pub target_count: u64,
    /// Records paged in during this epoch; never decreases within an epoch
    pub paged_count: u64,
    /// `sync_start` of the last epoch that completed
    pub successful_sync: Option<DateTime<Utc>>,
    pub attempted_sync: Option<DateTime<Utc>>,
    /// Attempts since the last success
    pub attempted_counter: u32,
    pub app_build_version: i64,
    pub data_version: i64,
    pub bounded: Option<BoundedSyncState>,
}

impl SyncStats {
    /// Fresh stats for an incident that was never synced in this category
    pub fn new(
        incident_id: IncidentId,
        category: SyncCategory,
        app_build_version: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            incident_id,
            category,
            sync_start: now,
            epoch: EpochKind::Paged,
            target_count: 0,
            paged_count: 0,
            successful_sync: None,
            attempted_sync: None,
            attempted_counter: 0,
            app_build_version,
            data_version: category.current_data_version(),
            bounded: None,
        }
    }

    /// Begin a new epoch, resetting paging progress
    pub fn start_epoch(&mut self, now: DateTime<Utc>, target_count: u64, epoch: EpochKind) {
        self.sync_start = now;
        self.epoch = epoch;
        self.target_count = target_count;
        self.paged_count = 0;
        self.bounded = None;
    }

    /// Record paging progress; lower values are ignored
    pub fn record_page(&mut self, paged_count: u64) {
        if paged_count > self.paged_count {
            self.paged_count = paged_count;
        }
    }

    pub fn record_attempt(&mut self, now: DateTime<Utc>) {
        self.attempted_sync = Some(now);
        self.attempted_counter = self.attempted_counter.saturating_add(1);
    }

    /// Mark the current epoch successful
    ///
    /// Only applies once every target record was paged; returns whether the
    /// stats changed.
    pub fn mark_successful(&mut self) -> bool {
        if self.paged_count < self.target_count {
            return false;
        }
        self.successful_sync = Some(self.sync_start);
        self.attempted_counter = 0;
        true
    }

    /// Mark a spatial sync converged, pinning the target to what was fetched
    pub fn mark_converged(&mut self) {
        self.target_count = self.paged_count;
        self.mark_successful();
    }

    pub fn is_synced(&self) -> bool {
        self.successful_sync.is_some() && self.paged_count >= self.target_count
    }

    /// Kind of the current epoch if it was started and has not completed
    ///
    /// Paged and delta epochs count once they paged something. Spatial
    /// epochs always count: they resume at `bounded.cell_index`, or recount
    /// the area when `bounded` was cleared.
    pub fn unfinished_epoch(&self) -> Option<EpochKind> {
        if self.is_synced() {
            return None;
        }
        match self.epoch {
            EpochKind::Spatial => Some(EpochKind::Spatial),
            _ if self.paged_count > 0 => Some(self.epoch),
            _ => None,
        }
    }

    /// Stats written by an older payload format cannot be resumed
    pub fn is_current_version(&self) -> bool {
        self.data_version >= self.category.current_data_version()
    }

    /// Page index to resume a linear pull from
    pub fn resume_page_index(&self, page_size: u32) -> u64 {
        if page_size == 0 {
            return 0;
        }
        self.paged_count / u64::from(page_size)
    }

    /// Seconds since the last successful sync, if any
    pub fn seconds_since_success(&self, now: DateTime<Utc>) -> Option<i64> {
        self.successful_sync
            .map(|success| (now - success).num_seconds())
    }
}

// ============================================================================
// ProgressStats
// ============================================================================

/// Read-only progress snapshot published while a pull runs
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressStats {
    /// Phase name, e.g. `"full"` or `"secondary"`
    pub name: String,
    pub pulled_count: u64,
    pub total_count: u64,
    /// True when `total_count` is an estimate (spatial syncs)
    pub is_approximate: bool,
}

impl ProgressStats {
    pub fn new(name: impl Into<String>, pulled_count: u64, total_count: u64) -> Self {
        Self {
            name: name.into(),
            pulled_count,
            total_count,
            is_approximate: false,
        }
    }

    pub fn approximate(mut self) -> Self {
        self.is_approximate = true;
        self
    }

    /// Completed fraction in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        (self.pulled_count as f64 / self.total_count as f64).min(1.0)
    }
}
