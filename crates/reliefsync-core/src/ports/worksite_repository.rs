//! Worksite repository port (driven/secondary port)
//!
//! This module defines the interface for the local store: applying remote
//! batches, reading worksites back, and persisting per-incident sync
//! statistics and teams.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific and
//!   don't need domain-level classification.
//! - Batch upserts are all-or-nothing. A record whose local copy was edited
//!   on the device is skipped, not reported as an error; the
//!   [`CommitOutcome`] says how many were skipped.
//! - `expected` maps carry the `local_modified_at` values read before the
//!   batch was prepared. Implementations must compare them again at write
//!   time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::{
    BoundingBox, IncidentId, LocalId, LocalModifiedState, NetworkId, SyncCategory, SyncStats,
    Team, Worksite, WorksiteRoot,
};
use crate::ports::remote_data_source::{
    NetworkFlagsFormData, NetworkTeam, NetworkWorksite, RecordShape,
};

/// Result of applying one batch of remote records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// Records left untouched because the local copy is newer or edited
    pub skipped: usize,
}

impl CommitOutcome {
    pub fn applied(&self) -> usize {
        self.inserted + self.updated
    }

    pub fn total(&self) -> usize {
        self.applied() + self.skipped
    }

    /// Accumulate another batch into this outcome
    pub fn merge(&mut self, other: CommitOutcome) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

/// Port trait for the local worksite store
#[async_trait::async_trait]
pub trait IWorksiteRepository: Send + Sync {
    // --- Conflict guard inputs ---

    /// Current modification state of the given worksites, keyed by network id
    ///
    /// Worksites not present locally are absent from the map.
    async fn local_modified_states(
        &self,
        incident_id: IncidentId,
        network_ids: &[NetworkId],
    ) -> anyhow::Result<HashMap<NetworkId, LocalModifiedState>>;

    // --- Remote batch application ---

    /// Apply a batch of worksites in one transaction
    ///
    /// With [`RecordShape::Short`] only core fields and work types are
    /// written; notes, flags and form data keep their stored values.
    async fn upsert_worksites(
        &self,
        incident_id: IncidentId,
        shape: RecordShape,
        records: &[NetworkWorksite],
        expected: &HashMap<NetworkId, LocalModifiedState>,
        synced_at: DateTime<Utc>,
    ) -> anyhow::Result<CommitOutcome>;

    /// Apply a batch of flags and form data in one transaction
    ///
    /// Worksites that are not stored locally are skipped.
    async fn upsert_flags_form_data(
        &self,
        incident_id: IncidentId,
        records: &[NetworkFlagsFormData],
        expected: &HashMap<NetworkId, LocalModifiedState>,
        synced_at: DateTime<Utc>,
    ) -> anyhow::Result<CommitOutcome>;

    // --- Reads ---

    async fn get_worksite(&self, id: LocalId) -> anyhow::Result<Option<Worksite>>;

    async fn get_worksite_by_network_id(
        &self,
        incident_id: IncidentId,
        network_id: NetworkId,
    ) -> anyhow::Result<Option<Worksite>>;

    async fn get_worksite_root(&self, id: LocalId) -> anyhow::Result<Option<WorksiteRoot>>;

    /// Worksites of an incident whose location lies inside `bounds`
    async fn worksites_in_bounds(
        &self,
        incident_id: IncidentId,
        bounds: &BoundingBox,
    ) -> anyhow::Result<Vec<Worksite>>;

    async fn count_worksites(&self, incident_id: IncidentId) -> anyhow::Result<u64>;

    // --- Sync statistics ---

    async fn get_sync_stats(
        &self,
        incident_id: IncidentId,
        category: SyncCategory,
    ) -> anyhow::Result<Option<SyncStats>>;

    async fn save_sync_stats(&self, stats: &SyncStats) -> anyhow::Result<()>;

    async fn delete_sync_stats(
        &self,
        incident_id: IncidentId,
        category: SyncCategory,
    ) -> anyhow::Result<()>;

    async fn list_sync_stats(&self, incident_id: IncidentId) -> anyhow::Result<Vec<SyncStats>>;

    // --- Teams ---

    /// Apply pulled teams; locally modified teams are skipped
    async fn upsert_teams(
        &self,
        incident_id: IncidentId,
        teams: &[NetworkTeam],
        synced_at: DateTime<Utc>,
    ) -> anyhow::Result<CommitOutcome>;

    async fn list_teams(&self, incident_id: IncidentId) -> anyhow::Result<Vec<Team>>;
}
