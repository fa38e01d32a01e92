//! Worksite change repository port (driven/secondary port)
//!
//! Local edits enter the store only through [`IWorksiteChangeRepository::save_change`],
//! which writes the new state and appends a change record in one
//! transaction. The remaining operations are bookkeeping hooks for the
//! uploader that drains the change log.

use crate::domain::{
    ArchiveAction, ChangeRecord, IncidentId, LocalId, OrganizationId, WorkType, Worksite,
};

/// Port trait for capturing local edits
#[async_trait::async_trait]
pub trait IWorksiteChangeRepository: Send + Sync {
    /// Persist `after` and record the edit from `before`
    ///
    /// Returns the local id of the saved worksite. When `before == after`
    /// nothing is written and `after.id` is returned.
    async fn save_change(
        &self,
        before: &Worksite,
        after: &Worksite,
        primary_work_type: Option<&WorkType>,
        organization_id: OrganizationId,
    ) -> anyhow::Result<LocalId>;

    /// Count one upload attempt for a change record
    async fn record_save_attempt(&self, change_id: i64) -> anyhow::Result<()>;

    /// Close a change record after upload
    async fn archive_change(&self, change_id: i64, action: ArchiveAction) -> anyhow::Result<()>;

    /// Change records of an incident not yet archived, oldest first
    async fn unsynced_changes(&self, incident_id: IncidentId) -> anyhow::Result<Vec<ChangeRecord>>;

    /// Every change record of one worksite, oldest first
    async fn changes_for_worksite(&self, worksite_id: LocalId)
        -> anyhow::Result<Vec<ChangeRecord>>;
}
