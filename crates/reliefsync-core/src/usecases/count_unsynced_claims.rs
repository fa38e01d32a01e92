//! Unsynced claim counting use case
//!
//! Walks the pending change log of an incident and counts how many work
//! types the organization claimed (and closed) on this device since the last
//! upload. Used to warn a volunteer before they sign out with pending claims.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::domain::{
    ChangeRecord, IncidentId, LocalId, OrganizationId, WorksiteChange, WorksiteSnapshot,
};
use crate::ports::IWorksiteChangeRepository;

/// Claims and closes found in the change log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClaimCloseCounts {
    pub claim_count: usize,
    pub close_count: usize,
}

/// Use case for counting unsynced claims of one organization
pub struct CountUnsyncedClaimsUseCase {
    changes: Arc<dyn IWorksiteChangeRepository>,
}

impl CountUnsyncedClaimsUseCase {
    pub fn new(changes: Arc<dyn IWorksiteChangeRepository>) -> Self {
        Self { changes }
    }

    /// Count claim transitions into `org_id` across unsynced changes
    ///
    /// Worksites listed in `ignore_ids` are excluded.
    pub async fn execute(
        &self,
        org_id: OrganizationId,
        incident_id: IncidentId,
        ignore_ids: &HashSet<LocalId>,
    ) -> Result<ClaimCloseCounts> {
        let records = self
            .changes
            .unsynced_changes(incident_id)
            .await
            .context("Failed to load unsynced changes")?;

        let counts = count_claims(&records, org_id, ignore_ids)?;
        debug!(
            incident = %incident_id,
            claims = counts.claim_count,
            closes = counts.close_count,
            "Counted unsynced claims"
        );
        Ok(counts)
    }
}

/// Count claims over already-loaded records (oldest first)
pub fn count_claims(
    records: &[ChangeRecord],
    org_id: OrganizationId,
    ignore_ids: &HashSet<LocalId>,
) -> Result<ClaimCloseCounts> {
    // worksite -> (baseline, latest)
    let mut per_worksite: BTreeMap<LocalId, (WorksiteSnapshot, WorksiteSnapshot)> =
        BTreeMap::new();

    for record in records {
        if ignore_ids.contains(&record.worksite_id) {
            continue;
        }
        let change: WorksiteChange = record
            .decode()
            .with_context(|| format!("Failed to decode change record {}", record.id))?;

        per_worksite
            .entry(record.worksite_id)
            .and_modify(|(_, latest)| *latest = change.change.clone())
            .or_insert_with(|| (change.baseline().clone(), change.change.clone()));
    }

    let mut counts = ClaimCloseCounts::default();
    for (baseline, latest) in per_worksite.values() {
        for start in &baseline.work_types {
            let Some(current) = latest.work_type(&start.work_type) else {
                continue;
            };
            let claimed_now = current.org_claim == Some(org_id);
            if start.org_claim != Some(org_id) && claimed_now {
                counts.claim_count += 1;
                if current.status.is_closed() {
                    counts.close_count += 1;
                }
            }
        }
    }
    Ok(counts)
}
