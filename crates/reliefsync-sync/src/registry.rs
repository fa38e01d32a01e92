//! Per-incident sync guard
//!
//! At most one pull runs per incident; pulls of different incidents proceed
//! concurrently. The guard hands out an owned lock that is released when
//! the returned [`IncidentSyncLease`] is dropped, even if the pull panics or
//! is cancelled.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use reliefsync_core::domain::IncidentId;

use crate::SyncError;

/// Proof that the holder is the only pull running for an incident
#[derive(Debug)]
pub struct IncidentSyncLease {
    incident_id: IncidentId,
    _guard: OwnedMutexGuard<()>,
}

impl IncidentSyncLease {
    pub fn incident_id(&self) -> IncidentId {
        self.incident_id
    }
}

#[derive(Debug, Default)]
pub struct IncidentSyncGuard {
    locks: DashMap<IncidentId, Arc<Mutex<()>>>,
}

impl IncidentSyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the incident, failing fast if a pull already holds it
    pub fn try_acquire(&self, incident_id: IncidentId) -> Result<IncidentSyncLease, SyncError> {
        let lock = self
            .locks
            .entry(incident_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = lock
            .try_lock_owned()
            .map_err(|_| SyncError::AlreadyRunning(incident_id))?;

        Ok(IncidentSyncLease {
            incident_id,
            _guard: guard,
        })
    }

    pub fn is_running(&self, incident_id: IncidentId) -> bool {
        self.locks
            .get(&incident_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}
