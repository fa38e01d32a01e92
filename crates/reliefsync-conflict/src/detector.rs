//! Conflict detection logic
//!
//! Decides whether a remote record may replace the locally stored copy of
//! a worksite. The decision made here is the read-time half of the guard;
//! the store repeats the `local_modified_at` comparison inside its write
//! (`UPDATE … WHERE id = ? AND local_modified_at IS ?`) so an edit landing
//! between read and write still wins.

use chrono::{DateTime, Utc};
use reliefsync_core::domain::{LocalId, LocalModifiedState, NetworkId};
use reliefsync_core::ports::RecordShape;
use tracing::debug;

/// Outcome of checking one incoming record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    /// Not stored locally yet
    Insert,
    /// Newer than the local copy; write only if `local_modified_at` still
    /// equals `expected_local_modified_at`
    Apply {
        id: LocalId,
        expected_local_modified_at: DateTime<Utc>,
    },
    /// The device holds unsynced edits for this record
    SkipLocallyModified,
    /// The local copy is as new as, or newer than, the incoming record
    SkipStale,
    /// Secondary data for a worksite that is not stored locally
    SkipMissing,
}

impl UpdateDecision {
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            UpdateDecision::SkipLocallyModified
                | UpdateDecision::SkipStale
                | UpdateDecision::SkipMissing
        )
    }
}

/// Detects conflicts between local and remote worksite versions
pub struct ConflictDetector;

impl ConflictDetector {
    /// Checks whether a remote worksite may be applied
    ///
    /// `local` is the state read before the batch was prepared (`None` when
    /// the record is not stored). A stored record is replaced only if it has
    /// no unsynced local edits and `incoming_updated_at` is strictly later
    /// than its `local_modified_at`. A full payload may also replace a
    /// short-only copy of the same version. Timestamps compare at
    /// millisecond precision, the precision of the store.
    pub fn check_remote_update(
        network_id: NetworkId,
        local: Option<&LocalModifiedState>,
        incoming_updated_at: DateTime<Utc>,
        shape: RecordShape,
    ) -> UpdateDecision {
        let Some(local) = local else {
            return UpdateDecision::Insert;
        };

        if local.is_local_modified {
            debug!(
                network_id = %network_id,
                local_id = %local.id,
                "Skipping remote update, local edits pending"
            );
            return UpdateDecision::SkipLocallyModified;
        }

        let incoming = incoming_updated_at.timestamp_millis();
        let stored = local.local_modified_at.timestamp_millis();
        let completes_short_copy = shape == RecordShape::Full && !local.has_full_payload;
        let is_newer = incoming > stored || (completes_short_copy && incoming == stored);

        if !is_newer {
            debug!(
                network_id = %network_id,
                local_id = %local.id,
                incoming = %incoming_updated_at,
                stored = %local.local_modified_at,
                "Skipping remote update, local copy is not older"
            );
            return UpdateDecision::SkipStale;
        }

        UpdateDecision::Apply {
            id: local.id,
            expected_local_modified_at: local.local_modified_at,
        }
    }

    /// Checks whether secondary data (flags, form data) may be applied
    ///
    /// Secondary payloads belong to the version already stored, so only the
    /// presence and local-edit checks apply.
    pub fn check_secondary_update(
        network_id: NetworkId,
        local: Option<&LocalModifiedState>,
    ) -> UpdateDecision {
        let Some(local) = local else {
            debug!(network_id = %network_id, "Skipping secondary data, worksite not stored");
            return UpdateDecision::SkipMissing;
        };

        if local.is_local_modified {
            debug!(
                network_id = %network_id,
                local_id = %local.id,
                "Skipping secondary data, local edits pending"
            );
            return UpdateDecision::SkipLocallyModified;
        }

        UpdateDecision::Apply {
            id: local.id,
            expected_local_modified_at: local.local_modified_at,
        }
    }

    /// Whether a pulled team may replace the stored one
    ///
    /// Teams edited on the device are left alone until uploaded.
    pub fn should_sync_team(is_local_modified: bool) -> bool {
        !is_local_modified
    }
}
