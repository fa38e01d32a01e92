//! Change log types
//!
//! Every local edit of a worksite is captured as a [`ChangeRecord`] whose
//! payload is a serialized [`WorksiteChange`]: the snapshot before the edit
//! (absent for creations) and the snapshot after it. Snapshots carry network
//! ids translated through an [`IdReconciliationMap`], so the uploader can tell
//! server-known sub-entities from new ones (`network_id == -1`).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{IncidentId, LocalId, NetworkId, OrganizationId};
use super::worksite::{
    FormDataValue, WorkType, WorkTypeStatus, Worksite, WorksiteFlag, WorksiteNote,
};

/// Version of the serialized [`WorksiteChange`] layout
pub const CHANGE_MODEL_VERSION: i32 = 3;

// ============================================================================
// IdReconciliationMap
// ============================================================================

/// Local id → network id lookup for the sub-entities of one worksite
///
/// Built per edit from the local store. Only sub-entities the server already
/// knows appear in the map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdReconciliationMap {
    pub flags: HashMap<LocalId, NetworkId>,
    pub notes: HashMap<LocalId, NetworkId>,
    pub work_types: HashMap<LocalId, NetworkId>,
}

impl IdReconciliationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag_network_id(&self, id: LocalId) -> NetworkId {
        self.flags.get(&id).copied().unwrap_or(NetworkId::UNASSIGNED)
    }

    pub fn note_network_id(&self, id: LocalId) -> NetworkId {
        self.notes.get(&id).copied().unwrap_or(NetworkId::UNASSIGNED)
    }

    pub fn work_type_network_id(&self, id: LocalId) -> NetworkId {
        self.work_types
            .get(&id)
            .copied()
            .unwrap_or(NetworkId::UNASSIGNED)
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty() && self.notes.is_empty() && self.work_types.is_empty()
    }
}

// ============================================================================
// Snapshots
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagSnapshot {
    pub local_id: LocalId,
    pub network_id: NetworkId,
    pub created_at: Option<DateTime<Utc>>,
    pub is_high_priority: bool,
    pub notes: String,
    pub reason_t: String,
    pub requested_action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSnapshot {
    pub local_id: LocalId,
    pub network_id: NetworkId,
    pub created_at: Option<DateTime<Utc>>,
    pub is_survivor: bool,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkTypeSnapshot {
    pub local_id: LocalId,
    pub network_id: NetworkId,
    pub created_at: Option<DateTime<Utc>>,
    pub org_claim: Option<OrganizationId>,
    pub next_recur_at: Option<DateTime<Utc>>,
    pub phase: Option<i32>,
    pub recur: Option<String>,
    pub status: WorkTypeStatus,
    pub work_type: String,
}

impl WorkTypeSnapshot {
    fn capture(work_type: &WorkType, ids: &IdReconciliationMap) -> Self {
        Self {
            local_id: work_type.id,
            network_id: ids.work_type_network_id(work_type.id),
            created_at: work_type.created_at,
            org_claim: work_type.org_claim,
            next_recur_at: work_type.next_recur_at,
            phase: work_type.phase,
            recur: work_type.recur.clone(),
            status: work_type.status,
            work_type: work_type.work_type.clone(),
        }
    }

    fn restore(&self) -> WorkType {
        WorkType {
            id: self.local_id,
            network_id: self.network_id,
            created_at: self.created_at,
            org_claim: self.org_claim,
            next_recur_at: self.next_recur_at,
            phase: self.phase,
            recur: self.recur.clone(),
            status: self.status,
            work_type: self.work_type.clone(),
        }
    }
}

/// Case-level fields of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreSnapshot {
    pub id: LocalId,
    pub network_id: NetworkId,
    pub incident_id: IncidentId,
    pub address: String,
    pub case_number: String,
    pub city: String,
    pub county: String,
    pub created_at: Option<DateTime<Utc>>,
    pub email: Option<String>,
    pub key_work_type: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    pub phone1: String,
    pub postal_code: String,
    pub state: String,
    pub svi: Option<f32>,
    pub updated_at: Option<DateTime<Utc>>,
    pub what3words: Option<String>,
    pub form_data: BTreeMap<String, FormDataValue>,
}

/// Complete state of a worksite at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorksiteSnapshot {
    pub core: CoreSnapshot,
    pub flags: Vec<FlagSnapshot>,
    pub notes: Vec<NoteSnapshot>,
    pub work_types: Vec<WorkTypeSnapshot>,
}

impl WorksiteSnapshot {
    /// Capture a worksite, translating sub-entity ids through `ids`
    pub fn capture(worksite: &Worksite, ids: &IdReconciliationMap) -> Self {
        let core = CoreSnapshot {
            id: worksite.id,
            network_id: worksite.network_id,
            incident_id: worksite.incident_id,
            address: worksite.address.clone(),
            case_number: worksite.case_number.clone(),
            city: worksite.city.clone(),
            county: worksite.county.clone(),
            created_at: worksite.created_at,
            email: worksite.email.clone(),
            key_work_type: worksite.key_work_type.clone(),
            latitude: worksite.latitude,
            longitude: worksite.longitude,
            name: worksite.name.clone(),
            phone1: worksite.phone1.clone(),
            postal_code: worksite.postal_code.clone(),
            state: worksite.state.clone(),
            svi: worksite.svi,
            updated_at: worksite.updated_at,
            what3words: worksite.what3words.clone(),
            form_data: worksite.form_data.clone(),
        };

        let flags = worksite
            .flags
            .iter()
            .map(|flag| FlagSnapshot {
                local_id: flag.id,
                network_id: ids.flag_network_id(flag.id),
                created_at: flag.created_at,
                is_high_priority: flag.is_high_priority,
                notes: flag.notes.clone(),
                reason_t: flag.reason_t.clone(),
                requested_action: flag.requested_action.clone(),
            })
            .collect();

        let notes = worksite
            .notes
            .iter()
            .map(|note| NoteSnapshot {
                local_id: note.id,
                network_id: ids.note_network_id(note.id),
                created_at: note.created_at,
                is_survivor: note.is_survivor,
                note: note.note.clone(),
            })
            .collect();

        let work_types = worksite
            .work_types
            .iter()
            .map(|wt| WorkTypeSnapshot::capture(wt, ids))
            .collect();

        Self {
            core,
            flags,
            notes,
            work_types,
        }
    }

    /// Rebuild the worksite this snapshot was captured from
    pub fn to_worksite(&self) -> Worksite {
        let core = &self.core;
        Worksite {
            id: core.id,
            network_id: core.network_id,
            incident_id: core.incident_id,
            address: core.address.clone(),
            case_number: core.case_number.clone(),
            city: core.city.clone(),
            county: core.county.clone(),
            created_at: core.created_at,
            email: core.email.clone(),
            key_work_type: core.key_work_type.clone(),
            latitude: core.latitude,
            longitude: core.longitude,
            name: core.name.clone(),
            phone1: core.phone1.clone(),
            postal_code: core.postal_code.clone(),
            state: core.state.clone(),
            svi: core.svi,
            updated_at: core.updated_at,
            what3words: core.what3words.clone(),
            form_data: core.form_data.clone(),
            flags: self
                .flags
                .iter()
                .map(|f| WorksiteFlag {
                    id: f.local_id,
                    network_id: f.network_id,
                    created_at: f.created_at,
                    is_high_priority: f.is_high_priority,
                    notes: f.notes.clone(),
                    reason_t: f.reason_t.clone(),
                    requested_action: f.requested_action.clone(),
                })
                .collect(),
            notes: self
                .notes
                .iter()
                .map(|n| WorksiteNote {
                    id: n.local_id,
                    network_id: n.network_id,
                    created_at: n.created_at,
                    is_survivor: n.is_survivor,
                    note: n.note.clone(),
                })
                .collect(),
            work_types: self.work_types.iter().map(WorkTypeSnapshot::restore).collect(),
        }
    }

    pub fn work_type(&self, literal: &str) -> Option<&WorkTypeSnapshot> {
        self.work_types.iter().find(|wt| wt.work_type == literal)
    }
}

// ============================================================================
// WorksiteChange
// ============================================================================

/// Payload of a change record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorksiteChange {
    /// State before the edit; `None` when the edit created the worksite
    pub start: Option<WorksiteSnapshot>,
    pub change: WorksiteSnapshot,
    pub primary_work_type: Option<WorkTypeSnapshot>,
}

impl WorksiteChange {
    pub fn new(
        before: &Worksite,
        after: &Worksite,
        primary_work_type: Option<&WorkType>,
        ids: &IdReconciliationMap,
    ) -> Self {
        let start = if before.is_new() {
            None
        } else {
            Some(WorksiteSnapshot::capture(before, ids))
        };
        Self {
            start,
            change: WorksiteSnapshot::capture(after, ids),
            primary_work_type: primary_work_type.map(|wt| WorkTypeSnapshot::capture(wt, ids)),
        }
    }

    /// Snapshot the change was made against (the first snapshot for creations)
    pub fn baseline(&self) -> &WorksiteSnapshot {
        self.start.as_ref().unwrap_or(&self.change)
    }

    pub fn to_json(&self) -> Result<String, DomainError> {
        serde_json::to_string(self).map_err(|e| DomainError::InvalidSnapshot(e.to_string()))
    }

    pub fn from_json(data: &str) -> Result<Self, DomainError> {
        serde_json::from_str(data).map_err(|e| DomainError::InvalidSnapshot(e.to_string()))
    }
}

// ============================================================================
// ChangeRecord
// ============================================================================

/// Final disposition of an uploaded change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveAction {
    Synced,
    PartiallySynced,
    Rejected,
}

impl ArchiveAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveAction::Synced => "synced",
            ArchiveAction::PartiallySynced => "partially_synced",
            ArchiveAction::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ArchiveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(ArchiveAction::Synced),
            "partially_synced" => Ok(ArchiveAction::PartiallySynced),
            "rejected" => Ok(ArchiveAction::Rejected),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown archive action '{other}'"
            ))),
        }
    }
}

/// One row of the append-only change log
///
/// Only the upload bookkeeping (`save_attempt`, `save_attempt_at`,
/// `archive_action`) changes after insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub id: i64,
    pub worksite_id: LocalId,
    pub incident_id: IncidentId,
    pub organization_id: OrganizationId,
    pub app_version: i64,
    pub change_model_version: i32,
    pub created_at: DateTime<Utc>,
    pub save_attempt: i32,
    pub save_attempt_at: Option<DateTime<Utc>>,
    pub archive_action: Option<ArchiveAction>,
    pub change_data: String,
}

impl ChangeRecord {
    /// Decode the JSON payload
    pub fn decode(&self) -> Result<WorksiteChange, DomainError> {
        WorksiteChange::from_json(&self.change_data)
    }

    /// Returns true until the uploader archives the record
    pub fn is_pending(&self) -> bool {
        self.archive_action.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synced_worksite() -> (Worksite, IdReconciliationMap) {
        let mut worksite = Worksite::new(IncidentId::new(10).unwrap());
        worksite.id = LocalId::new(1);
        worksite.network_id = NetworkId::new(501).unwrap();
        worksite.address = "12 Levee St".to_string();

        let mut flag = WorksiteFlag::new("flag.worksite_high_priority");
        flag.id = LocalId::new(4);
        worksite.flags.push(flag);

        let mut wt = WorkType::new("debris", WorkTypeStatus::OpenUnassigned);
        wt.id = LocalId::new(7);
        worksite.work_types.push(wt);

        let mut ids = IdReconciliationMap::new();
        ids.flags.insert(LocalId::new(4), NetworkId::new(9001).unwrap());
        ids.work_types.insert(LocalId::new(7), NetworkId::new(9002).unwrap());
        (worksite, ids)
    }

    #[test]
    fn test_snapshot_translates_ids() {
        let (mut worksite, ids) = synced_worksite();
        let mut fresh = WorkType::new("tarp", WorkTypeStatus::OpenUnassigned);
        fresh.id = LocalId::new(8);
        worksite.work_types.push(fresh);

        let snapshot = WorksiteSnapshot::capture(&worksite, &ids);
        assert_eq!(snapshot.flags[0].network_id.get(), 9001);
        assert_eq!(snapshot.work_type("debris").unwrap().network_id.get(), 9002);
        assert_eq!(snapshot.work_type("tarp").unwrap().network_id, NetworkId::UNASSIGNED);
    }

    #[test]
    fn test_creation_has_no_start() {
        let before = Worksite::new(IncidentId::new(10).unwrap());
        let (after, ids) = synced_worksite();
        let change = WorksiteChange::new(&before, &after, None, &ids);
        assert!(change.start.is_none());
        assert_eq!(change.baseline(), &change.change);
    }

    #[test]
    fn test_address_edit_keeps_sub_entity_snapshots() {
        let (before, ids) = synced_worksite();
        let mut after = before.clone();
        after.address = "14 Levee St".to_string();

        let change = WorksiteChange::new(&before, &after, after.work_types.first(), &ids);
        let start = change.start.as_ref().unwrap();
        assert_eq!(start.flags, change.change.flags);
        assert_eq!(start.notes, change.change.notes);
        assert_eq!(start.work_types, change.change.work_types);
        assert_ne!(start.core.address, change.change.core.address);
        assert_eq!(change.primary_work_type.unwrap().network_id.get(), 9002);
    }

    #[test]
    fn test_change_json_round_trip_restores_worksite() {
        let (before, ids) = synced_worksite();
        let mut after = before.clone();
        after.form_data
            .insert("habitable".to_string(), FormDataValue::flag(true));

        let change = WorksiteChange::new(&before, &after, None, &ids);
        let decoded = WorksiteChange::from_json(&change.to_json().unwrap()).unwrap();
        assert_eq!(decoded, change);

        let mut restored = decoded.change.to_worksite();
        // sub-entity network ids come from the map, not the entity
        restored.flags[0].network_id = NetworkId::UNASSIGNED;
        restored.work_types[0].network_id = NetworkId::UNASSIGNED;
        assert_eq!(restored, after);
    }

    #[test]
    fn test_malformed_payload_is_invalid_snapshot() {
        let err = WorksiteChange::from_json("{\"change\": 3}").unwrap_err();
        assert!(matches!(err, DomainError::InvalidSnapshot(_)));
    }

    #[test]
    fn test_archive_action_literals() {
        for action in [
            ArchiveAction::Synced,
            ArchiveAction::PartiallySynced,
            ArchiveAction::Rejected,
        ] {
            assert_eq!(action.as_str().parse::<ArchiveAction>().unwrap(), action);
        }
    }
}
