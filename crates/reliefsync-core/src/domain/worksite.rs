//! Worksite (case) domain types
//!
//! A worksite is one relief-request record. It owns its sub-entities (work
//! types, flags, notes, form data) by value; the local store relates them
//! through integer ids only, so there are no object cycles between a case,
//! its work types, and the change log that snapshots both.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::geo::Coordinates;
use super::newtypes::{IncidentId, LocalId, NetworkId, OrganizationId};

// ============================================================================
// WorkTypeStatus
// ============================================================================

/// Lifecycle status of a work type
///
/// Stored and transmitted as the server's literal (e.g. `"open_assigned"`).
/// Unrecognised literals decode to [`WorkTypeStatus::Unknown`] so that a
/// server adding a status never breaks a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkTypeStatus {
    Unknown,
    OpenAssigned,
    OpenUnassigned,
    OpenPartiallyCompleted,
    OpenNeedsFollowUp,
    OpenUnresponsive,
    ClosedCompleted,
    ClosedIncomplete,
    ClosedOutOfScope,
    ClosedDoneByOthers,
    ClosedNoHelpWanted,
    ClosedRejected,
    ClosedDuplicate,
}

impl WorkTypeStatus {
    /// All statuses in display order
    pub const ALL: [WorkTypeStatus; 13] = [
        WorkTypeStatus::Unknown,
        WorkTypeStatus::OpenAssigned,
        WorkTypeStatus::OpenUnassigned,
        WorkTypeStatus::OpenPartiallyCompleted,
        WorkTypeStatus::OpenNeedsFollowUp,
        WorkTypeStatus::OpenUnresponsive,
        WorkTypeStatus::ClosedCompleted,
        WorkTypeStatus::ClosedIncomplete,
        WorkTypeStatus::ClosedOutOfScope,
        WorkTypeStatus::ClosedDoneByOthers,
        WorkTypeStatus::ClosedNoHelpWanted,
        WorkTypeStatus::ClosedRejected,
        WorkTypeStatus::ClosedDuplicate,
    ];

    pub fn literal(&self) -> &'static str {
        match self {
            WorkTypeStatus::Unknown => "unknown",
            WorkTypeStatus::OpenAssigned => "open_assigned",
            WorkTypeStatus::OpenUnassigned => "open_unassigned",
            WorkTypeStatus::OpenPartiallyCompleted => "open_partially-completed",
            WorkTypeStatus::OpenNeedsFollowUp => "open_needs-follow-up",
            WorkTypeStatus::OpenUnresponsive => "open_unresponsive",
            WorkTypeStatus::ClosedCompleted => "closed_completed",
            WorkTypeStatus::ClosedIncomplete => "closed_incomplete",
            WorkTypeStatus::ClosedOutOfScope => "closed_out-of-scope",
            WorkTypeStatus::ClosedDoneByOthers => "closed_done-by-others",
            WorkTypeStatus::ClosedNoHelpWanted => "closed_no-help-wanted",
            WorkTypeStatus::ClosedRejected => "closed_rejected",
            WorkTypeStatus::ClosedDuplicate => "closed_duplicate",
        }
    }

    /// Membership in the closed-status set
    pub fn is_closed(&self) -> bool {
        self.literal().starts_with("closed_")
    }

    /// Lenient parse used for stored and remote data
    pub fn from_literal(literal: &str) -> Self {
        literal.parse().unwrap_or(WorkTypeStatus::Unknown)
    }
}

impl FromStr for WorkTypeStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkTypeStatus::ALL
            .iter()
            .copied()
            .find(|status| status.literal() == s)
            .ok_or_else(|| DomainError::UnknownStatus(s.to_string()))
    }
}

impl fmt::Display for WorkTypeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.literal())
    }
}

impl From<String> for WorkTypeStatus {
    fn from(value: String) -> Self {
        WorkTypeStatus::from_literal(&value)
    }
}

impl From<WorkTypeStatus> for String {
    fn from(value: WorkTypeStatus) -> Self {
        value.literal().to_string()
    }
}

// ============================================================================
// Sub-entities
// ============================================================================

/// One service category on a worksite with its own claim/status lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkType {
    pub id: LocalId,
    pub network_id: NetworkId,
    pub created_at: Option<DateTime<Utc>>,
    /// Organization that has claimed this work, if any
    pub org_claim: Option<OrganizationId>,
    pub next_recur_at: Option<DateTime<Utc>>,
    pub phase: Option<i32>,
    /// Recurrence rule (RRULE text) for recurring work
    pub recur: Option<String>,
    pub status: WorkTypeStatus,
    /// Work type literal, e.g. `"debris"` or `"muck_out"`
    pub work_type: String,
}

impl WorkType {
    /// A new, unclaimed, unsynced work type
    pub fn new(work_type: impl Into<String>, status: WorkTypeStatus) -> Self {
        Self {
            id: LocalId::NEW,
            network_id: NetworkId::UNASSIGNED,
            created_at: None,
            org_claim: None,
            next_recur_at: None,
            phase: None,
            recur: None,
            status,
            work_type: work_type.into(),
        }
    }

    pub fn is_claimed_by(&self, org_id: OrganizationId) -> bool {
        self.org_claim == Some(org_id)
    }
}

/// An issue on a worksite needing attention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorksiteFlag {
    pub id: LocalId,
    pub network_id: NetworkId,
    pub created_at: Option<DateTime<Utc>>,
    pub is_high_priority: bool,
    pub notes: String,
    /// Flag reason key; unique per worksite
    pub reason_t: String,
    pub requested_action: String,
}

impl WorksiteFlag {
    pub fn new(reason_t: impl Into<String>) -> Self {
        Self {
            id: LocalId::NEW,
            network_id: NetworkId::UNASSIGNED,
            created_at: None,
            is_high_priority: false,
            notes: String::new(),
            reason_t: reason_t.into(),
            requested_action: String::new(),
        }
    }
}

/// A free-text note on a worksite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorksiteNote {
    pub id: LocalId,
    pub network_id: NetworkId,
    pub created_at: Option<DateTime<Utc>>,
    pub is_survivor: bool,
    pub note: String,
}

impl WorksiteNote {
    pub fn new(note: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: LocalId::NEW,
            network_id: NetworkId::UNASSIGNED,
            created_at: Some(created_at),
            is_survivor: false,
            note: note.into(),
        }
    }
}

/// One custom form field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDataValue {
    pub value_string: String,
    pub value_bool: bool,
    pub is_bool_value: bool,
}

impl FormDataValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value_string: value.into(),
            value_bool: false,
            is_bool_value: false,
        }
    }

    pub fn flag(value: bool) -> Self {
        Self {
            value_string: String::new(),
            value_bool: value,
            is_bool_value: true,
        }
    }
}

// ============================================================================
// Worksite
// ============================================================================

/// A disaster-relief case with its sub-entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worksite {
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
    /// Social vulnerability (severity) index, 0..1
    pub svi: Option<f32>,
    pub updated_at: Option<DateTime<Utc>>,
    pub what3words: Option<String>,
    pub form_data: BTreeMap<String, FormDataValue>,
    pub flags: Vec<WorksiteFlag>,
    pub notes: Vec<WorksiteNote>,
    pub work_types: Vec<WorkType>,
}

impl Worksite {
    /// An empty, never-persisted worksite for an incident
    pub fn new(incident_id: IncidentId) -> Self {
        Self {
            id: LocalId::NEW,
            network_id: NetworkId::UNASSIGNED,
            incident_id,
            address: String::new(),
            case_number: String::new(),
            city: String::new(),
            county: String::new(),
            created_at: None,
            email: None,
            key_work_type: None,
            latitude: 0.0,
            longitude: 0.0,
            name: String::new(),
            phone1: String::new(),
            postal_code: String::new(),
            state: String::new(),
            svi: None,
            updated_at: None,
            what3words: None,
            form_data: BTreeMap::new(),
            flags: Vec::new(),
            notes: Vec::new(),
            work_types: Vec::new(),
        }
    }

    /// Returns true if the local store has never seen this worksite
    pub fn is_new(&self) -> bool {
        self.id.is_new()
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    pub fn work_type(&self, literal: &str) -> Option<&WorkType> {
        self.work_types.iter().find(|wt| wt.work_type == literal)
    }
}

// ============================================================================
// Root sync metadata
// ============================================================================

/// Sync bookkeeping stored next to every worksite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorksiteRoot {
    pub id: LocalId,
    pub incident_id: IncidentId,
    pub network_id: NetworkId,
    /// Empty for records that have a network id
    pub local_global_uuid: String,
    pub local_modified_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
    pub is_local_modified: bool,
    pub sync_attempt: i64,
    /// False while only the short payload has been stored
    pub has_full_payload: bool,
}

/// Local modification state of a worksite, keyed by its network id
///
/// Read before a remote batch is applied; the `local_modified_at` value is
/// the "expected" value for the optimistic write-time check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalModifiedState {
    pub id: LocalId,
    pub network_id: NetworkId,
    pub local_modified_at: DateTime<Utc>,
    pub is_local_modified: bool,
    pub has_full_payload: bool,
}
