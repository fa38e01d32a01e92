//! Relief teams

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{IncidentId, LocalId, NetworkId};

/// A group of volunteers working an incident
///
/// Teams are pulled after cases. A team edited on the device keeps
/// `is_local_modified` set until its change is uploaded, and remote versions
/// never replace it in the meantime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: LocalId,
    pub network_id: NetworkId,
    pub incident_id: IncidentId,
    pub name: String,
    pub color: Option<String>,
    /// Network ids of the member users
    pub member_ids: Vec<i64>,
    pub is_local_modified: bool,
    pub local_modified_at: DateTime<Utc>,
}

impl Team {
    pub fn member_count(&self) -> usize {
        self.member_ids.len()
    }
}
