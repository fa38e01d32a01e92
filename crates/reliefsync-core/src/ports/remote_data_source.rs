//! Remote data source port (driven/secondary port)
//!
//! This module defines the interface to the relief-coordination server.
//! The sync pipeline only ever reads from it; uploads are handled elsewhere.
//!
//! ## Design Notes
//!
//! - Unlike the storage ports, this port returns a typed [`RemoteError`] so
//!   the pipeline can tell a recoverable interruption (expired token, lost
//!   connectivity, overloaded server) from a permanent failure.
//! - The `Network*` structs are port-level DTOs, not domain entities. They
//!   are what gets staged on disk between fetch and commit.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    BoundingBox, DomainError, FormDataValue, IncidentId, LocalId, NetworkId, OrganizationId,
    WorkType, WorkTypeStatus, Worksite, WorksiteFlag, WorksiteNote,
};

// ============================================================================
// RemoteError
// ============================================================================

/// Errors returned by [`IRemoteDataSource`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The access token is no longer accepted
    #[error("Access token expired")]
    ExpiredToken,

    /// Transport-level failure (DNS, connect, timeout, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Returns true if retrying later may succeed
    ///
    /// An expired token counts as transient: the session layer refreshes it
    /// and the next run resumes where this one stopped.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::ExpiredToken | RemoteError::Network(_) => true,
            RemoteError::Server { status, .. } => *status >= 500 || *status == 429,
            RemoteError::Decode(_) => false,
        }
    }
}

// ============================================================================
// RecordShape
// ============================================================================

/// Payload shape requested for worksite pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordShape {
    /// Core fields and work types
    Short,
    /// Everything, including notes, flags and form data
    Full,
}

impl RecordShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordShape::Short => "short",
            RecordShape::Full => "full",
        }
    }
}

impl fmt::Display for RecordShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// DTOs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkWorkType {
    pub id: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<i64>,
    pub next_recur_at: Option<DateTime<Utc>>,
    pub phase: Option<i32>,
    pub recur: Option<String>,
    pub status: String,
    pub work_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkFlag {
    pub id: i64,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_high_priority: bool,
    pub notes: Option<String>,
    pub reason_t: String,
    pub requested_action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkNote {
    pub id: i64,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_survivor: bool,
    pub note: String,
}

/// One custom form field; booleans arrive as JSON booleans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkFormData {
    pub field_key: String,
    pub field_value: serde_json::Value,
}

impl NetworkFormData {
    pub fn to_value(&self) -> FormDataValue {
        match &self.field_value {
            serde_json::Value::Bool(b) => FormDataValue::flag(*b),
            serde_json::Value::String(s) => FormDataValue::text(s.clone()),
            serde_json::Value::Null => FormDataValue::text(""),
            other => FormDataValue::text(other.to_string()),
        }
    }
}

/// A worksite as the server sends it
///
/// Short-shape pages leave `flags`, `notes` and `form_data` empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkWorksite {
    pub id: i64,
    pub incident: i64,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub case_number: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub county: String,
    pub created_at: Option<DateTime<Utc>>,
    pub email: Option<String>,
    pub key_work_type: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone1: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub state: String,
    pub svi: Option<f32>,
    pub updated_at: DateTime<Utc>,
    pub what3words: Option<String>,
    #[serde(default)]
    pub work_types: Vec<NetworkWorkType>,
    #[serde(default)]
    pub flags: Vec<NetworkFlag>,
    #[serde(default)]
    pub notes: Vec<NetworkNote>,
    #[serde(default)]
    pub form_data: Vec<NetworkFormData>,
}

impl NetworkWorksite {
    pub fn network_id(&self) -> Result<NetworkId, DomainError> {
        NetworkId::new(self.id)
    }

    /// Map to a domain worksite; local ids are left unassigned
    pub fn to_worksite(&self) -> Result<Worksite, DomainError> {
        let mut worksite = Worksite::new(IncidentId::new(self.incident)?);
        worksite.network_id = self.network_id()?;
        worksite.address = self.address.clone();
        worksite.case_number = self.case_number.clone();
        worksite.city = self.city.clone();
        worksite.county = self.county.clone();
        worksite.created_at = self.created_at;
        worksite.email = self.email.clone();
        worksite.key_work_type = self.key_work_type.clone();
        worksite.latitude = self.latitude;
        worksite.longitude = self.longitude;
        worksite.name = self.name.clone();
        worksite.phone1 = self.phone1.clone();
        worksite.postal_code = self.postal_code.clone();
        worksite.state = self.state.clone();
        worksite.svi = self.svi;
        worksite.updated_at = Some(self.updated_at);
        worksite.what3words = self.what3words.clone();
        worksite.form_data = self
            .form_data
            .iter()
            .map(|fd| (fd.field_key.clone(), fd.to_value()))
            .collect();
        worksite.flags = self
            .flags
            .iter()
            .map(NetworkFlag::to_flag)
            .collect::<Result<_, _>>()?;
        worksite.notes = self
            .notes
            .iter()
            .map(NetworkNote::to_note)
            .collect::<Result<_, _>>()?;
        worksite.work_types = self
            .work_types
            .iter()
            .map(NetworkWorkType::to_work_type)
            .collect::<Result<_, _>>()?;
        Ok(worksite)
    }
}

impl NetworkWorkType {
    pub fn to_work_type(&self) -> Result<WorkType, DomainError> {
        Ok(WorkType {
            id: LocalId::NEW,
            network_id: NetworkId::new(self.id)?,
            created_at: self.created_at,
            org_claim: self.claimed_by.map(OrganizationId::new).transpose()?,
            next_recur_at: self.next_recur_at,
            phase: self.phase,
            recur: self.recur.clone(),
            status: WorkTypeStatus::from_literal(&self.status),
            work_type: self.work_type.clone(),
        })
    }
}

impl NetworkFlag {
    pub fn to_flag(&self) -> Result<WorksiteFlag, DomainError> {
        Ok(WorksiteFlag {
            id: LocalId::NEW,
            network_id: NetworkId::new(self.id)?,
            created_at: self.created_at,
            is_high_priority: self.is_high_priority,
            notes: self.notes.clone().unwrap_or_default(),
            reason_t: self.reason_t.clone(),
            requested_action: self.requested_action.clone().unwrap_or_default(),
        })
    }
}

impl NetworkNote {
    pub fn to_note(&self) -> Result<WorksiteNote, DomainError> {
        Ok(WorksiteNote {
            id: LocalId::NEW,
            network_id: NetworkId::new(self.id)?,
            created_at: self.created_at,
            is_survivor: self.is_survivor,
            note: self.note.clone(),
        })
    }
}

/// Secondary payload for one worksite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkFlagsFormData {
    pub id: i64,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub flags: Vec<NetworkFlag>,
    #[serde(default)]
    pub form_data: Vec<NetworkFormData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkTeam {
    pub id: i64,
    pub incident: i64,
    pub name: String,
    pub color: Option<String>,
    #[serde(default)]
    pub users: Vec<i64>,
    pub updated_at: Option<DateTime<Utc>>,
}

// ============================================================================
// IRemoteDataSource trait
// ============================================================================

/// Port trait for reading incident data from the server
///
/// Page indices are zero-based; `fetch_*_page(…, page_size, page_index, …)`
/// returns the records at offset `page_size * page_index` in ascending id
/// order, so consecutive pages never overlap.
#[async_trait::async_trait]
pub trait IRemoteDataSource: Send + Sync {
    /// Number of worksites in the incident, optionally only those updated
    /// after `updated_after`
    async fn count_worksites(
        &self,
        incident_id: IncidentId,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<u64, RemoteError>;

    /// One page of worksites in ascending id order
    async fn fetch_worksites_page(
        &self,
        incident_id: IncidentId,
        shape: RecordShape,
        page_size: u32,
        page_index: u64,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<NetworkWorksite>, RemoteError>;

    /// Number of worksites inside `bounds`
    async fn count_worksites_in_bounds(
        &self,
        incident_id: IncidentId,
        bounds: &BoundingBox,
    ) -> Result<u64, RemoteError>;

    /// One page of full worksites inside `bounds`
    async fn fetch_worksites_in_bounds(
        &self,
        incident_id: IncidentId,
        bounds: &BoundingBox,
        page_size: u32,
        page_index: u64,
    ) -> Result<Vec<NetworkWorksite>, RemoteError>;

    /// Full worksites by network id
    async fn fetch_worksites_by_ids(
        &self,
        ids: &[NetworkId],
    ) -> Result<Vec<NetworkWorksite>, RemoteError>;

    /// One page of flags and form data in ascending worksite id order
    async fn fetch_flags_form_data_page(
        &self,
        incident_id: IncidentId,
        page_size: u32,
        page_index: u64,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<NetworkFlagsFormData>, RemoteError>;

    /// All teams of the incident
    async fn fetch_teams(&self, incident_id: IncidentId) -> Result<Vec<NetworkTeam>, RemoteError>;
}
