//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for the integer identifiers
//! used across the sync engine. Local and network identifiers are kept
//! distinct so a row id can never be sent where the server expects its own id.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// Incident / organization identifiers
// ============================================================================

/// Identifier of a disaster incident (server-assigned)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(i64);

impl IncidentId {
    /// Create an IncidentId, rejecting non-positive values
    pub fn new(value: i64) -> Result<Self, DomainError> {
        if value <= 0 {
            return Err(DomainError::InvalidId(format!(
                "incident id must be positive, got {value}"
            )));
        }
        Ok(Self(value))
    }

    /// Get the raw value
    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl Display for IncidentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IncidentId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<i64>()
            .map_err(|e| DomainError::InvalidId(format!("Invalid incident id '{s}': {e}")))?;
        Self::new(value)
    }
}

/// Identifier of a relief organization (server-assigned)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(i64);

impl OrganizationId {
    /// Create an OrganizationId, rejecting non-positive values
    pub fn new(value: i64) -> Result<Self, DomainError> {
        if value <= 0 {
            return Err(DomainError::InvalidId(format!(
                "organization id must be positive, got {value}"
            )));
        }
        Ok(Self(value))
    }

    /// Get the raw value
    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl Display for OrganizationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrganizationId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<i64>()
            .map_err(|e| DomainError::InvalidId(format!("Invalid organization id '{s}': {e}")))?;
        Self::new(value)
    }
}

// ============================================================================
// Local / network identifiers
// ============================================================================

/// Row identifier assigned by the local store
///
/// `LocalId(0)` marks an entity that has not been inserted yet; the store
/// assigns the real id on insert. Ids are stable for the lifetime of the
/// device database.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LocalId(i64);

impl LocalId {
    /// Marker for entities that were never persisted
    pub const NEW: LocalId = LocalId(0);

    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }

    /// Returns true if this id has not been assigned by the store yet
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.0 <= 0
    }
}

impl Display for LocalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier assigned by the server
///
/// `-1` means "not yet assigned"; every record created on the device carries
/// it until the first successful upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(i64);

impl NetworkId {
    /// Sentinel for records that have never been pushed
    pub const UNASSIGNED: NetworkId = NetworkId(-1);

    /// Create a server-assigned NetworkId, rejecting non-positive values
    pub fn new(value: i64) -> Result<Self, DomainError> {
        if value <= 0 {
            return Err(DomainError::InvalidId(format!(
                "network id must be positive, got {value}"
            )));
        }
        Ok(Self(value))
    }

    /// Build from a stored column value, mapping anything non-positive to
    /// [`NetworkId::UNASSIGNED`]
    #[must_use]
    pub const fn from_stored(value: i64) -> Self {
        if value > 0 {
            Self(value)
        } else {
            Self::UNASSIGNED
        }
    }

    #[must_use]
    pub const fn unassigned() -> Self {
        Self::UNASSIGNED
    }

    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }

    /// Returns true if the server has assigned this id
    #[must_use]
    pub const fn is_assigned(&self) -> bool {
        self.0 > 0
    }
}

impl Default for NetworkId {
    fn default() -> Self {
        Self::UNASSIGNED
    }
}

impl Display for NetworkId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
