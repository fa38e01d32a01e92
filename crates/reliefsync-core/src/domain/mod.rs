//! Domain entities and business logic
//!
//! This module contains the core domain types for ReliefSync:
//! - Newtypes for type-safe identifiers
//! - Geographic coordinates and bounding boxes
//! - Worksites and their sub-entities
//! - Per-incident sync statistics and progress snapshots
//! - Change log records and id reconciliation
//! - Teams
//! - Domain-specific error types

pub mod change;
pub mod errors;
pub mod geo;
pub mod newtypes;
pub mod sync_stats;
pub mod team;
pub mod worksite;

// Re-export commonly used types
pub use change::{
    ArchiveAction, ChangeRecord, CoreSnapshot, FlagSnapshot, IdReconciliationMap, NoteSnapshot,
    WorkTypeSnapshot, WorksiteChange, WorksiteSnapshot, CHANGE_MODEL_VERSION,
};
pub use errors::DomainError;
pub use geo::{BoundingBox, Coordinates};
pub use newtypes::*;
pub use sync_stats::{
    BoundedSyncState, EpochKind, ProgressStats, SyncCategory, SyncStats, FULL_DATA_VERSION,
    SECONDARY_DATA_VERSION, SHORT_DATA_VERSION,
};
pub use team::Team;
pub use worksite::{
    FormDataValue, LocalModifiedState, WorkType, WorkTypeStatus, Worksite, WorksiteFlag,
    WorksiteNote, WorksiteRoot,
};
