//! ReliefSync Sync - Incident pull pipeline
//!
//! Provides:
//! - Resumable, paged pulls of incident worksites into the local store
//! - Spatial partitioning of large incidents around the device location
//! - Secondary (flags / form data) and short payload pulls
//! - Disk staging of fetched pages ahead of transactional commits
//! - Per-incident exclusion and progress publishing
//!
//! ## Modules
//!
//! - [`engine`] - [`IncidentDataSyncer`], the pipeline entry point
//! - [`full`] - Full-payload pulls: linear, spatial-bounded and delta
//! - [`short`] - Short payload pull run ahead of the full pull
//! - [`secondary`] - Flags and form data pull
//! - [`grid`] - Spatial grid partitioner
//! - [`staging`] - Disk staging cache for fetched pages
//! - [`strategy`] - Strategy selection and sync reports
//! - [`registry`] - Per-incident sync guard
//! - [`progress`] - Progress publishing through `tokio::sync::watch`

pub mod context;
pub mod engine;
pub mod full;
pub mod grid;
mod pager;
pub mod progress;
pub mod registry;
pub mod secondary;
pub mod short;
pub mod staging;
pub mod strategy;

pub use context::SyncContext;
pub use engine::IncidentDataSyncer;
pub use grid::SpatialGrid;
pub use progress::ProgressPublisher;
pub use registry::IncidentSyncGuard;
pub use staging::{PageStagingCache, StageKey};
pub use strategy::{SyncOutcome, SyncPlan, SyncReport, Syncer, StageReport};

use reliefsync_core::domain::IncidentId;
use reliefsync_core::ports::RemoteError;
use thiserror::Error;

/// Errors that can end a sync run
///
/// Transient remote failures are not errors: they end the run with
/// [`SyncOutcome::Incomplete`] and the next run resumes.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The caller cancelled the run
    #[error("Sync cancelled")]
    Cancelled,

    /// Another pull of the same incident is in progress
    #[error("Sync already running for incident {0}")]
    AlreadyRunning(IncidentId),

    /// A remote failure that retrying will not fix
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The local store failed
    #[error("Storage error: {0:#}")]
    Storage(anyhow::Error),

    /// The staging directory could not be written
    #[error("Staging error: {0}")]
    Staging(String),
}

impl From<anyhow::Error> for SyncError {
    fn from(e: anyhow::Error) -> Self {
        SyncError::Storage(e)
    }
}

impl SyncError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}
