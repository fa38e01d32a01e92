//! Strategy selection and sync reports
//!
//! A full pull of an incident takes one of four shapes, chosen from the
//! stored stats, the device location and the server's worksite count:
//!
//! ```text
//!                   never synced, or moved
//!                  ┌─────────────┴─────────────┐
//!           count < threshold          count ≥ threshold
//!                  │                  ┌────────┴────────┐
//!             FullLinear        center known      no center
//!                                    │                 │
//!                                 Spatial          Deferred
//!
//!                   synced, not moved ──► Delta
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use reliefsync_core::config::SyncConfig;
use reliefsync_core::domain::{Coordinates, IncidentId, SyncCategory, SyncStats};
use reliefsync_core::ports::CommitOutcome;

use crate::SyncError;

/// How a full pull will fetch the incident
#[derive(Debug, Clone, PartialEq)]
pub enum SyncPlan {
    /// Every worksite, page by page in id order
    FullLinear,
    /// Worksites around `center`, grid cell by grid cell
    Spatial { center: Coordinates },
    /// Only worksites updated after the last successful pull
    Delta { since: DateTime<Utc> },
    /// The incident is too large to pull without a location
    Deferred { reason: String },
}

/// How a sync stage ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Every target record was pulled
    Completed,
    /// Updates since the previous pull were applied
    Delta,
    /// The spatial area was exhausted
    Converged,
    /// Nothing needed pulling
    UpToDate,
    /// Not attempted; see `reason`
    Deferred { reason: String },
    /// Stopped early on a transient failure; the next run resumes
    Incomplete { reason: String },
}

impl SyncOutcome {
    /// Whether the stage left the category synced
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            SyncOutcome::Completed
                | SyncOutcome::Delta
                | SyncOutcome::Converged
                | SyncOutcome::UpToDate
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Completed => "completed",
            SyncOutcome::Delta => "delta",
            SyncOutcome::Converged => "converged",
            SyncOutcome::UpToDate => "up_to_date",
            SyncOutcome::Deferred { .. } => "deferred",
            SyncOutcome::Incomplete { .. } => "incomplete",
        }
    }
}

/// Result of one syncer run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub category: SyncCategory,
    pub outcome: SyncOutcome,
    /// Records received from the server during this run
    pub pulled: u64,
    #[serde(skip)]
    pub commit: CommitOutcome,
}

impl StageReport {
    pub fn new(category: SyncCategory, outcome: SyncOutcome) -> Self {
        Self {
            category,
            outcome,
            pulled: 0,
            commit: CommitOutcome::default(),
        }
    }

    pub fn with_counts(mut self, pulled: u64, commit: CommitOutcome) -> Self {
        self.pulled = pulled;
        self.commit = commit;
        self
    }
}

/// Result of [`IncidentDataSyncer::sync`](crate::IncidentDataSyncer::sync)
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub incident_id: IncidentId,
    /// Outcome of the full pull, or of the first stage that stopped the run
    pub outcome: SyncOutcome,
    pub stages: Vec<StageReport>,
    #[serde(skip)]
    pub teams: Option<CommitOutcome>,
    pub duration_ms: u64,
}

impl SyncReport {
    pub fn stage(&self, category: SyncCategory) -> Option<&StageReport> {
        self.stages.iter().find(|stage| stage.category == category)
    }

    /// Worksite records applied locally across all stages
    pub fn applied(&self) -> usize {
        self.stages.iter().map(|stage| stage.commit.applied()).sum()
    }

    pub fn skipped(&self) -> usize {
        self.stages.iter().map(|stage| stage.commit.skipped).sum()
    }
}

/// A pull of one [`SyncCategory`] for an incident
#[async_trait::async_trait]
pub trait Syncer: Send + Sync {
    fn category(&self) -> SyncCategory;

    /// Stats that the next [`sync`](Self::sync) would resume from
    async fn stats(&self, incident_id: IncidentId) -> Result<SyncStats, SyncError>;

    async fn sync(
        &self,
        incident_id: IncidentId,
        cancel: &CancellationToken,
    ) -> Result<StageReport, SyncError>;
}

/// Whether the device moved further than `threshold_km` from the center of
/// the last spatial pull
pub fn location_changed_beyond(
    stats: &SyncStats,
    current: Option<Coordinates>,
    threshold_km: f64,
) -> bool {
    match (stats.bounded, current) {
        (Some(bounded), Some(here)) => bounded.center.distance_km(&here) > threshold_km,
        _ => false,
    }
}

/// Whether the next full pull must fetch the whole incident (or area)
/// rather than the changes since the last success
pub fn needs_full_pull(stats: &SyncStats, location: Option<Coordinates>, config: &SyncConfig) -> bool {
    stats.successful_sync.is_none()
        || location_changed_beyond(stats, location, config.location_change_threshold_km)
}

/// Pick the plan for a full pull
///
/// `worksite_count` is only consulted when [`needs_full_pull`] holds.
pub fn choose_plan(
    stats: &SyncStats,
    location: Option<Coordinates>,
    worksite_count: u64,
    config: &SyncConfig,
) -> SyncPlan {
    if !needs_full_pull(stats, location, config) {
        if let Some(since) = stats.successful_sync {
            return SyncPlan::Delta { since };
        }
    }

    if worksite_count < config.large_incident_threshold() {
        return SyncPlan::FullLinear;
    }

    match location.or_else(|| stats.bounded.map(|b| b.center)) {
        Some(center) => SyncPlan::Spatial { center },
        None => SyncPlan::Deferred {
            reason: format!(
                "incident has {worksite_count} worksites and no location is known \
                 to center a spatial sync"
            ),
        },
    }
}
