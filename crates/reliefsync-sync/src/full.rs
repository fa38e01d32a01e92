//! Full payload pull
//!
//! Pulls complete worksites (notes, flags and form data included) using the
//! plan chosen by [`choose_plan`]:
//!
//! - **Linear**: every worksite of a small incident, page by page in id order
//! - **Spatial**: worksites around the device, grid cell by grid cell from the
//!   center outwards, after a secondary pull of the whole incident
//! - **Delta**: worksites updated since the last success
//! - **Deferred**: large incident and no location; nothing is pulled
//!
//! Every epoch records which plan started it. Linear and delta pulls resume
//! at `paged_count / page_size`. An unfinished spatial epoch is always taken
//! up again by the spatial plan, at `bounded.cell_index` as long as the
//! device stayed within `location_change_threshold_km` of the stored center
//! and around the new location otherwise.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use reliefsync_core::domain::{
    BoundedSyncState, BoundingBox, Coordinates, EpochKind, IncidentId, ProgressStats,
    SyncCategory, SyncStats,
};
use reliefsync_core::ports::{CommitOutcome, ILocationProvider, RecordShape, RemoteError};

use crate::context::SyncContext;
use crate::grid::SpatialGrid;
use crate::pager::{run_linear, run_page, BoundsPages, LinearRun, WorksitePages};
use crate::secondary::SecondarySyncer;
use crate::strategy::{choose_plan, needs_full_pull, StageReport, SyncOutcome, SyncPlan, Syncer};
use crate::SyncError;

/// Reports of one full pull; `secondary` is set when a spatial pull ran the
/// secondary syncer first
#[derive(Debug)]
pub struct FullPullReport {
    pub full: StageReport,
    pub secondary: Option<StageReport>,
}

pub struct FullSyncer {
    ctx: SyncContext,
    location: Arc<dyn ILocationProvider>,
    secondary: SecondarySyncer,
}

impl FullSyncer {
    pub fn new(ctx: SyncContext, location: Arc<dyn ILocationProvider>) -> Self {
        let secondary = SecondarySyncer::new(ctx.clone());
        Self {
            ctx,
            location,
            secondary,
        }
    }

    /// Run a full pull, including the secondary stage of spatial pulls
    pub async fn run(
        &self,
        incident_id: IncidentId,
        cancel: &CancellationToken,
    ) -> Result<FullPullReport, SyncError> {
        let mut stats = self.stats(incident_id).await?;
        let location = self.location.current_location();

        // Interrupted epochs finish under the plan that started them
        match stats.unfinished_epoch() {
            Some(EpochKind::Paged) => {
                let full = self.sync_linear(&mut stats, None, cancel).await?;
                return Ok(full.into());
            }
            Some(EpochKind::Spatial) => {
                if let Some(center) = location.or_else(|| stats.bounded.map(|b| b.center)) {
                    info!(incident_id = %incident_id, "Continuing unfinished spatial pull");
                    return self.sync_spatial(&mut stats, center, cancel).await;
                }
            }
            Some(EpochKind::Delta) | None => {}
        }

        let worksite_count = if needs_full_pull(&stats, location, &self.ctx.config) {
            match self.ctx.remote.count_worksites(incident_id, None).await {
                Ok(count) => count,
                Err(e) => return self.interrupted_by(&mut stats, e).await.map(Into::into),
            }
        } else {
            0
        };

        let plan = choose_plan(&stats, location, worksite_count, &self.ctx.config);
        info!(incident_id = %incident_id, worksite_count, plan = ?plan, "Starting full pull");

        match plan {
            SyncPlan::FullLinear => {
                let full = self
                    .sync_linear(&mut stats, Some(worksite_count), cancel)
                    .await?;
                Ok(full.into())
            }
            SyncPlan::Delta { since } => Ok(self.sync_delta(&mut stats, since, cancel).await?.into()),
            SyncPlan::Spatial { center } => self.sync_spatial(&mut stats, center, cancel).await,
            SyncPlan::Deferred { reason } => {
                info!(incident_id = %incident_id, reason = %reason, "Full pull deferred");
                Ok(StageReport::new(SyncCategory::Full, SyncOutcome::Deferred { reason }).into())
            }
        }
    }

    /// Record the failed attempt; a transient error ends the stage incomplete
    async fn interrupted_by(
        &self,
        stats: &mut SyncStats,
        error: RemoteError,
    ) -> Result<StageReport, SyncError> {
        let reason = self.ctx.record_failure(stats, error).await?;
        Ok(StageReport::new(
            SyncCategory::Full,
            SyncOutcome::Incomplete { reason },
        ))
    }

    fn pages(&self, stats: &SyncStats, updated_after: Option<DateTime<Utc>>) -> WorksitePages {
        WorksitePages {
            ctx: self.ctx.clone(),
            incident_id: stats.incident_id,
            category: SyncCategory::Full,
            shape: RecordShape::Full,
            page_size: self.ctx.config.effective_page_size(),
            expected_count: stats.target_count,
            updated_after,
        }
    }

    fn report(run: LinearRun, finished: SyncOutcome) -> StageReport {
        let outcome = match run.interrupted {
            Some(reason) => SyncOutcome::Incomplete { reason },
            None => finished,
        };
        StageReport::new(SyncCategory::Full, outcome).with_counts(run.pulled, run.commit)
    }

    // ========================================================================
    // Linear
    // ========================================================================

    /// Page through the whole incident; `count` starts a new epoch
    async fn sync_linear(
        &self,
        stats: &mut SyncStats,
        count: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<StageReport, SyncError> {
        if let Some(count) = count {
            stats.start_epoch(Utc::now(), count, EpochKind::Paged);
            self.ctx.save_stats(stats).await?;
        }

        let source = self.pages(stats, None);
        let run = run_linear(&self.ctx, &source, stats, cancel).await?;
        Ok(Self::report(run, SyncOutcome::Completed))
    }

    // ========================================================================
    // Delta
    // ========================================================================

    async fn sync_delta(
        &self,
        stats: &mut SyncStats,
        since: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<StageReport, SyncError> {
        let resuming = stats.unfinished_epoch() == Some(EpochKind::Delta);
        if !resuming {
            let count = match self
                .ctx
                .remote
                .count_worksites(stats.incident_id, Some(since))
                .await
            {
                Ok(count) => count,
                Err(e) => return self.interrupted_by(stats, e).await,
            };
            // The spatial center stays valid across deltas
            let bounded = stats.bounded;
            stats.start_epoch(Utc::now(), count, EpochKind::Delta);
            stats.bounded = bounded;
            self.ctx.save_stats(stats).await?;
        }

        debug!(
            incident_id = %stats.incident_id,
            since = %since,
            target = stats.target_count,
            "Pulling changes since last sync"
        );
        let source = self.pages(stats, Some(since));
        let run = run_linear(&self.ctx, &source, stats, cancel).await?;
        Ok(Self::report(run, SyncOutcome::Delta))
    }

    // ========================================================================
    // Spatial
    // ========================================================================

    async fn sync_spatial(
        &self,
        stats: &mut SyncStats,
        center: Coordinates,
        cancel: &CancellationToken,
    ) -> Result<FullPullReport, SyncError> {
        let incident_id = stats.incident_id;
        let config = &self.ctx.config;

        let secondary = self.secondary.sync(incident_id, cancel).await?;
        if let SyncOutcome::Incomplete { reason } = &secondary.outcome {
            let full = StageReport::new(
                SyncCategory::Full,
                SyncOutcome::Incomplete {
                    reason: reason.clone(),
                },
            );
            return Ok(FullPullReport {
                full,
                secondary: Some(secondary),
            });
        }

        let resume = stats.bounded.filter(|bounded| {
            !stats.is_synced()
                && bounded.center.distance_km(&center) <= config.location_change_threshold_km
        });

        let mut bounded = match resume {
            Some(bounded) => {
                debug!(
                    incident_id = %incident_id,
                    cell_index = bounded.cell_index,
                    fetched = bounded.fetched_count,
                    "Resuming spatial pull"
                );
                bounded
            }
            None => {
                let area = BoundingBox::around(&center, config.spatial_radius_km);
                let count = match self
                    .ctx
                    .remote
                    .count_worksites_in_bounds(incident_id, &area)
                    .await
                {
                    Ok(count) => count,
                    Err(e) => {
                        let full = self.interrupted_by(stats, e).await?;
                        return Ok(FullPullReport {
                            full,
                            secondary: Some(secondary),
                        });
                    }
                };
                stats.start_epoch(Utc::now(), count, EpochKind::Spatial);
                let bounded = BoundedSyncState::new(center, config.spatial_radius_km);
                stats.bounded = Some(bounded);
                self.ctx.save_stats(stats).await?;
                bounded
            }
        };

        if stats.target_count == 0 {
            info!(incident_id = %incident_id, "No worksites in the spatial area");
            stats.mark_converged();
            self.ctx.save_stats(stats).await?;
            return Ok(FullPullReport {
                full: StageReport::new(SyncCategory::Full, SyncOutcome::Converged),
                secondary: Some(secondary),
            });
        }

        let area = BoundingBox::around(&bounded.center, bounded.radius_km);
        let mut grid = SpatialGrid::new(area);
        grid.initialize_grid(stats.target_count, config.cell_population());
        let cells = grid.grid_cells();
        let page_size = config.effective_page_size();

        let mut pulled = 0u64;
        let mut commit = CommitOutcome::default();

        for (cell_index, bounds) in cells.iter().enumerate().skip(bounded.cell_index) {
            let source = BoundsPages {
                ctx: self.ctx.clone(),
                incident_id,
                area,
                bounds: *bounds,
                cell: cell_index,
                page_size,
                expected_count: stats.target_count,
            };

            // Cell progress is only persisted once the cell is complete, so a
            // resumed pull refetches a partial cell from its first page
            let mut cell_fetched = 0u64;
            let mut page_index = 0u64;
            loop {
                if cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }

                let page = match run_page(&self.ctx, &source, page_index, cancel).await {
                    Ok(page) => page,
                    Err(SyncError::Remote(e)) => {
                        let full = self
                            .interrupted_by(stats, e)
                            .await?
                            .with_counts(pulled, commit);
                        return Ok(FullPullReport {
                            full,
                            secondary: Some(secondary),
                        });
                    }
                    Err(e) => return Err(e),
                };

                cell_fetched += page.received;
                pulled += page.received;
                commit.merge(page.commit);

                self.ctx.progress.publish(
                    ProgressStats::new(
                        SyncCategory::Full.as_str(),
                        bounded.fetched_count + cell_fetched,
                        stats.target_count,
                    )
                    .approximate(),
                );

                if page.received < u64::from(page_size) {
                    break;
                }
                page_index += 1;
            }

            bounded.cell_index = cell_index + 1;
            bounded.fetched_count += cell_fetched;
            stats.record_page(bounded.fetched_count);
            stats.bounded = Some(bounded);
            self.ctx.save_stats(stats).await?;

            debug!(
                incident_id = %incident_id,
                cell = cell_index,
                cells = cells.len(),
                fetched = cell_fetched,
                "Grid cell pulled"
            );
        }

        let outcome = if bounded.fetched_count > 0 {
            stats.mark_converged();
            self.ctx.save_stats(stats).await?;
            SyncOutcome::Converged
        } else {
            // Start over with a fresh count next time
            stats.bounded = None;
            self.ctx.save_stats(stats).await?;
            SyncOutcome::Incomplete {
                reason: "spatial area exhausted without receiving any worksite".to_string(),
            }
        };

        info!(
            incident_id = %incident_id,
            fetched = bounded.fetched_count,
            outcome = outcome.label(),
            "Spatial pull finished"
        );
        Ok(FullPullReport {
            full: StageReport::new(SyncCategory::Full, outcome).with_counts(pulled, commit),
            secondary: Some(secondary),
        })
    }
}

impl From<StageReport> for FullPullReport {
    fn from(full: StageReport) -> Self {
        Self {
            full,
            secondary: None,
        }
    }
}

#[async_trait::async_trait]
impl Syncer for FullSyncer {
    fn category(&self) -> SyncCategory {
        SyncCategory::Full
    }

    async fn stats(&self, incident_id: IncidentId) -> Result<SyncStats, SyncError> {
        self.ctx.load_stats(incident_id, SyncCategory::Full).await
    }

    async fn sync(
        &self,
        incident_id: IncidentId,
        cancel: &CancellationToken,
    ) -> Result<StageReport, SyncError> {
        Ok(self.run(incident_id, cancel).await?.full)
    }
}
