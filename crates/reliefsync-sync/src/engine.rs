//! Incident pull pipeline
//!
//! [`IncidentDataSyncer`] is the entry point for pulling an incident:
//!
//! 1. Claim the incident (one pull per incident at a time)
//! 2. Short pull, until the incident has been pulled once in the short shape
//! 3. Full pull: linear, spatial (with a secondary pull first), delta or
//!    deferred
//! 4. Teams, after a successful full pull
//!
//! Transient remote failures end the run with
//! [`SyncOutcome::Incomplete`]; the next run resumes where this one stopped.
//! Cancellation ends the run with [`SyncError::Cancelled`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use reliefsync_core::config::SyncConfig;
use reliefsync_core::domain::{IncidentId, NetworkId, ProgressStats, SyncStats};
use reliefsync_core::ports::{
    CommitOutcome, ILocationProvider, IRemoteDataSource, IWorksiteRepository, RecordShape,
};

use crate::context::SyncContext;
use crate::full::FullSyncer;
use crate::pager::commit_worksites;
use crate::progress::ProgressPublisher;
use crate::registry::IncidentSyncGuard;
use crate::short::ShortSyncer;
use crate::staging::PageStagingCache;
use crate::strategy::{StageReport, SyncOutcome, SyncReport, Syncer};
use crate::SyncError;

pub struct IncidentDataSyncer {
    ctx: SyncContext,
    short: ShortSyncer,
    full: FullSyncer,
    guard: IncidentSyncGuard,
}

impl IncidentDataSyncer {
    pub fn new(
        remote: Arc<dyn IRemoteDataSource>,
        store: Arc<dyn IWorksiteRepository>,
        staging: PageStagingCache,
        location: Arc<dyn ILocationProvider>,
        config: SyncConfig,
        app_build_version: i64,
    ) -> Self {
        let ctx = SyncContext {
            remote,
            store,
            staging: Arc::new(staging),
            progress: ProgressPublisher::new(),
            config: Arc::new(config),
            app_build_version,
        };
        Self::from_context(ctx, location)
    }

    /// Build with a staging directory taken from the configured max age
    pub fn with_staging_dir(
        remote: Arc<dyn IRemoteDataSource>,
        store: Arc<dyn IWorksiteRepository>,
        staging_dir: impl Into<std::path::PathBuf>,
        location: Arc<dyn ILocationProvider>,
        config: SyncConfig,
        app_build_version: i64,
    ) -> Self {
        let staging = PageStagingCache::new(
            staging_dir,
            Duration::from_secs(config.staging_max_age_secs),
        );
        Self::new(remote, store, staging, location, config, app_build_version)
    }

    pub fn from_context(ctx: SyncContext, location: Arc<dyn ILocationProvider>) -> Self {
        Self {
            short: ShortSyncer::new(ctx.clone()),
            full: FullSyncer::new(ctx.clone(), location),
            guard: IncidentSyncGuard::new(),
            ctx,
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Progress of the running pull; the latest snapshot only
    pub fn subscribe(&self) -> watch::Receiver<ProgressStats> {
        self.ctx.progress.subscribe()
    }

    pub fn is_running(&self, incident_id: IncidentId) -> bool {
        self.guard.is_running(incident_id)
    }

    // ========================================================================
    // sync()
    // ========================================================================

    /// Pull an incident into the local store
    ///
    /// # Errors
    /// - [`SyncError::AlreadyRunning`] if the incident is being pulled
    /// - [`SyncError::Cancelled`] if `cancel` fired
    /// - [`SyncError::Remote`] for remote failures that retrying won't fix
    /// - [`SyncError::Storage`] / [`SyncError::Staging`] for local failures
    #[tracing::instrument(skip(self, cancel))]
    pub async fn sync(
        &self,
        incident_id: IncidentId,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let _lease = self.guard.try_acquire(incident_id)?;
        let start = std::time::Instant::now();
        info!("Starting incident sync");

        let result = self.run(incident_id, cancel).await.map(|mut report| {
            report.duration_ms = start.elapsed().as_millis() as u64;
            report
        });

        match &result {
            Ok(report) => info!(
                outcome = report.outcome.label(),
                applied = report.applied(),
                skipped = report.skipped(),
                duration_ms = report.duration_ms,
                "Incident sync finished"
            ),
            Err(SyncError::Cancelled) => info!("Incident sync cancelled"),
            Err(e) => error!(error = %e, "Incident sync failed"),
        }
        result
    }

    async fn run(
        &self,
        incident_id: IncidentId,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let mut stages: Vec<StageReport> = Vec::with_capacity(3);

        let short = self.short.sync(incident_id, cancel).await?;
        let short_outcome = short.outcome.clone();
        stages.push(short);
        if !short_outcome.is_success() {
            return Ok(Self::report(incident_id, short_outcome, stages, None));
        }

        let pull = self.full.run(incident_id, cancel).await?;
        if let Some(secondary) = pull.secondary {
            stages.push(secondary);
        }
        let outcome = pull.full.outcome.clone();
        stages.push(pull.full);

        let teams = if outcome.is_success() {
            self.sync_teams(incident_id).await?
        } else {
            None
        };

        Ok(Self::report(incident_id, outcome, stages, teams))
    }

    fn report(
        incident_id: IncidentId,
        outcome: SyncOutcome,
        stages: Vec<StageReport>,
        teams: Option<CommitOutcome>,
    ) -> SyncReport {
        SyncReport {
            incident_id,
            outcome,
            stages,
            teams,
            duration_ms: 0,
        }
    }

    /// Pull the incident's teams; remote failures are logged, not fatal
    async fn sync_teams(&self, incident_id: IncidentId) -> Result<Option<CommitOutcome>, SyncError> {
        let teams = match self.ctx.remote.fetch_teams(incident_id).await {
            Ok(teams) => teams,
            Err(e) => {
                warn!(incident_id = %incident_id, error = %e, "Failed to pull teams");
                return Ok(None);
            }
        };

        let outcome = self
            .ctx
            .store
            .upsert_teams(incident_id, &teams, Utc::now())
            .await?;
        Ok(Some(outcome))
    }

    // ========================================================================
    // refresh_worksites()
    // ========================================================================

    /// Re-pull specific worksites in the full shape
    ///
    /// Records of other incidents are ignored. Locally modified worksites are
    /// skipped like in any other pull.
    pub async fn refresh_worksites(
        &self,
        incident_id: IncidentId,
        ids: &[NetworkId],
    ) -> Result<CommitOutcome, SyncError> {
        if ids.is_empty() {
            return Ok(CommitOutcome::default());
        }

        let records: Vec<_> = self
            .ctx
            .remote
            .fetch_worksites_by_ids(ids)
            .await?
            .into_iter()
            .filter(|record| record.incident == incident_id.get())
            .collect();

        let outcome = commit_worksites(&self.ctx, incident_id, RecordShape::Full, &records).await?;
        info!(
            incident_id = %incident_id,
            requested = ids.len(),
            received = records.len(),
            applied = outcome.applied(),
            "Refreshed worksites"
        );
        Ok(outcome)
    }

    /// Stored stats of every category, for status displays
    pub async fn stats(&self, incident_id: IncidentId) -> Result<Vec<SyncStats>, SyncError> {
        Ok(self.ctx.store.list_sync_stats(incident_id).await?)
    }
}
