//! Short payload pull
//!
//! Before the first full pull of an incident, every worksite is pulled in
//! the short shape (core fields and work types) so the map and case list are
//! usable quickly. Short upserts never touch notes, flags or form data.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use reliefsync_core::domain::{EpochKind, IncidentId, SyncCategory, SyncStats};
use reliefsync_core::ports::RecordShape;

use crate::context::SyncContext;
use crate::pager::{run_linear, WorksitePages};
use crate::strategy::{StageReport, SyncOutcome, Syncer};
use crate::SyncError;

pub struct ShortSyncer {
    ctx: SyncContext,
}

impl ShortSyncer {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl Syncer for ShortSyncer {
    fn category(&self) -> SyncCategory {
        SyncCategory::Short
    }

    async fn stats(&self, incident_id: IncidentId) -> Result<SyncStats, SyncError> {
        self.ctx.load_stats(incident_id, SyncCategory::Short).await
    }

    async fn sync(
        &self,
        incident_id: IncidentId,
        cancel: &CancellationToken,
    ) -> Result<StageReport, SyncError> {
        let mut stats = self.stats(incident_id).await?;
        if stats.is_synced() {
            return Ok(StageReport::new(SyncCategory::Short, SyncOutcome::UpToDate));
        }

        let resuming = stats.paged_count > 0;
        if !resuming {
            let count = match self.ctx.remote.count_worksites(incident_id, None).await {
                Ok(count) => count,
                Err(e) => {
                    let reason = self.ctx.record_failure(&mut stats, e).await?;
                    return Ok(StageReport::new(
                        SyncCategory::Short,
                        SyncOutcome::Incomplete { reason },
                    ));
                }
            };
            stats.start_epoch(Utc::now(), count, EpochKind::Paged);
            self.ctx.save_stats(&stats).await?;
        }

        info!(
            incident_id = %incident_id,
            target = stats.target_count,
            paged = stats.paged_count,
            "Starting short pull"
        );

        let source = WorksitePages {
            ctx: self.ctx.clone(),
            incident_id,
            category: SyncCategory::Short,
            shape: RecordShape::Short,
            page_size: self.ctx.config.effective_page_size(),
            expected_count: stats.target_count,
            updated_after: None,
        };
        let run = run_linear(&self.ctx, &source, &mut stats, cancel).await?;

        let outcome = match run.interrupted {
            Some(reason) => SyncOutcome::Incomplete { reason },
            None => SyncOutcome::Completed,
        };
        Ok(StageReport::new(SyncCategory::Short, outcome).with_counts(run.pulled, run.commit))
    }
}
