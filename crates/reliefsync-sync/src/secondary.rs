//! Flags and form data pull
//!
//! Secondary data is pulled for the whole incident, independently of the
//! worksite pull that stored the cases. It has its own stats row and page
//! size:
//!
//! - never synced, or interrupted: full resumable pull
//! - synced, younger than `secondary_stale_after_secs`: nothing to do
//! - synced, older: delta pull of records updated since the last success
//!
//! Only worksites already stored locally receive secondary data, and local
//! edits are never overwritten.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use reliefsync_core::domain::{EpochKind, IncidentId, SyncCategory, SyncStats};

use crate::context::SyncContext;
use crate::pager::{run_linear, FlagsFormDataPages};
use crate::strategy::{StageReport, SyncOutcome, Syncer};
use crate::SyncError;

pub struct SecondarySyncer {
    ctx: SyncContext,
}

impl SecondarySyncer {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    fn incomplete(reason: String) -> StageReport {
        StageReport::new(SyncCategory::Secondary, SyncOutcome::Incomplete { reason })
    }
}

#[async_trait::async_trait]
impl Syncer for SecondarySyncer {
    fn category(&self) -> SyncCategory {
        SyncCategory::Secondary
    }

    async fn stats(&self, incident_id: IncidentId) -> Result<SyncStats, SyncError> {
        self.ctx
            .load_stats(incident_id, SyncCategory::Secondary)
            .await
    }

    async fn sync(
        &self,
        incident_id: IncidentId,
        cancel: &CancellationToken,
    ) -> Result<StageReport, SyncError> {
        let mut stats = self.stats(incident_id).await?;
        let now = Utc::now();
        let stale_after =
            i64::try_from(self.ctx.config.secondary_stale_after_secs).unwrap_or(i64::MAX);

        // After a first success every epoch is a delta, including resumed ones
        let updated_after = stats.successful_sync;
        let is_delta = updated_after.is_some();

        let start_epoch = if stats.is_synced() {
            let age = stats.seconds_since_success(now).unwrap_or(i64::MAX);
            if age < stale_after {
                debug!(incident_id = %incident_id, age_secs = age, "Secondary data is fresh");
                return Ok(StageReport::new(SyncCategory::Secondary, SyncOutcome::UpToDate));
            }
            true
        } else {
            stats.paged_count == 0
        };

        if start_epoch {
            let count = match self
                .ctx
                .remote
                .count_worksites(incident_id, updated_after)
                .await
            {
                Ok(count) => count,
                Err(e) => {
                    let reason = self.ctx.record_failure(&mut stats, e).await?;
                    return Ok(Self::incomplete(reason));
                }
            };
            let epoch = if is_delta {
                EpochKind::Delta
            } else {
                EpochKind::Paged
            };
            stats.start_epoch(now, count, epoch);
            self.ctx.save_stats(&stats).await?;
        }

        info!(
            incident_id = %incident_id,
            target = stats.target_count,
            paged = stats.paged_count,
            delta = is_delta,
            "Starting secondary pull"
        );

        let source = FlagsFormDataPages {
            ctx: self.ctx.clone(),
            incident_id,
            page_size: self.ctx.config.effective_secondary_page_size(),
            expected_count: stats.target_count,
            updated_after,
        };
        let run = run_linear(&self.ctx, &source, &mut stats, cancel).await?;

        let outcome = match run.interrupted {
            Some(reason) => SyncOutcome::Incomplete { reason },
            None if is_delta => SyncOutcome::Delta,
            None => SyncOutcome::Completed,
        };
        Ok(StageReport::new(SyncCategory::Secondary, outcome).with_counts(run.pulled, run.commit))
    }
}
