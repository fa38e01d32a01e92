//! Paged fetch → stage → batched commit
//!
//! Every syncer moves data the same way: a page is fetched into the staging
//! cache (or found there), committed to the local store in transactions of
//! `commit_batch_size` records, and only then removed from staging. Paging
//! progress is persisted after each page so an interrupted pull resumes at
//! the page it stopped on.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use reliefsync_core::domain::{
    BoundingBox, IncidentId, LocalModifiedState, NetworkId, ProgressStats, SyncCategory,
    SyncStats,
};
use reliefsync_core::ports::{
    CommitOutcome, NetworkFlagsFormData, NetworkWorksite, RecordShape, RemoteError,
};

use crate::context::SyncContext;
use crate::staging::StageKey;
use crate::SyncError;

// ============================================================================
// PageSource
// ============================================================================

/// One pageable remote collection and how to commit it
#[async_trait::async_trait]
pub(crate) trait PageSource: Send + Sync {
    type Record: Serialize + DeserializeOwned + Send + Sync + 'static;

    fn key(&self, page_index: u64) -> StageKey;

    fn page_size(&self) -> u32;

    async fn fetch(&self, page_index: u64) -> Result<Vec<Self::Record>, RemoteError>;

    async fn commit(&self, records: &[Self::Record]) -> Result<CommitOutcome, SyncError>;
}

/// What one page contributed
#[derive(Debug, Default)]
pub(crate) struct PageResult {
    pub received: u64,
    pub commit: CommitOutcome,
}

/// What a linear pull contributed before it finished or stopped
#[derive(Debug, Default)]
pub(crate) struct LinearRun {
    pub pulled: u64,
    pub commit: CommitOutcome,
    /// Set when a transient failure ended the pull early
    pub interrupted: Option<String>,
}

impl LinearRun {
    fn absorb(&mut self, page: PageResult) {
        self.pulled += page.received;
        self.commit.merge(page.commit);
    }
}

// ============================================================================
// Page pipeline
// ============================================================================

/// Fetch (or reuse) one staged page and commit it batch by batch
pub(crate) async fn run_page<S: PageSource>(
    ctx: &SyncContext,
    source: &S,
    page_index: u64,
    cancel: &CancellationToken,
) -> Result<PageResult, SyncError> {
    let key = source.key(page_index);
    let records = ctx.staging.save(&key, || source.fetch(page_index)).await?;

    let mut result = PageResult {
        received: records.len() as u64,
        commit: CommitOutcome::default(),
    };

    for batch in records.chunks(ctx.config.effective_commit_batch_size()) {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        result.commit.merge(source.commit(batch).await?);
    }

    ctx.staging.delete(&key).await;
    Ok(result)
}

/// Page through `stats.target_count` records starting at the resume point
///
/// A short page means the server has no more records; the target is pinned
/// to what was paged so the epoch can complete.
pub(crate) async fn run_linear<S: PageSource>(
    ctx: &SyncContext,
    source: &S,
    stats: &mut SyncStats,
    cancel: &CancellationToken,
) -> Result<LinearRun, SyncError> {
    let page_size = u64::from(source.page_size());
    let mut page_index = stats.resume_page_index(source.page_size());
    let mut run = LinearRun::default();

    if page_index > 0 {
        debug!(
            incident_id = %stats.incident_id,
            category = %stats.category,
            page_index,
            paged = stats.paged_count,
            "Resuming pull"
        );
    }

    while stats.paged_count < stats.target_count {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let page = match run_page(ctx, source, page_index, cancel).await {
            Ok(page) => page,
            Err(SyncError::Remote(e)) => {
                debug!(
                    incident_id = %stats.incident_id,
                    category = %stats.category,
                    page_index,
                    "Pull stopped, will resume on next run"
                );
                run.interrupted = Some(ctx.record_failure(stats, e).await?);
                return Ok(run);
            }
            Err(e) => return Err(e),
        };

        let received = page.received;
        run.absorb(page);

        stats.record_page(page_index * page_size + received);
        if received < page_size {
            stats.target_count = stats.paged_count;
        }
        page_index += 1;

        ctx.save_stats(stats).await?;
        ctx.progress.publish(ProgressStats::new(
            stats.category.as_str(),
            stats.paged_count,
            stats.target_count,
        ));
    }

    if stats.mark_successful() {
        ctx.save_stats(stats).await?;
    }
    Ok(run)
}

// ============================================================================
// Commit helpers
// ============================================================================

/// Drop records that cannot be mapped to a local worksite
fn valid_worksites(records: &[NetworkWorksite]) -> Vec<NetworkWorksite> {
    records
        .iter()
        .filter(|record| match record.to_worksite() {
            Ok(_) => true,
            Err(e) => {
                warn!(network_id = record.id, error = %e, "Skipping malformed worksite record");
                false
            }
        })
        .cloned()
        .collect()
}

async fn expected_states(
    ctx: &SyncContext,
    incident_id: IncidentId,
    ids: &[NetworkId],
) -> Result<HashMap<NetworkId, LocalModifiedState>, SyncError> {
    Ok(ctx.store.local_modified_states(incident_id, ids).await?)
}

pub(crate) async fn commit_worksites(
    ctx: &SyncContext,
    incident_id: IncidentId,
    shape: RecordShape,
    records: &[NetworkWorksite],
) -> Result<CommitOutcome, SyncError> {
    let records = valid_worksites(records);
    let ids: Vec<NetworkId> = records
        .iter()
        .filter_map(|record| record.network_id().ok())
        .collect();

    let expected = expected_states(ctx, incident_id, &ids).await?;
    let outcome = ctx
        .store
        .upsert_worksites(incident_id, shape, &records, &expected, Utc::now())
        .await?;
    Ok(outcome)
}

// ============================================================================
// Sources
// ============================================================================

/// Worksites of an incident in id order
pub(crate) struct WorksitePages {
    pub ctx: SyncContext,
    pub incident_id: IncidentId,
    pub category: SyncCategory,
    pub shape: RecordShape,
    pub page_size: u32,
    pub expected_count: u64,
    pub updated_after: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
impl PageSource for WorksitePages {
    type Record = NetworkWorksite;

    fn key(&self, page_index: u64) -> StageKey {
        StageKey::new(
            self.incident_id,
            self.category,
            page_index,
            self.expected_count,
        )
        .updated_after(self.updated_after)
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }

    async fn fetch(&self, page_index: u64) -> Result<Vec<NetworkWorksite>, RemoteError> {
        self.ctx
            .remote
            .fetch_worksites_page(
                self.incident_id,
                self.shape,
                self.page_size,
                page_index,
                self.updated_after,
            )
            .await
    }

    async fn commit(&self, records: &[NetworkWorksite]) -> Result<CommitOutcome, SyncError> {
        commit_worksites(&self.ctx, self.incident_id, self.shape, records).await
    }
}

/// Full worksites inside one grid cell
pub(crate) struct BoundsPages {
    pub ctx: SyncContext,
    pub incident_id: IncidentId,
    /// The whole spatial area the grid was laid over
    pub area: BoundingBox,
    pub bounds: BoundingBox,
    pub cell: usize,
    pub page_size: u32,
    pub expected_count: u64,
}

#[async_trait::async_trait]
impl PageSource for BoundsPages {
    type Record = NetworkWorksite;

    fn key(&self, page_index: u64) -> StageKey {
        StageKey::new(
            self.incident_id,
            SyncCategory::Full,
            page_index,
            self.expected_count,
        )
        .in_cell(&self.area, self.cell)
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }

    async fn fetch(&self, page_index: u64) -> Result<Vec<NetworkWorksite>, RemoteError> {
        self.ctx
            .remote
            .fetch_worksites_in_bounds(self.incident_id, &self.bounds, self.page_size, page_index)
            .await
    }

    async fn commit(&self, records: &[NetworkWorksite]) -> Result<CommitOutcome, SyncError> {
        commit_worksites(&self.ctx, self.incident_id, RecordShape::Full, records).await
    }
}

/// Flags and form data of an incident in worksite id order
pub(crate) struct FlagsFormDataPages {
    pub ctx: SyncContext,
    pub incident_id: IncidentId,
    pub page_size: u32,
    pub expected_count: u64,
    pub updated_after: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
impl PageSource for FlagsFormDataPages {
    type Record = NetworkFlagsFormData;

    fn key(&self, page_index: u64) -> StageKey {
        StageKey::new(
            self.incident_id,
            SyncCategory::Secondary,
            page_index,
            self.expected_count,
        )
        .updated_after(self.updated_after)
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }

    async fn fetch(&self, page_index: u64) -> Result<Vec<NetworkFlagsFormData>, RemoteError> {
        self.ctx
            .remote
            .fetch_flags_form_data_page(
                self.incident_id,
                self.page_size,
                page_index,
                self.updated_after,
            )
            .await
    }

    async fn commit(&self, records: &[NetworkFlagsFormData]) -> Result<CommitOutcome, SyncError> {
        let (records, ids): (Vec<NetworkFlagsFormData>, Vec<NetworkId>) = records
            .iter()
            .filter_map(|record| match NetworkId::new(record.id) {
                Ok(id) => Some((record.clone(), id)),
                Err(e) => {
                    warn!(network_id = record.id, error = %e, "Skipping malformed secondary record");
                    None
                }
            })
            .unzip();

        let expected = expected_states(&self.ctx, self.incident_id, &ids).await?;
        let outcome = self
            .ctx
            .store
            .upsert_flags_form_data(self.incident_id, &records, &expected, Utc::now())
            .await?;
        Ok(outcome)
    }
}
