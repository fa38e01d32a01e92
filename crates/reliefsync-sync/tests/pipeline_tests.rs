//! Integration tests for the incident pull pipeline
//!
//! The pipeline runs against an in-memory fake of the server and the real
//! SQLite store, so conflict handling and resumability are exercised end to
//! end. Each test creates a fresh database and staging directory.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use reliefsync_cache::{DatabasePool, SqliteWorksiteChangeRepository, SqliteWorksiteRepository};
use reliefsync_core::config::SyncConfig;
use reliefsync_core::domain::{
    BoundingBox, Coordinates, EpochKind, IncidentId, NetworkId, OrganizationId, SyncCategory,
    SyncStats, SECONDARY_DATA_VERSION,
};
use reliefsync_core::ports::{
    FixedLocation, IRemoteDataSource, IWorksiteChangeRepository, IWorksiteRepository, NetworkFlag,
    NetworkFlagsFormData, NetworkFormData, NetworkNote, NetworkTeam, NetworkWorkType,
    NetworkWorksite, RecordShape, RemoteError,
};
use reliefsync_sync::secondary::SecondarySyncer;
use reliefsync_sync::{
    IncidentDataSyncer, PageStagingCache, StageKey, SyncContext, SyncError, SyncOutcome, Syncer,
};

// ============================================================================
// Fake server
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Page { shape: RecordShape, page_index: u64 },
    Bounds { page_index: u64 },
    Secondary {
        page_index: u64,
        updated_after: Option<DateTime<Utc>>,
    },
}

/// A planned failure of the `skip + 1`th matching request
struct Failure {
    request: Request,
    skip: usize,
    error: RemoteError,
}

#[derive(Default)]
struct FakeRemote {
    worksites: Mutex<Vec<NetworkWorksite>>,
    requests: Mutex<Vec<Request>>,
    failures: Mutex<Vec<Failure>>,
    cancel_on: Mutex<Option<(Request, CancellationToken)>>,
    /// Held by a test to pause `count_worksites`
    gate: tokio::sync::Mutex<()>,
}

impl FakeRemote {
    fn new(worksites: Vec<NetworkWorksite>) -> Self {
        Self {
            worksites: Mutex::new(worksites),
            ..Default::default()
        }
    }

    fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    fn pages(&self, shape: RecordShape) -> Vec<u64> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request {
                Request::Page { shape: s, page_index } if s == shape => Some(page_index),
                _ => None,
            })
            .collect()
    }

    fn secondary_requests(&self) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|request| matches!(request, Request::Secondary { .. }))
            .collect()
    }

    fn fail_once(&self, request: Request) {
        self.fail_after(request, 0, RemoteError::Network("connection reset by peer".to_string()));
    }

    fn fail_after(&self, request: Request, skip: usize, error: RemoteError) {
        self.failures.lock().unwrap().push(Failure {
            request,
            skip,
            error,
        });
    }

    fn cancel_at(&self, request: Request, token: CancellationToken) {
        *self.cancel_on.lock().unwrap() = Some((request, token));
    }

    /// Publish a newer server version of a worksite
    fn update(&self, id: i64, address: &str, updated_at: DateTime<Utc>) {
        let mut worksites = self.worksites.lock().unwrap();
        let record = worksites.iter_mut().find(|w| w.id == id).unwrap();
        record.address = address.to_string();
        record.updated_at = updated_at;
    }

    fn track(&self, request: Request) -> Result<(), RemoteError> {
        self.requests.lock().unwrap().push(request);

        let mut failures = self.failures.lock().unwrap();
        if let Some(pos) = failures.iter().position(|f| f.request == request) {
            if failures[pos].skip == 0 {
                return Err(failures.remove(pos).error);
            }
            failures[pos].skip -= 1;
        }

        if let Some((at, token)) = self.cancel_on.lock().unwrap().as_ref() {
            if *at == request {
                token.cancel();
            }
        }
        Ok(())
    }

    fn matching(&self, updated_after: Option<DateTime<Utc>>) -> Vec<NetworkWorksite> {
        self.worksites
            .lock()
            .unwrap()
            .iter()
            .filter(|w| updated_after.map_or(true, |after| w.updated_at > after))
            .cloned()
            .collect()
    }

    fn in_bounds(&self, bounds: &BoundingBox) -> Vec<NetworkWorksite> {
        self.worksites
            .lock()
            .unwrap()
            .iter()
            .filter(|w| {
                bounds.contains(&Coordinates {
                    latitude: w.latitude,
                    longitude: w.longitude,
                })
            })
            .cloned()
            .collect()
    }
}

fn page_of<T>(items: Vec<T>, page_size: u32, page_index: u64) -> Vec<T> {
    let offset = (u64::from(page_size) * page_index) as usize;
    items
        .into_iter()
        .skip(offset)
        .take(page_size as usize)
        .collect()
}

#[async_trait::async_trait]
impl IRemoteDataSource for FakeRemote {
    async fn count_worksites(
        &self,
        _incident_id: IncidentId,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<u64, RemoteError> {
        let _gate = self.gate.lock().await;
        Ok(self.matching(updated_after).len() as u64)
    }

    async fn fetch_worksites_page(
        &self,
        _incident_id: IncidentId,
        shape: RecordShape,
        page_size: u32,
        page_index: u64,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<NetworkWorksite>, RemoteError> {
        self.track(Request::Page { shape, page_index })?;
        let mut page = page_of(self.matching(updated_after), page_size, page_index);
        if shape == RecordShape::Short {
            for record in &mut page {
                record.flags.clear();
                record.notes.clear();
                record.form_data.clear();
            }
        }
        Ok(page)
    }

    async fn count_worksites_in_bounds(
        &self,
        _incident_id: IncidentId,
        bounds: &BoundingBox,
    ) -> Result<u64, RemoteError> {
        Ok(self.in_bounds(bounds).len() as u64)
    }

    async fn fetch_worksites_in_bounds(
        &self,
        _incident_id: IncidentId,
        bounds: &BoundingBox,
        page_size: u32,
        page_index: u64,
    ) -> Result<Vec<NetworkWorksite>, RemoteError> {
        self.track(Request::Bounds { page_index })?;
        Ok(page_of(self.in_bounds(bounds), page_size, page_index))
    }

    async fn fetch_worksites_by_ids(
        &self,
        ids: &[NetworkId],
    ) -> Result<Vec<NetworkWorksite>, RemoteError> {
        Ok(self
            .worksites
            .lock()
            .unwrap()
            .iter()
            .filter(|w| ids.iter().any(|id| id.get() == w.id))
            .cloned()
            .collect())
    }

    async fn fetch_flags_form_data_page(
        &self,
        _incident_id: IncidentId,
        page_size: u32,
        page_index: u64,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<NetworkFlagsFormData>, RemoteError> {
        self.track(Request::Secondary {
            page_index,
            updated_after,
        })?;
        let secondary = self
            .matching(updated_after)
            .into_iter()
            .map(|w| NetworkFlagsFormData {
                id: w.id,
                updated_at: w.updated_at,
                flags: w.flags,
                form_data: w.form_data,
            })
            .collect();
        Ok(page_of(secondary, page_size, page_index))
    }

    async fn fetch_teams(&self, incident_id: IncidentId) -> Result<Vec<NetworkTeam>, RemoteError> {
        Ok(vec![NetworkTeam {
            id: 71,
            incident: incident_id.get(),
            name: "Sawyers".to_string(),
            color: Some("#ff8800".to_string()),
            users: vec![5, 6, 7],
            updated_at: Some(t0()),
        }])
    }
}

// ============================================================================
// Test helpers
// ============================================================================

fn incident() -> IncidentId {
    IncidentId::new(151).unwrap()
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn center() -> Coordinates {
    Coordinates::new(29.95, -90.07).unwrap()
}

/// A full worksite within ~10 km of `center()`
fn record(id: i64) -> NetworkWorksite {
    NetworkWorksite {
        id,
        incident: incident().get(),
        address: format!("{id} Bayou Rd"),
        case_number: format!("W{id}"),
        city: "Lafitte".to_string(),
        county: "Jefferson".to_string(),
        created_at: Some(t0()),
        email: None,
        key_work_type: Some("muck_out".to_string()),
        latitude: 29.95 + ((id % 30) as f64 - 15.0) * 0.006,
        longitude: -90.07 + ((id / 30 % 30) as f64 - 15.0) * 0.006,
        name: "Resident".to_string(),
        phone1: "555-0100".to_string(),
        postal_code: "70067".to_string(),
        state: "LA".to_string(),
        svi: None,
        updated_at: t0(),
        what3words: None,
        work_types: vec![NetworkWorkType {
            id: id * 10,
            created_at: Some(t0()),
            claimed_by: None,
            next_recur_at: None,
            phase: Some(4),
            recur: None,
            status: "open_unassigned".to_string(),
            work_type: "muck_out".to_string(),
        }],
        flags: vec![NetworkFlag {
            id: id * 10 + 1,
            created_at: Some(t0()),
            is_high_priority: false,
            notes: None,
            reason_t: "flag.worksite_wrong_location".to_string(),
            requested_action: None,
        }],
        notes: vec![NetworkNote {
            id: id * 10 + 2,
            created_at: Some(t0()),
            is_survivor: false,
            note: "Crawlspace flooded".to_string(),
        }],
        form_data: vec![NetworkFormData {
            field_key: "habitable".to_string(),
            field_value: serde_json::Value::Bool(true),
        }],
    }
}

struct Fixture {
    remote: Arc<FakeRemote>,
    store: Arc<SqliteWorksiteRepository>,
    changes: SqliteWorksiteChangeRepository,
    syncer: Arc<IncidentDataSyncer>,
    staging: TempDir,
    _pool: DatabasePool,
}

async fn setup(count: i64, location: Option<Coordinates>) -> Fixture {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let store = Arc::new(SqliteWorksiteRepository::new(pool.pool().clone()));
    let changes = SqliteWorksiteChangeRepository::new(pool.pool().clone(), 230);
    let remote = Arc::new(FakeRemote::new((1..=count).map(record).collect()));
    let staging = TempDir::new().unwrap();

    let location = match location {
        Some(here) => FixedLocation::new(here),
        None => FixedLocation::unknown(),
    };
    let syncer = IncidentDataSyncer::new(
        remote.clone(),
        store.clone(),
        PageStagingCache::new(staging.path(), std::time::Duration::from_secs(3600)),
        Arc::new(location),
        SyncConfig::default(),
        230,
    );

    Fixture {
        remote,
        store,
        changes,
        syncer: Arc::new(syncer),
        staging,
        _pool: pool,
    }
}

/// Another device over the same server, store and staging directory
fn syncer_at(f: &Fixture, here: Coordinates) -> IncidentDataSyncer {
    IncidentDataSyncer::new(
        f.remote.clone(),
        f.store.clone(),
        staging_cache(f),
        Arc::new(FixedLocation::new(here)),
        SyncConfig::default(),
        230,
    )
}

fn staging_cache(f: &Fixture) -> PageStagingCache {
    PageStagingCache::new(f.staging.path(), std::time::Duration::from_secs(3600))
}

async fn stored_stats(f: &Fixture, category: SyncCategory) -> Option<SyncStats> {
    f.store.get_sync_stats(incident(), category).await.unwrap()
}

async fn sync(f: &Fixture) -> Result<reliefsync_sync::SyncReport, SyncError> {
    f.syncer.sync(incident(), &CancellationToken::new()).await
}

async fn stored_address(f: &Fixture, network_id: i64) -> String {
    f.store
        .get_worksite_by_network_id(incident(), NetworkId::new(network_id).unwrap())
        .await
        .unwrap()
        .unwrap()
        .address
}

// ============================================================================
// Strategy scenarios
// ============================================================================

#[tokio::test]
async fn test_small_incident_pulls_every_page_once() {
    let f = setup(500, Some(center())).await;
    let mut progress = f.syncer.subscribe();

    let report = sync(&f).await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::Completed);
    assert_eq!(f.remote.pages(RecordShape::Short), (0..13).collect::<Vec<_>>());
    assert_eq!(f.remote.pages(RecordShape::Full), (0..13).collect::<Vec<_>>());
    assert_eq!(f.store.count_worksites(incident()).await.unwrap(), 500);

    let full = report.stage(SyncCategory::Full).unwrap();
    assert_eq!(full.pulled, 500);
    assert_eq!(full.commit.updated, 500);

    let stats = f
        .store
        .get_sync_stats(incident(), SyncCategory::Full)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.paged_count, 500);
    assert_eq!(stats.target_count, 500);
    assert_eq!(stats.successful_sync, Some(stats.sync_start));
    assert!(stats.bounded.is_none());

    assert!(progress.has_changed().unwrap());
    let latest = progress.borrow_and_update().clone();
    assert_eq!(latest.name, "full");
    assert_eq!(latest.pulled_count, 500);
    assert_eq!(latest.total_count, 500);

    assert_eq!(report.teams.map(|t| t.inserted), Some(1));
    assert_eq!(f.store.list_teams(incident()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_large_incident_pulls_spatially() {
    let f = setup(1000, Some(center())).await;

    let report = sync(&f).await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::Converged);
    assert!(f.remote.pages(RecordShape::Full).is_empty());

    let secondary = report.stage(SyncCategory::Secondary).unwrap();
    assert_eq!(secondary.outcome, SyncOutcome::Completed);
    assert_eq!(f.remote.secondary_requests().len(), 4);

    let full = report.stage(SyncCategory::Full).unwrap();
    assert_eq!(full.pulled, 1000);
    assert_eq!(f.store.count_worksites(incident()).await.unwrap(), 1000);

    let stats = f
        .store
        .get_sync_stats(incident(), SyncCategory::Full)
        .await
        .unwrap()
        .unwrap();
    let bounded = stats.bounded.unwrap();
    assert_eq!(bounded.center, center());
    assert_eq!(bounded.fetched_count, 1000);
    assert_eq!(stats.paged_count, stats.target_count);
    assert!(stats.is_synced());
}

#[tokio::test]
async fn test_large_incident_without_location_is_deferred() {
    let f = setup(1000, None).await;

    let report = sync(&f).await.unwrap();

    assert!(matches!(report.outcome, SyncOutcome::Deferred { .. }));
    assert_eq!(
        report.stage(SyncCategory::Short).unwrap().outcome,
        SyncOutcome::Completed
    );
    assert!(f.remote.pages(RecordShape::Full).is_empty());
    assert!(report.teams.is_none());

    let stats = f.syncer.stats(incident()).await.unwrap();
    assert!(stats.iter().all(|s| s.category != SyncCategory::Full));
}

#[tokio::test]
async fn test_moved_device_finishes_interrupted_spatial_pull() {
    let f = setup(1000, Some(center())).await;
    assert_eq!(sync(&f).await.unwrap().outcome, SyncOutcome::Converged);

    // ~15 km north, past the location change threshold
    let moved = Coordinates::new(29.95 + 0.135, -90.07).unwrap();
    let away = syncer_at(&f, moved);
    f.remote.fail_once(Request::Bounds { page_index: 1 });

    let report = away.sync(incident(), &CancellationToken::new()).await.unwrap();
    assert!(matches!(report.outcome, SyncOutcome::Incomplete { .. }));
    let stats = stored_stats(&f, SyncCategory::Full).await.unwrap();
    assert_eq!(stats.epoch, EpochKind::Spatial);
    assert_eq!(stats.bounded.unwrap().center, moved);
    assert!(!stats.is_synced());
    assert_eq!(stats.attempted_counter, 1);

    f.remote.clear_requests();
    let report = away.sync(incident(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::Converged);
    assert!(f.remote.pages(RecordShape::Full).is_empty());
    let stats = stored_stats(&f, SyncCategory::Full).await.unwrap();
    let bounded = stats.bounded.unwrap();
    assert_eq!(bounded.center, moved);
    assert_eq!(bounded.fetched_count, 1000);
    assert!(stats.is_synced());
    assert_eq!(stats.attempted_counter, 0);
}

#[tokio::test]
async fn test_spatial_pull_resumes_at_failed_cell() {
    let f = setup(1000, Some(center())).await;
    // Every cell requests page 0 once; fail the fourth cell
    f.remote.fail_after(
        Request::Bounds { page_index: 0 },
        3,
        RemoteError::Server {
            status: 503,
            message: "unavailable".to_string(),
        },
    );

    let report = sync(&f).await.unwrap();
    assert!(matches!(report.outcome, SyncOutcome::Incomplete { .. }));
    let before = stored_stats(&f, SyncCategory::Full)
        .await
        .unwrap()
        .bounded
        .unwrap();
    assert_eq!(before.cell_index, 3);
    assert!(before.fetched_count > 0 && before.fetched_count < 1000);

    f.remote.clear_requests();
    let report = sync(&f).await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::Converged);
    let first_pages = f
        .remote
        .requests()
        .into_iter()
        .filter(|r| *r == Request::Bounds { page_index: 0 })
        .count();
    assert_eq!(first_pages, 25 - 3);
    let full = report.stage(SyncCategory::Full).unwrap();
    assert_eq!(before.fetched_count + full.pulled, 1000);

    let stats = stored_stats(&f, SyncCategory::Full).await.unwrap();
    assert_eq!(stats.bounded.unwrap().fetched_count, 1000);
    assert!(stats.is_synced());
}

// ============================================================================
// Secondary data
// ============================================================================

#[tokio::test]
async fn test_secondary_stats_from_older_version_force_clean_pull() {
    let f = setup(1000, Some(center())).await;

    let mut old = SyncStats::new(incident(), SyncCategory::Secondary, 230, t0());
    old.data_version = SECONDARY_DATA_VERSION - 1;
    old.start_epoch(t0(), 1000, EpochKind::Paged);
    old.record_page(1000);
    old.mark_successful();
    f.store.save_sync_stats(&old).await.unwrap();

    let staging = staging_cache(&f);
    let staged = StageKey::new(incident(), SyncCategory::Secondary, 0, 1000);
    staging
        .save(&staged, || async { Ok::<_, RemoteError>(vec![1u64]) })
        .await
        .unwrap();

    let stats = f
        .syncer
        .context()
        .load_stats(incident(), SyncCategory::Secondary)
        .await
        .unwrap();
    assert_eq!(stats.data_version, SECONDARY_DATA_VERSION);
    assert!(stats.successful_sync.is_none());
    assert_eq!(stats.paged_count, 0);
    assert!(stored_stats(&f, SyncCategory::Secondary).await.is_none());
    assert!(staging.load::<u64>(&staged).await.is_none());

    f.store.save_sync_stats(&old).await.unwrap();
    let report = sync(&f).await.unwrap();

    let secondary = report.stage(SyncCategory::Secondary).unwrap();
    assert_eq!(secondary.outcome, SyncOutcome::Completed);
    assert_eq!(
        f.remote.secondary_requests().first(),
        Some(&Request::Secondary {
            page_index: 0,
            updated_after: None,
        })
    );
    let stored = stored_stats(&f, SyncCategory::Secondary).await.unwrap();
    assert_eq!(stored.data_version, SECONDARY_DATA_VERSION);
    assert!(stored.is_synced());
}

#[tokio::test]
async fn test_secondary_pull_skips_fresh_data_and_deltas_stale_data() {
    let f = setup(1000, Some(center())).await;
    sync(&f).await.unwrap();
    let synced_at = stored_stats(&f, SyncCategory::Secondary)
        .await
        .unwrap()
        .successful_sync;
    assert!(synced_at.is_some());
    f.remote.clear_requests();

    let fresh = SecondarySyncer::new(f.syncer.context().clone());
    let report = fresh.sync(incident(), &CancellationToken::new()).await.unwrap();
    assert_eq!(report.outcome, SyncOutcome::UpToDate);
    assert!(f.remote.secondary_requests().is_empty());

    f.remote.update(7, "7 Levee St", Utc::now() + Duration::hours(1));
    let ctx = SyncContext {
        config: Arc::new(SyncConfig {
            secondary_stale_after_secs: 0,
            ..SyncConfig::default()
        }),
        ..f.syncer.context().clone()
    };
    let stale = SecondarySyncer::new(ctx);
    let report = stale.sync(incident(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::Delta);
    assert_eq!(report.pulled, 1);
    assert_eq!(
        f.remote.secondary_requests(),
        vec![Request::Secondary {
            page_index: 0,
            updated_after: synced_at,
        }]
    );
}

// ============================================================================
// Delta and conflict safety
// ============================================================================

#[tokio::test]
async fn test_repeated_sync_is_idempotent() {
    let f = setup(120, None).await;
    sync(&f).await.unwrap();
    f.remote.clear_requests();

    let report = sync(&f).await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::Delta);
    assert_eq!(
        report.stage(SyncCategory::Short).unwrap().outcome,
        SyncOutcome::UpToDate
    );
    assert_eq!(report.applied(), 0);
    assert!(f.remote.pages(RecordShape::Short).is_empty());
    assert_eq!(f.store.count_worksites(incident()).await.unwrap(), 120);
}

#[tokio::test]
async fn test_second_run_pulls_only_changes() {
    let f = setup(120, None).await;
    sync(&f).await.unwrap();
    f.remote.clear_requests();
    f.remote.update(7, "7 Levee St", Utc::now() + Duration::hours(1));

    let report = sync(&f).await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::Delta);
    let full = report.stage(SyncCategory::Full).unwrap();
    assert_eq!(full.pulled, 1);
    assert_eq!(full.commit.updated, 1);
    assert_eq!(f.remote.pages(RecordShape::Full), vec![0]);
    assert_eq!(stored_address(&f, 7).await, "7 Levee St");
}

#[tokio::test]
async fn test_local_edit_survives_pull() {
    let f = setup(120, None).await;
    sync(&f).await.unwrap();

    let before = f
        .store
        .get_worksite_by_network_id(incident(), NetworkId::new(12).unwrap())
        .await
        .unwrap()
        .unwrap();
    let mut after = before.clone();
    after.address = "12 Higher Ground Ln".to_string();
    f.changes
        .save_change(&before, &after, None, OrganizationId::new(88).unwrap())
        .await
        .unwrap();

    f.remote.update(12, "12 Server Side Rd", Utc::now() + Duration::hours(1));
    let report = sync(&f).await.unwrap();

    let full = report.stage(SyncCategory::Full).unwrap();
    assert_eq!(full.commit.skipped, 1);
    assert_eq!(full.commit.applied(), 0);
    assert_eq!(stored_address(&f, 12).await, "12 Higher Ground Ln");
}

#[tokio::test]
async fn test_refresh_applies_only_newer_versions() {
    let f = setup(40, None).await;
    sync(&f).await.unwrap();
    f.remote.update(9, "9 Refreshed Ave", Utc::now() + Duration::hours(1));

    let ids = [NetworkId::new(9).unwrap(), NetworkId::new(10).unwrap()];
    let outcome = f.syncer.refresh_worksites(incident(), &ids).await.unwrap();

    assert_eq!(outcome.updated, 1);
    assert_eq!(outcome.skipped, 1);
    assert_eq!(stored_address(&f, 9).await, "9 Refreshed Ave");
}

// ============================================================================
// Interruption and resumability
// ============================================================================

#[tokio::test]
async fn test_transient_failure_resumes_at_failed_page() {
    let f = setup(500, None).await;
    f.remote.fail_once(Request::Page {
        shape: RecordShape::Full,
        page_index: 5,
    });

    let report = sync(&f).await.unwrap();
    assert!(matches!(report.outcome, SyncOutcome::Incomplete { .. }));
    assert!(report.teams.is_none());

    let stats = f
        .store
        .get_sync_stats(incident(), SyncCategory::Full)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.paged_count, 200);
    assert_eq!(stats.attempted_counter, 1);
    assert!(stats.successful_sync.is_none());

    f.remote.clear_requests();
    let report = sync(&f).await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::Completed);
    assert_eq!(f.remote.pages(RecordShape::Full), (5..13).collect::<Vec<_>>());
    let stats = f
        .store
        .get_sync_stats(incident(), SyncCategory::Full)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.paged_count, 500);
    assert_eq!(stats.attempted_counter, 0);
}

#[tokio::test]
async fn test_rejected_request_is_counted_as_attempt() {
    let f = setup(500, None).await;
    f.remote.fail_after(
        Request::Page {
            shape: RecordShape::Full,
            page_index: 2,
        },
        0,
        RemoteError::Server {
            status: 404,
            message: "incident not found".to_string(),
        },
    );

    let err = sync(&f).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Remote(RemoteError::Server { status: 404, .. })
    ));

    let stats = stored_stats(&f, SyncCategory::Full).await.unwrap();
    assert_eq!(stats.paged_count, 80);
    assert_eq!(stats.attempted_counter, 1);
    assert!(stats.attempted_sync.is_some());

    f.remote.clear_requests();
    let report = sync(&f).await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::Completed);
    assert_eq!(f.remote.pages(RecordShape::Full), (2..13).collect::<Vec<_>>());
    let stats = stored_stats(&f, SyncCategory::Full).await.unwrap();
    assert_eq!(stats.attempted_counter, 0);
}

#[tokio::test]
async fn test_cancelled_run_reuses_staged_page() {
    let f = setup(500, None).await;
    let cancel = CancellationToken::new();
    f.remote.cancel_at(
        Request::Page {
            shape: RecordShape::Short,
            page_index: 3,
        },
        cancel.clone(),
    );

    let err = f.syncer.sync(incident(), &cancel).await.unwrap_err();
    assert!(err.is_cancelled());

    let stats = f
        .store
        .get_sync_stats(incident(), SyncCategory::Short)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.paged_count, 120);
    assert_eq!(stats.attempted_counter, 0);
    assert_eq!(std::fs::read_dir(f.staging.path()).unwrap().count(), 1);

    f.remote.clear_requests();
    let report = sync(&f).await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::Completed);
    assert_eq!(f.remote.pages(RecordShape::Short), (4..13).collect::<Vec<_>>());
    assert_eq!(f.store.count_worksites(incident()).await.unwrap(), 500);
    assert_eq!(std::fs::read_dir(f.staging.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_concurrent_sync_of_same_incident_is_rejected() {
    let f = setup(40, None).await;
    let gate = f.remote.gate.lock().await;

    let syncer = f.syncer.clone();
    let first = tokio::spawn(async move { syncer.sync(incident(), &CancellationToken::new()).await });

    while !f.syncer.is_running(incident()) {
        tokio::task::yield_now().await;
    }

    let err = sync(&f).await.unwrap_err();
    assert!(matches!(err, SyncError::AlreadyRunning(id) if id == incident()));

    drop(gate);
    let report = first.await.unwrap().unwrap();
    assert_eq!(report.outcome, SyncOutcome::Completed);
    assert!(!f.syncer.is_running(incident()));
}
