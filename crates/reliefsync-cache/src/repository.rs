//! SQLite implementation of IWorksiteRepository
//!
//! Remote batches are applied one transaction per batch. Every record goes
//! through [`ConflictDetector`] with the state the caller read before
//! staging, and the root update repeats that comparison at write time:
//!
//! ```sql
//! UPDATE worksite_roots SET … WHERE id = ? AND local_modified_at IS ? AND is_local_modified = 0
//! ```
//!
//! A record whose guard update affects no rows is counted as skipped and
//! nothing else of it is written.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use reliefsync_conflict::{ConflictDetector, UpdateDecision};
use reliefsync_core::domain::{
    BoundingBox, IncidentId, LocalId, LocalModifiedState, NetworkId, SyncCategory, SyncStats,
    Team, Worksite, WorksiteRoot,
};
use reliefsync_core::ports::{
    CommitOutcome, IWorksiteRepository, NetworkFlag, NetworkFlagsFormData, NetworkTeam,
    NetworkWorksite, RecordShape,
};

use crate::rows::{
    load_worksite, local_state_from_row, opt_millis, replace_form_data, root_from_row,
    stats_from_row, sync_children, team_from_row, to_millis, update_short_core, upsert_core,
};
use crate::CacheError;

/// Maximum number of bound parameters per `IN (…)` list
const STATE_QUERY_CHUNK: usize = 500;

/// SQLite-based implementation of the worksite repository port
pub struct SqliteWorksiteRepository {
    pool: SqlitePool,
}

impl SqliteWorksiteRepository {
    /// Creates a new repository instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Write helpers
// ============================================================================

/// Insert a root for a worksite first seen remotely
///
/// Returns `None` if the identity already exists, which happens when the
/// same record arrives twice before the caller re-reads local states.
async fn insert_remote_root(
    conn: &mut SqliteConnection,
    incident_id: IncidentId,
    network_id: NetworkId,
    updated_at: DateTime<Utc>,
    synced_at: DateTime<Utc>,
    has_full_payload: bool,
) -> Result<Option<i64>, CacheError> {
    let result = sqlx::query(
        "INSERT INTO worksite_roots \
         (incident_id, network_id, local_global_uuid, local_modified_at, synced_at, \
          is_local_modified, sync_attempt, has_full_payload) \
         VALUES (?, ?, '', ?, ?, 0, 0, ?) \
         ON CONFLICT(incident_id, network_id, local_global_uuid) DO NOTHING",
    )
    .bind(incident_id.get())
    .bind(network_id.get())
    .bind(to_millis(updated_at))
    .bind(to_millis(synced_at))
    .bind(has_full_payload)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    Ok(Some(result.last_insert_rowid()))
}

/// Move a root to a newer remote version if it is still in the expected state
async fn guard_root_update(
    conn: &mut SqliteConnection,
    id: LocalId,
    expected_local_modified_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    synced_at: DateTime<Utc>,
    has_full_payload: bool,
) -> Result<bool, CacheError> {
    let result = sqlx::query(
        "UPDATE worksite_roots SET local_modified_at = ?, synced_at = ?, has_full_payload = ? \
         WHERE id = ? AND local_modified_at IS ? AND is_local_modified = 0",
    )
    .bind(to_millis(updated_at))
    .bind(to_millis(synced_at))
    .bind(has_full_payload)
    .bind(id.get())
    .bind(to_millis(expected_local_modified_at))
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Write the payload of a remote worksite under an existing root
async fn write_remote_payload(
    conn: &mut SqliteConnection,
    id: i64,
    shape: RecordShape,
    worksite: &Worksite,
    is_insert: bool,
) -> Result<(), CacheError> {
    match shape {
        RecordShape::Short if !is_insert => update_short_core(conn, id, worksite).await?,
        _ => upsert_core(conn, id, worksite).await?,
    }
    sync_children(conn, id, &worksite.work_types).await?;

    if shape == RecordShape::Full {
        sync_children(conn, id, &worksite.flags).await?;
        sync_children(conn, id, &worksite.notes).await?;
        replace_form_data(conn, id, &worksite.form_data).await?;
    }
    Ok(())
}

async fn apply_worksite(
    conn: &mut SqliteConnection,
    incident_id: IncidentId,
    shape: RecordShape,
    record: &NetworkWorksite,
    expected: &HashMap<NetworkId, LocalModifiedState>,
    synced_at: DateTime<Utc>,
    outcome: &mut CommitOutcome,
) -> anyhow::Result<()> {
    let network_id = record.network_id()?;
    let mut worksite = record.to_worksite()?;
    worksite.incident_id = incident_id;
    let full = shape == RecordShape::Full;

    match ConflictDetector::check_remote_update(
        network_id,
        expected.get(&network_id),
        record.updated_at,
        shape,
    ) {
        UpdateDecision::Insert => {
            let inserted = insert_remote_root(
                conn,
                incident_id,
                network_id,
                record.updated_at,
                synced_at,
                full,
            )
            .await?;
            match inserted {
                Some(id) => {
                    write_remote_payload(conn, id, shape, &worksite, true).await?;
                    outcome.inserted += 1;
                }
                None => {
                    tracing::debug!(network_id = %network_id, "Worksite already stored, skipping insert");
                    outcome.skipped += 1;
                }
            }
        }
        UpdateDecision::Apply {
            id,
            expected_local_modified_at,
        } => {
            let applied = guard_root_update(
                conn,
                id,
                expected_local_modified_at,
                record.updated_at,
                synced_at,
                full,
            )
            .await?;
            if applied {
                write_remote_payload(conn, id.get(), shape, &worksite, false).await?;
                outcome.updated += 1;
            } else {
                tracing::debug!(
                    network_id = %network_id,
                    local_id = %id,
                    "Local copy changed since read, skipping remote update"
                );
                outcome.skipped += 1;
            }
        }
        _ => outcome.skipped += 1,
    }
    Ok(())
}

async fn apply_flags_form_data(
    conn: &mut SqliteConnection,
    record: &NetworkFlagsFormData,
    expected: &HashMap<NetworkId, LocalModifiedState>,
    synced_at: DateTime<Utc>,
    outcome: &mut CommitOutcome,
) -> anyhow::Result<()> {
    let network_id = NetworkId::new(record.id)?;

    let UpdateDecision::Apply {
        id,
        expected_local_modified_at,
    } = ConflictDetector::check_secondary_update(network_id, expected.get(&network_id))
    else {
        outcome.skipped += 1;
        return Ok(());
    };

    let result = sqlx::query(
        "UPDATE worksite_roots SET synced_at = ? \
         WHERE id = ? AND local_modified_at IS ? AND is_local_modified = 0",
    )
    .bind(to_millis(synced_at))
    .bind(id.get())
    .bind(to_millis(expected_local_modified_at))
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        tracing::debug!(
            network_id = %network_id,
            local_id = %id,
            "Local copy changed since read, skipping secondary data"
        );
        outcome.skipped += 1;
        return Ok(());
    }

    let flags = record
        .flags
        .iter()
        .map(NetworkFlag::to_flag)
        .collect::<Result<Vec<_>, _>>()?;
    let form_data = record
        .form_data
        .iter()
        .map(|fd| (fd.field_key.clone(), fd.to_value()))
        .collect();
    sync_children(conn, id.get(), &flags).await?;
    replace_form_data(conn, id.get(), &form_data).await?;
    outcome.updated += 1;
    Ok(())
}

async fn apply_team(
    conn: &mut SqliteConnection,
    incident_id: IncidentId,
    team: &NetworkTeam,
    synced_at: DateTime<Utc>,
    outcome: &mut CommitOutcome,
) -> anyhow::Result<()> {
    let network_id = NetworkId::new(team.id)?;
    let members = serde_json::to_string(&team.users)
        .map_err(|e| anyhow::anyhow!("Failed to serialize team members: {}", e))?;
    let modified_at = to_millis(team.updated_at.unwrap_or(synced_at));

    let existing = sqlx::query(
        "SELECT id, is_local_modified FROM teams WHERE incident_id = ? AND network_id = ?",
    )
    .bind(incident_id.get())
    .bind(network_id.get())
    .fetch_optional(&mut *conn)
    .await?;

    match existing {
        Some(row) => {
            let is_local_modified: bool = row.get("is_local_modified");
            if !ConflictDetector::should_sync_team(is_local_modified) {
                tracing::debug!(network_id = %network_id, "Skipping locally modified team");
                outcome.skipped += 1;
                return Ok(());
            }
            let id: i64 = row.get("id");
            let result = sqlx::query(
                "UPDATE teams SET name = ?, color = ?, member_ids = ?, local_modified_at = ?, \
                 synced_at = ? WHERE id = ? AND is_local_modified = 0",
            )
            .bind(&team.name)
            .bind(&team.color)
            .bind(&members)
            .bind(modified_at)
            .bind(to_millis(synced_at))
            .bind(id)
            .execute(&mut *conn)
            .await?;
            if result.rows_affected() == 0 {
                outcome.skipped += 1;
            } else {
                outcome.updated += 1;
            }
        }
        None => {
            sqlx::query(
                "INSERT INTO teams \
                 (network_id, incident_id, name, color, member_ids, is_local_modified, \
                  local_modified_at, synced_at) \
                 VALUES (?, ?, ?, ?, ?, 0, ?, ?)",
            )
            .bind(network_id.get())
            .bind(incident_id.get())
            .bind(&team.name)
            .bind(&team.color)
            .bind(&members)
            .bind(modified_at)
            .bind(to_millis(synced_at))
            .execute(&mut *conn)
            .await?;
            outcome.inserted += 1;
        }
    }
    Ok(())
}

// ============================================================================
// IWorksiteRepository implementation
// ============================================================================

#[async_trait::async_trait]
impl IWorksiteRepository for SqliteWorksiteRepository {
    // --- Conflict guard inputs ---

    async fn local_modified_states(
        &self,
        incident_id: IncidentId,
        network_ids: &[NetworkId],
    ) -> anyhow::Result<HashMap<NetworkId, LocalModifiedState>> {
        let mut states = HashMap::with_capacity(network_ids.len());

        for chunk in network_ids.chunks(STATE_QUERY_CHUNK) {
            let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT id, network_id, local_modified_at, is_local_modified, has_full_payload \
                 FROM worksite_roots WHERE local_global_uuid = '' AND incident_id = ",
            );
            query.push_bind(incident_id.get());
            query.push(" AND network_id IN (");
            let mut separated = query.separated(", ");
            for network_id in chunk {
                separated.push_bind(network_id.get());
            }
            separated.push_unseparated(")");

            let rows = query.build().fetch_all(&self.pool).await?;
            for row in &rows {
                let state = local_state_from_row(row)?;
                states.insert(state.network_id, state);
            }
        }

        Ok(states)
    }

    // --- Remote batch application ---

    async fn upsert_worksites(
        &self,
        incident_id: IncidentId,
        shape: RecordShape,
        records: &[NetworkWorksite],
        expected: &HashMap<NetworkId, LocalModifiedState>,
        synced_at: DateTime<Utc>,
    ) -> anyhow::Result<CommitOutcome> {
        let mut outcome = CommitOutcome::default();
        let mut tx = self.pool.begin().await?;

        for record in records {
            apply_worksite(
                &mut *tx,
                incident_id,
                shape,
                record,
                expected,
                synced_at,
                &mut outcome,
            )
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            incident_id = %incident_id,
            shape = %shape,
            inserted = outcome.inserted,
            updated = outcome.updated,
            skipped = outcome.skipped,
            "Committed worksite batch"
        );
        Ok(outcome)
    }

    async fn upsert_flags_form_data(
        &self,
        incident_id: IncidentId,
        records: &[NetworkFlagsFormData],
        expected: &HashMap<NetworkId, LocalModifiedState>,
        synced_at: DateTime<Utc>,
    ) -> anyhow::Result<CommitOutcome> {
        let mut outcome = CommitOutcome::default();
        let mut tx = self.pool.begin().await?;

        for record in records {
            apply_flags_form_data(&mut *tx, record, expected, synced_at, &mut outcome).await?;
        }

        tx.commit().await?;

        tracing::debug!(
            incident_id = %incident_id,
            updated = outcome.updated,
            skipped = outcome.skipped,
            "Committed secondary data batch"
        );
        Ok(outcome)
    }

    // --- Reads ---

    async fn get_worksite(&self, id: LocalId) -> anyhow::Result<Option<Worksite>> {
        let mut conn = self.pool.acquire().await?;
        Ok(load_worksite(&mut *conn, id.get()).await?)
    }

    async fn get_worksite_by_network_id(
        &self,
        incident_id: IncidentId,
        network_id: NetworkId,
    ) -> anyhow::Result<Option<Worksite>> {
        let mut conn = self.pool.acquire().await?;
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM worksite_roots \
             WHERE incident_id = ? AND network_id = ? AND local_global_uuid = ''",
        )
        .bind(incident_id.get())
        .bind(network_id.get())
        .fetch_optional(&mut *conn)
        .await?;

        match id {
            Some(id) => Ok(load_worksite(&mut *conn, id).await?),
            None => Ok(None),
        }
    }

    async fn get_worksite_root(&self, id: LocalId) -> anyhow::Result<Option<WorksiteRoot>> {
        let row = sqlx::query("SELECT * FROM worksite_roots WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(root_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn worksites_in_bounds(
        &self,
        incident_id: IncidentId,
        bounds: &BoundingBox,
    ) -> anyhow::Result<Vec<Worksite>> {
        let mut conn = self.pool.acquire().await?;
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM worksites WHERE incident_id = ? \
             AND latitude >= ? AND latitude <= ? AND longitude >= ? AND longitude <= ? \
             ORDER BY id",
        )
        .bind(incident_id.get())
        .bind(bounds.south)
        .bind(bounds.north)
        .bind(bounds.west)
        .bind(bounds.east)
        .fetch_all(&mut *conn)
        .await?;

        let mut worksites = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(worksite) = load_worksite(&mut *conn, id).await? {
                worksites.push(worksite);
            }
        }
        Ok(worksites)
    }

    async fn count_worksites(&self, incident_id: IncidentId) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM worksites WHERE incident_id = ?")
            .bind(incident_id.get())
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    // --- Sync statistics ---

    async fn get_sync_stats(
        &self,
        incident_id: IncidentId,
        category: SyncCategory,
    ) -> anyhow::Result<Option<SyncStats>> {
        let row =
            sqlx::query("SELECT * FROM incident_sync_stats WHERE incident_id = ? AND category = ?")
                .bind(incident_id.get())
                .bind(category.as_str())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(Some(stats_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn save_sync_stats(&self, stats: &SyncStats) -> anyhow::Result<()> {
        let bounded = stats
            .bounded
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| anyhow::anyhow!("Failed to serialize bounded sync state: {}", e))?;

        sqlx::query(
            "INSERT INTO incident_sync_stats \
             (incident_id, category, sync_start, epoch, target_count, paged_count, \
              successful_sync, attempted_sync, attempted_counter, app_build_version, \
              data_version, bounded) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(incident_id, category) DO UPDATE SET \
              sync_start = excluded.sync_start, \
              epoch = excluded.epoch, \
              target_count = excluded.target_count, \
              paged_count = excluded.paged_count, \
              successful_sync = excluded.successful_sync, \
              attempted_sync = excluded.attempted_sync, \
              attempted_counter = excluded.attempted_counter, \
              app_build_version = excluded.app_build_version, \
              data_version = excluded.data_version, \
              bounded = excluded.bounded",
        )
        .bind(stats.incident_id.get())
        .bind(stats.category.as_str())
        .bind(to_millis(stats.sync_start))
        .bind(stats.epoch.as_str())
        .bind(stats.target_count as i64)
        .bind(stats.paged_count as i64)
        .bind(opt_millis(stats.successful_sync))
        .bind(opt_millis(stats.attempted_sync))
        .bind(i64::from(stats.attempted_counter))
        .bind(stats.app_build_version)
        .bind(stats.data_version)
        .bind(bounded)
        .execute(&self.pool)
        .await?;

        tracing::trace!(
            incident_id = %stats.incident_id,
            category = %stats.category,
            paged_count = stats.paged_count,
            "Saved sync stats"
        );
        Ok(())
    }

    async fn delete_sync_stats(
        &self,
        incident_id: IncidentId,
        category: SyncCategory,
    ) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM incident_sync_stats WHERE incident_id = ? AND category = ?")
            .bind(incident_id.get())
            .bind(category.as_str())
            .execute(&self.pool)
            .await?;

        tracing::trace!(incident_id = %incident_id, category = %category, "Deleted sync stats");
        Ok(())
    }

    async fn list_sync_stats(&self, incident_id: IncidentId) -> anyhow::Result<Vec<SyncStats>> {
        let rows =
            sqlx::query("SELECT * FROM incident_sync_stats WHERE incident_id = ? ORDER BY category")
                .bind(incident_id.get())
                .fetch_all(&self.pool)
                .await?;

        let stats = rows
            .iter()
            .map(stats_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stats)
    }

    // --- Teams ---

    async fn upsert_teams(
        &self,
        incident_id: IncidentId,
        teams: &[NetworkTeam],
        synced_at: DateTime<Utc>,
    ) -> anyhow::Result<CommitOutcome> {
        let mut outcome = CommitOutcome::default();
        let mut tx = self.pool.begin().await?;

        for team in teams {
            apply_team(&mut *tx, incident_id, team, synced_at, &mut outcome).await?;
        }

        tx.commit().await?;

        tracing::debug!(
            incident_id = %incident_id,
            inserted = outcome.inserted,
            updated = outcome.updated,
            skipped = outcome.skipped,
            "Committed teams"
        );
        Ok(outcome)
    }

    async fn list_teams(&self, incident_id: IncidentId) -> anyhow::Result<Vec<Team>> {
        let rows = sqlx::query("SELECT * FROM teams WHERE incident_id = ? ORDER BY name, id")
            .bind(incident_id.get())
            .fetch_all(&self.pool)
            .await?;

        let teams = rows.iter().map(team_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(teams)
    }
}
