//! SQLite implementation of IWorksiteChangeRepository
//!
//! A local edit is written in one transaction: the worksite rows are brought
//! to the new state and one change record describing the edit is appended.
//! If any step fails nothing of the edit is stored.

use sqlx::SqlitePool;
use uuid::Uuid;

use reliefsync_core::domain::{
    ArchiveAction, ChangeRecord, IdReconciliationMap, IncidentId, LocalId, OrganizationId,
    WorkType, Worksite, WorksiteChange, CHANGE_MODEL_VERSION,
};
use reliefsync_core::ports::IWorksiteChangeRepository;

use crate::rows::{
    change_from_row, now_millis, reconciliation_map, replace_form_data, save_children, to_millis,
    upsert_core,
};
use crate::CacheError;

/// SQLite-based implementation of the change repository port
pub struct SqliteWorksiteChangeRepository {
    pool: SqlitePool,
    /// Build number stamped on every change record
    app_version: i64,
}

impl SqliteWorksiteChangeRepository {
    pub fn new(pool: SqlitePool, app_version: i64) -> Self {
        Self { pool, app_version }
    }
}

#[async_trait::async_trait]
impl IWorksiteChangeRepository for SqliteWorksiteChangeRepository {
    async fn save_change(
        &self,
        before: &Worksite,
        after: &Worksite,
        primary_work_type: Option<&WorkType>,
        organization_id: OrganizationId,
    ) -> anyhow::Result<LocalId> {
        if before == after {
            return Ok(after.id);
        }

        let now = now_millis();
        let mut saved = after.clone();
        let mut tx = self.pool.begin().await?;

        let (id, ids) = if after.is_new() {
            let local_global_uuid = if after.network_id.is_assigned() {
                String::new()
            } else {
                Uuid::new_v4().to_string()
            };
            let result = sqlx::query(
                "INSERT INTO worksite_roots \
                 (incident_id, network_id, local_global_uuid, local_modified_at, synced_at, \
                  is_local_modified, sync_attempt, has_full_payload) \
                 VALUES (?, ?, ?, ?, NULL, 1, 0, 0)",
            )
            .bind(after.incident_id.get())
            .bind(after.network_id.get())
            .bind(&local_global_uuid)
            .bind(to_millis(now))
            .execute(&mut *tx)
            .await?;
            (result.last_insert_rowid(), IdReconciliationMap::new())
        } else {
            let id = after.id.get();
            let ids = if after.network_id.is_assigned() {
                reconciliation_map(&mut *tx, id).await?
            } else {
                IdReconciliationMap::new()
            };
            let result = sqlx::query(
                "UPDATE worksite_roots SET local_modified_at = ?, is_local_modified = 1 \
                 WHERE id = ?",
            )
            .bind(to_millis(now))
            .bind(id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(CacheError::InvariantViolation(format!(
                    "No worksite root with id {id} to update"
                ))
                .into());
            }
            (id, ids)
        };

        saved.id = LocalId::new(id);
        upsert_core(&mut *tx, id, &saved).await?;
        save_children(&mut *tx, id, &mut saved.work_types).await?;
        save_children(&mut *tx, id, &mut saved.flags).await?;
        save_children(&mut *tx, id, &mut saved.notes).await?;
        replace_form_data(&mut *tx, id, &saved.form_data).await?;

        let primary = primary_work_type.map(|wt| {
            saved
                .work_type(&wt.work_type)
                .cloned()
                .unwrap_or_else(|| wt.clone())
        });
        let change = WorksiteChange::new(before, &saved, primary.as_ref(), &ids);
        let change_data = change.to_json().map_err(CacheError::from)?;

        let result = sqlx::query(
            "INSERT INTO worksite_changes \
             (worksite_id, incident_id, organization_id, app_version, change_model_version, \
              created_at, save_attempt, save_attempt_at, archive_action, change_data) \
             VALUES (?, ?, ?, ?, ?, ?, 0, NULL, NULL, ?)",
        )
        .bind(id)
        .bind(saved.incident_id.get())
        .bind(organization_id.get())
        .bind(self.app_version)
        .bind(CHANGE_MODEL_VERSION)
        .bind(to_millis(now))
        .bind(&change_data)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            worksite_id = id,
            change_id = result.last_insert_rowid(),
            incident_id = %saved.incident_id,
            "Saved local change"
        );
        Ok(saved.id)
    }

    async fn record_save_attempt(&self, change_id: i64) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE worksite_changes SET save_attempt = save_attempt + 1, save_attempt_at = ? \
             WHERE id = ?",
        )
        .bind(to_millis(now_millis()))
        .bind(change_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CacheError::NotFound(format!("change record {change_id}")).into());
        }

        sqlx::query(
            "UPDATE worksite_roots SET sync_attempt = sync_attempt + 1 \
             WHERE id = (SELECT worksite_id FROM worksite_changes WHERE id = ?)",
        )
        .bind(change_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::trace!(change_id, "Recorded save attempt");
        Ok(())
    }

    async fn archive_change(&self, change_id: i64, action: ArchiveAction) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        let worksite_id: Option<i64> =
            sqlx::query_scalar("SELECT worksite_id FROM worksite_changes WHERE id = ?")
                .bind(change_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(worksite_id) = worksite_id else {
            return Err(CacheError::NotFound(format!("change record {change_id}")).into());
        };

        sqlx::query("UPDATE worksite_changes SET archive_action = ? WHERE id = ?")
            .bind(action.as_str())
            .bind(change_id)
            .execute(&mut *tx)
            .await?;

        // The worksite is clean again once its last pending change is uploaded
        if action == ArchiveAction::Synced {
            let pending: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM worksite_changes \
                 WHERE worksite_id = ? AND archive_action IS NULL",
            )
            .bind(worksite_id)
            .fetch_one(&mut *tx)
            .await?;

            if pending == 0 {
                sqlx::query(
                    "UPDATE worksite_roots SET is_local_modified = 0, synced_at = ?, \
                     sync_attempt = 0 WHERE id = ?",
                )
                .bind(to_millis(now_millis()))
                .bind(worksite_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        tracing::debug!(change_id, worksite_id, action = %action, "Archived change");
        Ok(())
    }

    async fn unsynced_changes(&self, incident_id: IncidentId) -> anyhow::Result<Vec<ChangeRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM worksite_changes \
             WHERE incident_id = ? AND archive_action IS NULL ORDER BY id",
        )
        .bind(incident_id.get())
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .iter()
            .map(change_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn changes_for_worksite(
        &self,
        worksite_id: LocalId,
    ) -> anyhow::Result<Vec<ChangeRecord>> {
        let rows = sqlx::query("SELECT * FROM worksite_changes WHERE worksite_id = ? ORDER BY id")
            .bind(worksite_id.get())
            .fetch_all(&self.pool)
            .await?;

        let records = rows
            .iter()
            .map(change_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
