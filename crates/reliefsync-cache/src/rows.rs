//! Row mapping and shared write helpers
//!
//! ## Type Mapping
//!
//! | Domain Type              | SQL Type | Strategy                              |
//! |--------------------------|----------|---------------------------------------|
//! | IncidentId, LocalId, …   | INTEGER  | `.get()` / validated constructors     |
//! | NetworkId                | INTEGER  | `-1` when unassigned                  |
//! | DateTime<Utc>            | INTEGER  | epoch milliseconds                    |
//! | WorkTypeStatus           | TEXT     | server literal                        |
//! | BoundedSyncState         | TEXT     | serde_json serialization              |
//! | Team member ids          | TEXT     | serde_json array                      |
//!
//! Timestamps are stored as integers so that the conflict guard's
//! `local_modified_at IS ?` comparison is exact.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqliteRow};
use sqlx::{Row, Sqlite};

use reliefsync_core::domain::{
    ArchiveAction, ChangeRecord, FormDataValue, IdReconciliationMap, IncidentId, LocalId,
    LocalModifiedState, NetworkId, OrganizationId, SyncCategory, SyncStats, Team, WorkType,
    WorkTypeStatus, Worksite, WorksiteFlag, WorksiteNote, WorksiteRoot,
};

use crate::CacheError;

// ============================================================================
// Timestamps
// ============================================================================

pub(crate) fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub(crate) fn opt_millis(dt: Option<DateTime<Utc>>) -> Option<i64> {
    dt.map(to_millis)
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, CacheError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| CacheError::SerializationError(format!("Timestamp out of range: {ms}")))
}

pub(crate) fn from_opt_millis(ms: Option<i64>) -> Result<Option<DateTime<Utc>>, CacheError> {
    ms.map(from_millis).transpose()
}

/// Current time at store precision
pub(crate) fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

fn incident_from(value: i64) -> Result<IncidentId, CacheError> {
    Ok(IncidentId::new(value)?)
}

fn org_from(value: Option<i64>) -> Result<Option<OrganizationId>, CacheError> {
    Ok(value.map(OrganizationId::new).transpose()?)
}

// ============================================================================
// Row mapping functions
// ============================================================================

/// Core worksite fields; sub-entities are loaded separately
fn worksite_core_from_row(row: &SqliteRow) -> Result<Worksite, CacheError> {
    let mut worksite = Worksite::new(incident_from(row.get("incident_id"))?);
    worksite.id = LocalId::new(row.get("id"));
    worksite.network_id = NetworkId::from_stored(row.get("network_id"));
    worksite.address = row.get("address");
    worksite.case_number = row.get("case_number");
    worksite.city = row.get("city");
    worksite.county = row.get("county");
    worksite.created_at = from_opt_millis(row.get("created_at"))?;
    worksite.email = row.get("email");
    worksite.key_work_type = row.get("key_work_type");
    worksite.latitude = row.get("latitude");
    worksite.longitude = row.get("longitude");
    worksite.name = row.get("name");
    worksite.phone1 = row.get("phone1");
    worksite.postal_code = row.get("postal_code");
    worksite.state = row.get("state");
    worksite.svi = row.get::<Option<f64>, _>("svi").map(|v| v as f32);
    worksite.updated_at = from_opt_millis(row.get("updated_at"))?;
    worksite.what3words = row.get("what3words");
    Ok(worksite)
}

pub(crate) fn root_from_row(row: &SqliteRow) -> Result<WorksiteRoot, CacheError> {
    Ok(WorksiteRoot {
        id: LocalId::new(row.get("id")),
        incident_id: incident_from(row.get("incident_id"))?,
        network_id: NetworkId::from_stored(row.get("network_id")),
        local_global_uuid: row.get("local_global_uuid"),
        local_modified_at: from_millis(row.get("local_modified_at"))?,
        synced_at: from_opt_millis(row.get("synced_at"))?,
        is_local_modified: row.get("is_local_modified"),
        sync_attempt: row.get("sync_attempt"),
        has_full_payload: row.get("has_full_payload"),
    })
}

pub(crate) fn local_state_from_row(row: &SqliteRow) -> Result<LocalModifiedState, CacheError> {
    Ok(LocalModifiedState {
        id: LocalId::new(row.get("id")),
        network_id: NetworkId::from_stored(row.get("network_id")),
        local_modified_at: from_millis(row.get("local_modified_at"))?,
        is_local_modified: row.get("is_local_modified"),
        has_full_payload: row.get("has_full_payload"),
    })
}

pub(crate) fn stats_from_row(row: &SqliteRow) -> Result<SyncStats, CacheError> {
    let category: String = row.get("category");
    let category: SyncCategory = category.parse()?;
    let bounded: Option<String> = row.get("bounded");
    let bounded = match bounded {
        Some(json) if !json.is_empty() => Some(serde_json::from_str(&json).map_err(|e| {
            CacheError::SerializationError(format!("Invalid bounded sync state: {e}"))
        })?),
        _ => None,
    };

    Ok(SyncStats {
        incident_id: incident_from(row.get("incident_id"))?,
        category,
        sync_start: from_millis(row.get("sync_start"))?,
        epoch: row.get::<String, _>("epoch").parse()?,
        target_count: row.get::<i64, _>("target_count").max(0) as u64,
        paged_count: row.get::<i64, _>("paged_count").max(0) as u64,
        successful_sync: from_opt_millis(row.get("successful_sync"))?,
        attempted_sync: from_opt_millis(row.get("attempted_sync"))?,
        attempted_counter: row.get::<i64, _>("attempted_counter").max(0) as u32,
        app_build_version: row.get("app_build_version"),
        data_version: row.get("data_version"),
        bounded,
    })
}

pub(crate) fn team_from_row(row: &SqliteRow) -> Result<Team, CacheError> {
    let members: String = row.get("member_ids");
    let member_ids: Vec<i64> = serde_json::from_str(&members)
        .map_err(|e| CacheError::SerializationError(format!("Invalid team members: {e}")))?;
    Ok(Team {
        id: LocalId::new(row.get("id")),
        network_id: NetworkId::from_stored(row.get("network_id")),
        incident_id: incident_from(row.get("incident_id"))?,
        name: row.get("name"),
        color: row.get("color"),
        member_ids,
        is_local_modified: row.get("is_local_modified"),
        local_modified_at: from_millis(row.get("local_modified_at"))?,
    })
}

pub(crate) fn change_from_row(row: &SqliteRow) -> Result<ChangeRecord, CacheError> {
    let archive_action: Option<String> = row.get("archive_action");
    let archive_action = archive_action
        .filter(|a| !a.is_empty())
        .map(|a| a.parse::<ArchiveAction>())
        .transpose()?;
    let organization_id = OrganizationId::new(row.get("organization_id"))?;

    Ok(ChangeRecord {
        id: row.get("id"),
        worksite_id: LocalId::new(row.get("worksite_id")),
        incident_id: incident_from(row.get("incident_id"))?,
        organization_id,
        app_version: row.get("app_version"),
        change_model_version: row.get("change_model_version"),
        created_at: from_millis(row.get("created_at"))?,
        save_attempt: row.get("save_attempt"),
        save_attempt_at: from_opt_millis(row.get("save_attempt_at"))?,
        archive_action,
        change_data: row.get("change_data"),
    })
}

// ============================================================================
// Loaders
// ============================================================================

/// Load a worksite with all of its sub-entities
pub(crate) async fn load_worksite(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Worksite>, CacheError> {
    let Some(row) = sqlx::query("SELECT * FROM worksites WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };
    let mut worksite = worksite_core_from_row(&row)?;

    worksite.work_types = load_children(conn, id).await?;
    worksite.flags = load_children(conn, id).await?;
    worksite.notes = load_children(conn, id).await?;

    let rows = sqlx::query(
        "SELECT field_key, value_string, value_bool, is_bool_value \
         FROM worksite_form_data WHERE worksite_id = ?",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;
    worksite.form_data = rows
        .iter()
        .map(|r| {
            (
                r.get::<String, _>("field_key"),
                FormDataValue {
                    value_string: r.get("value_string"),
                    value_bool: r.get("value_bool"),
                    is_bool_value: r.get("is_bool_value"),
                },
            )
        })
        .collect::<BTreeMap<_, _>>();

    Ok(Some(worksite))
}

/// Network ids of the server-known sub-entities of a worksite
pub(crate) async fn reconciliation_map(
    conn: &mut SqliteConnection,
    worksite_id: i64,
) -> Result<IdReconciliationMap, CacheError> {
    async fn network_ids<T: ChildRow>(
        conn: &mut SqliteConnection,
        worksite_id: i64,
    ) -> Result<HashMap<LocalId, NetworkId>, CacheError> {
        let sql = format!(
            "SELECT id, network_id FROM {} WHERE worksite_id = ? AND network_id > 0",
            T::TABLE
        );
        let rows = sqlx::query(&sql)
            .bind(worksite_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows
            .iter()
            .map(|r| {
                (
                    LocalId::new(r.get("id")),
                    NetworkId::from_stored(r.get("network_id")),
                )
            })
            .collect())
    }

    Ok(IdReconciliationMap {
        flags: network_ids::<WorksiteFlag>(conn, worksite_id).await?,
        notes: network_ids::<WorksiteNote>(conn, worksite_id).await?,
        work_types: network_ids::<WorkType>(conn, worksite_id).await?,
    })
}

// ============================================================================
// Core writes
// ============================================================================

/// Insert or replace the core fields of a worksite
pub(crate) async fn upsert_core(
    conn: &mut SqliteConnection,
    id: i64,
    worksite: &Worksite,
) -> Result<(), CacheError> {
    sqlx::query(
        "INSERT INTO worksites \
         (id, network_id, incident_id, address, case_number, city, county, created_at, \
          email, key_work_type, latitude, longitude, name, phone1, postal_code, state, \
          svi, updated_at, what3words) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET \
          network_id = excluded.network_id, \
          incident_id = excluded.incident_id, \
          address = excluded.address, \
          case_number = excluded.case_number, \
          city = excluded.city, \
          county = excluded.county, \
          created_at = excluded.created_at, \
          email = excluded.email, \
          key_work_type = excluded.key_work_type, \
          latitude = excluded.latitude, \
          longitude = excluded.longitude, \
          name = excluded.name, \
          phone1 = excluded.phone1, \
          postal_code = excluded.postal_code, \
          state = excluded.state, \
          svi = excluded.svi, \
          updated_at = excluded.updated_at, \
          what3words = excluded.what3words",
    )
    .bind(id)
    .bind(worksite.network_id.get())
    .bind(worksite.incident_id.get())
    .bind(&worksite.address)
    .bind(&worksite.case_number)
    .bind(&worksite.city)
    .bind(&worksite.county)
    .bind(opt_millis(worksite.created_at))
    .bind(&worksite.email)
    .bind(&worksite.key_work_type)
    .bind(worksite.latitude)
    .bind(worksite.longitude)
    .bind(&worksite.name)
    .bind(&worksite.phone1)
    .bind(&worksite.postal_code)
    .bind(&worksite.state)
    .bind(worksite.svi.map(f64::from))
    .bind(opt_millis(worksite.updated_at))
    .bind(&worksite.what3words)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Update the core fields a short payload carries
///
/// Contact fields are absent from short payloads and keep their stored
/// values.
pub(crate) async fn update_short_core(
    conn: &mut SqliteConnection,
    id: i64,
    worksite: &Worksite,
) -> Result<(), CacheError> {
    sqlx::query(
        "UPDATE worksites SET \
          address = ?, case_number = ?, city = ?, county = ?, created_at = ?, \
          key_work_type = ?, latitude = ?, longitude = ?, name = ?, postal_code = ?, \
          state = ?, svi = ?, updated_at = ?, what3words = ? \
         WHERE id = ?",
    )
    .bind(&worksite.address)
    .bind(&worksite.case_number)
    .bind(&worksite.city)
    .bind(&worksite.county)
    .bind(opt_millis(worksite.created_at))
    .bind(&worksite.key_work_type)
    .bind(worksite.latitude)
    .bind(worksite.longitude)
    .bind(&worksite.name)
    .bind(&worksite.postal_code)
    .bind(&worksite.state)
    .bind(worksite.svi.map(f64::from))
    .bind(opt_millis(worksite.updated_at))
    .bind(&worksite.what3words)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Replace all form data of a worksite
pub(crate) async fn replace_form_data(
    conn: &mut SqliteConnection,
    worksite_id: i64,
    form_data: &BTreeMap<String, FormDataValue>,
) -> Result<(), CacheError> {
    sqlx::query("DELETE FROM worksite_form_data WHERE worksite_id = ?")
        .bind(worksite_id)
        .execute(&mut *conn)
        .await?;

    for (key, value) in form_data {
        sqlx::query(
            "INSERT INTO worksite_form_data \
             (worksite_id, field_key, value_string, value_bool, is_bool_value) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(worksite_id)
        .bind(key)
        .bind(&value.value_string)
        .bind(value.value_bool)
        .bind(value.is_bool_value)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn delete_ids(
    conn: &mut SqliteConnection,
    table: &str,
    ids: &[i64],
) -> Result<(), CacheError> {
    let sql = format!("DELETE FROM {table} WHERE id = ?");
    for id in ids {
        sqlx::query(&sql).bind(id).execute(&mut *conn).await?;
    }
    Ok(())
}

// ============================================================================
// Worksite sub-entities
// ============================================================================

type ChildQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// A table of worksite sub-entities (work types, flags, notes)
///
/// Every table has `id`, `worksite_id` and `network_id` followed by
/// [`COLUMNS`](Self::COLUMNS), bound in that order by
/// [`bind_columns`](Self::bind_columns).
pub(crate) trait ChildRow: Sized {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];
    /// Column that identifies a row across remote syncs; `None` matches on
    /// the network id and leaves rows the server does not know yet alone
    const REMOTE_KEY: Option<&'static str>;

    fn from_row(row: &SqliteRow) -> Result<Self, CacheError>;
    fn local_id(&self) -> LocalId;
    fn network_id(&self) -> NetworkId;
    /// Value of [`REMOTE_KEY`](Self::REMOTE_KEY) for this row
    fn remote_key(&self) -> String;
    /// Record the id assigned by an insert of a local row
    fn assign(&mut self, id: LocalId);
    fn bind_columns<'q>(&'q self, query: ChildQuery<'q>) -> ChildQuery<'q>;
}

impl ChildRow for WorkType {
    const TABLE: &'static str = "work_types";
    const COLUMNS: &'static [&'static str] = &[
        "created_at",
        "org_claim",
        "next_recur_at",
        "phase",
        "recur",
        "status",
        "work_type",
    ];
    const REMOTE_KEY: Option<&'static str> = Some("work_type");

    fn from_row(row: &SqliteRow) -> Result<Self, CacheError> {
        let status: String = row.get("status");
        Ok(WorkType {
            id: LocalId::new(row.get("id")),
            network_id: NetworkId::from_stored(row.get("network_id")),
            created_at: from_opt_millis(row.get("created_at"))?,
            org_claim: org_from(row.get("org_claim"))?,
            next_recur_at: from_opt_millis(row.get("next_recur_at"))?,
            phase: row.get("phase"),
            recur: row.get("recur"),
            status: WorkTypeStatus::from_literal(&status),
            work_type: row.get("work_type"),
        })
    }

    fn local_id(&self) -> LocalId {
        self.id
    }

    fn network_id(&self) -> NetworkId {
        self.network_id
    }

    fn remote_key(&self) -> String {
        self.work_type.clone()
    }

    fn assign(&mut self, id: LocalId) {
        self.id = id;
        self.network_id = NetworkId::UNASSIGNED;
    }

    fn bind_columns<'q>(&'q self, query: ChildQuery<'q>) -> ChildQuery<'q> {
        query
            .bind(opt_millis(self.created_at))
            .bind(self.org_claim.map(|o| o.get()))
            .bind(opt_millis(self.next_recur_at))
            .bind(self.phase)
            .bind(&self.recur)
            .bind(self.status.literal())
            .bind(&self.work_type)
    }
}

impl ChildRow for WorksiteFlag {
    const TABLE: &'static str = "worksite_flags";
    const COLUMNS: &'static [&'static str] = &[
        "created_at",
        "is_high_priority",
        "notes",
        "reason_t",
        "requested_action",
    ];
    const REMOTE_KEY: Option<&'static str> = Some("reason_t");

    fn from_row(row: &SqliteRow) -> Result<Self, CacheError> {
        Ok(WorksiteFlag {
            id: LocalId::new(row.get("id")),
            network_id: NetworkId::from_stored(row.get("network_id")),
            created_at: from_opt_millis(row.get("created_at"))?,
            is_high_priority: row.get("is_high_priority"),
            notes: row.get("notes"),
            reason_t: row.get("reason_t"),
            requested_action: row.get("requested_action"),
        })
    }

    fn local_id(&self) -> LocalId {
        self.id
    }

    fn network_id(&self) -> NetworkId {
        self.network_id
    }

    fn remote_key(&self) -> String {
        self.reason_t.clone()
    }

    fn assign(&mut self, id: LocalId) {
        self.id = id;
        self.network_id = NetworkId::UNASSIGNED;
    }

    fn bind_columns<'q>(&'q self, query: ChildQuery<'q>) -> ChildQuery<'q> {
        query
            .bind(opt_millis(self.created_at))
            .bind(self.is_high_priority)
            .bind(&self.notes)
            .bind(&self.reason_t)
            .bind(&self.requested_action)
    }
}

impl ChildRow for WorksiteNote {
    const TABLE: &'static str = "worksite_notes";
    const COLUMNS: &'static [&'static str] = &["created_at", "is_survivor", "note"];
    const REMOTE_KEY: Option<&'static str> = None;

    fn from_row(row: &SqliteRow) -> Result<Self, CacheError> {
        Ok(WorksiteNote {
            id: LocalId::new(row.get("id")),
            network_id: NetworkId::from_stored(row.get("network_id")),
            created_at: from_opt_millis(row.get("created_at"))?,
            is_survivor: row.get("is_survivor"),
            note: row.get("note"),
        })
    }

    fn local_id(&self) -> LocalId {
        self.id
    }

    fn network_id(&self) -> NetworkId {
        self.network_id
    }

    fn remote_key(&self) -> String {
        self.network_id.get().to_string()
    }

    fn assign(&mut self, id: LocalId) {
        self.id = id;
        self.network_id = NetworkId::UNASSIGNED;
    }

    fn bind_columns<'q>(&'q self, query: ChildQuery<'q>) -> ChildQuery<'q> {
        query
            .bind(opt_millis(self.created_at))
            .bind(self.is_survivor)
            .bind(&self.note)
    }
}

pub(crate) async fn load_children<T: ChildRow>(
    conn: &mut SqliteConnection,
    worksite_id: i64,
) -> Result<Vec<T>, CacheError> {
    let sql = format!("SELECT * FROM {} WHERE worksite_id = ? ORDER BY id", T::TABLE);
    let rows = sqlx::query(&sql)
        .bind(worksite_id)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(T::from_row).collect()
}

async fn insert_child<T: ChildRow>(
    conn: &mut SqliteConnection,
    worksite_id: i64,
    row: &T,
    network_id: NetworkId,
) -> Result<i64, CacheError> {
    let sql = format!(
        "INSERT INTO {} (worksite_id, network_id, {}) VALUES (?, ?{})",
        T::TABLE,
        T::COLUMNS.join(", "),
        ", ?".repeat(T::COLUMNS.len())
    );
    let query = sqlx::query(&sql).bind(worksite_id).bind(network_id.get());
    let result = row.bind_columns(query).execute(&mut *conn).await?;
    Ok(result.last_insert_rowid())
}

/// Rewrite a row's columns; `network_id` is only written when given
async fn update_child<T: ChildRow>(
    conn: &mut SqliteConnection,
    id: i64,
    row: &T,
    network_id: Option<NetworkId>,
) -> Result<(), CacheError> {
    let mut assignments: Vec<String> = T::COLUMNS.iter().map(|c| format!("{c} = ?")).collect();
    if network_id.is_some() {
        assignments.insert(0, "network_id = ?".to_string());
    }
    let sql = format!("UPDATE {} SET {} WHERE id = ?", T::TABLE, assignments.join(", "));

    let mut query = sqlx::query(&sql);
    if let Some(network_id) = network_id {
        query = query.bind(network_id.get());
    }
    row.bind_columns(query).bind(id).execute(&mut *conn).await?;
    Ok(())
}

/// Make the stored rows of a worksite match a remote record
///
/// Rows are matched on [`ChildRow::REMOTE_KEY`] so local ids survive
/// re-syncs; stored rows the record no longer carries are deleted.
pub(crate) async fn sync_children<T: ChildRow>(
    conn: &mut SqliteConnection,
    worksite_id: i64,
    incoming: &[T],
) -> Result<(), CacheError> {
    let sql = match T::REMOTE_KEY {
        Some(column) => format!("SELECT id, {column} FROM {} WHERE worksite_id = ?", T::TABLE),
        None => format!(
            "SELECT id, CAST(network_id AS TEXT) FROM {} WHERE worksite_id = ? AND network_id > 0",
            T::TABLE
        ),
    };
    let mut existing: HashMap<String, i64> = sqlx::query(&sql)
        .bind(worksite_id)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|r| (r.get::<String, _>(1), r.get::<i64, _>(0)))
        .collect();

    let keep: HashSet<String> = incoming.iter().map(T::remote_key).collect();
    let stale: Vec<i64> = existing
        .iter()
        .filter(|(key, _)| !keep.contains(*key))
        .map(|(_, id)| *id)
        .collect();
    delete_ids(conn, T::TABLE, &stale).await?;

    for row in incoming {
        let key = row.remote_key();
        match existing.get(&key) {
            Some(&id) => update_child(conn, id, row, Some(row.network_id())).await?,
            None => {
                let id = insert_child(conn, worksite_id, row, row.network_id()).await?;
                existing.insert(key, id);
            }
        }
    }
    Ok(())
}

/// Save locally edited rows of a worksite
///
/// Rows with a stored id are updated, new rows are inserted with an
/// unassigned network id and get their local id written back, stored rows
/// missing from `rows` are deleted.
pub(crate) async fn save_children<T: ChildRow>(
    conn: &mut SqliteConnection,
    worksite_id: i64,
    rows: &mut [T],
) -> Result<(), CacheError> {
    let sql = format!("SELECT id FROM {} WHERE worksite_id = ?", T::TABLE);
    let existing: HashSet<i64> = sqlx::query_scalar::<_, i64>(&sql)
        .bind(worksite_id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .collect();

    let keep: HashSet<i64> = rows
        .iter()
        .map(T::local_id)
        .filter(|id| !id.is_new())
        .map(|id| id.get())
        .collect();
    let orphans: Vec<i64> = existing
        .iter()
        .filter(|id| !keep.contains(id))
        .copied()
        .collect();
    delete_ids(conn, T::TABLE, &orphans).await?;

    for row in rows.iter_mut() {
        let id = row.local_id().get();
        if existing.contains(&id) {
            update_child(conn, id, &*row, None).await?;
        } else {
            let id = insert_child(conn, worksite_id, &*row, NetworkId::UNASSIGNED).await?;
            row.assign(LocalId::new(id));
        }
    }
    Ok(())
}
