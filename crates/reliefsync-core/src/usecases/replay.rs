//! Change log replay
//!
//! Reconstructs the state of a worksite from its change records. Used to
//! audit what the uploader is about to send and to recover a case whose
//! stored rows were lost.

use crate::domain::{ChangeRecord, DomainError, Worksite, WorksiteSnapshot};

/// Replay change records (oldest first) of a single worksite
///
/// Returns `None` for an empty log. Each record must continue from the
/// previous one: its `start` snapshot, when present, must describe the same
/// case (`id`) as the snapshot produced so far.
pub fn replay_changes(records: &[ChangeRecord]) -> Result<Option<Worksite>, DomainError> {
    let mut state: Option<WorksiteSnapshot> = None;

    for record in records {
        let change = record.decode()?;

        if change.change.core.id != record.worksite_id {
            return Err(DomainError::InvalidSnapshot(format!(
                "change record {} belongs to worksite {} but its snapshot names {}",
                record.id, record.worksite_id, change.change.core.id
            )));
        }

        if let (Some(current), Some(start)) = (&state, &change.start) {
            if current.core.id != start.core.id {
                return Err(DomainError::InvalidSnapshot(format!(
                    "change record {} does not continue worksite {}",
                    record.id, current.core.id
                )));
            }
        }

        state = Some(change.change);
    }

    Ok(state.map(|snapshot| snapshot.to_worksite()))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::{
        IdReconciliationMap, IncidentId, LocalId, OrganizationId, WorksiteChange, WorksiteNote,
        CHANGE_MODEL_VERSION,
    };

    fn record(seq: i64, worksite_id: LocalId, change: &WorksiteChange) -> ChangeRecord {
        ChangeRecord {
            id: seq,
            worksite_id,
            incident_id: IncidentId::new(2).unwrap(),
            organization_id: OrganizationId::new(3).unwrap(),
            app_version: 1,
            change_model_version: CHANGE_MODEL_VERSION,
            created_at: Utc::now(),
            save_attempt: 0,
            save_attempt_at: None,
            archive_action: None,
            change_data: change.to_json().unwrap(),
        }
    }

    #[test]
    fn test_empty_log_replays_to_none() {
        assert!(replay_changes(&[]).unwrap().is_none());
    }

    #[test]
    fn test_replay_yields_latest_state() {
        let ids = IdReconciliationMap::new();
        let blank = Worksite::new(IncidentId::new(2).unwrap());
        let mut created = blank.clone();
        created.id = LocalId::new(5);
        created.name = "Ana".to_string();

        let mut edited = created.clone();
        edited
            .notes
            .push(WorksiteNote::new("roof tarped", Utc::now()));

        let first = WorksiteChange::new(&blank, &created, None, &ids);
        let second = WorksiteChange::new(&created, &edited, None, &ids);
        let records = vec![
            record(1, created.id, &first),
            record(2, created.id, &second),
        ];

        let replayed = replay_changes(&records).unwrap().unwrap();
        assert_eq!(replayed, edited);
    }

    #[test]
    fn test_foreign_record_is_rejected() {
        let ids = IdReconciliationMap::new();
        let blank = Worksite::new(IncidentId::new(2).unwrap());
        let mut created = blank.clone();
        created.id = LocalId::new(5);

        let change = WorksiteChange::new(&blank, &created, None, &ids);
        let err = replay_changes(&[record(1, LocalId::new(6), &change)]).unwrap_err();
        assert!(matches!(err, DomainError::InvalidSnapshot(_)));
    }
}
