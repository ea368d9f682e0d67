//! Record storage: create, load, save, list, and delete records.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::warn;

use crate::model::{Record, RecordId};

use super::{RecordFilter, RecordStore, Result, Storage, StorageError, parse_column, trail};

const RECORD_COLUMNS: &str = "id, subject_id, status, review_stage, submitted_via, payload, \
                              created_at, updated_at, version";

impl RecordStore for Storage {
    fn list(&self, filter: &RecordFilter) -> Result<Vec<Record>> {
        let conn = self.open()?;

        let mut clauses = Vec::new();
        let mut params: Vec<String> = Vec::new();
        if let Some(subject) = &filter.subject {
            params.push(subject.clone());
            clauses.push(format!("subject_id = ?{}", params.len()));
        }
        if let Some(status) = filter.status {
            params.push(status.as_str().to_string());
            clauses.push(format!("status = ?{}", params.len()));
        }
        if let Some(stage) = filter.stage {
            params.push(stage.as_str().to_string());
            clauses.push(format!("review_stage = ?{}", params.len()));
        }
        if let Some(kind) = filter.kind {
            params.push(kind.as_str().to_string());
            clauses.push(format!("kind = ?{}", params.len()));
        }

        let mut sql = format!("SELECT {RECORD_COLUMNS} FROM record");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), read_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(build_record(&conn, row?)?);
        }
        records.sort_by(|a: &Record, b: &Record| {
            b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    fn get(&self, id: &RecordId) -> Result<Record> {
        let conn = self.open()?;
        load_record(&conn, id)
    }

    fn create(&self, draft: &Record) -> Result<Record> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if stored_version(&tx, &draft.id)?.is_some() {
            return Err(StorageError::RecordAlreadyExists(draft.id.clone()));
        }

        let payload = serde_json::to_string(&draft.payload)?;
        tx.execute(
            "INSERT INTO record (id, kind, subject_id, status, review_stage, submitted_via,
                                 payload, created_at, updated_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)",
            rusqlite::params![
                draft.id.as_str(),
                draft.kind().as_str(),
                &draft.subject_id,
                draft.status.as_str(),
                draft.review_stage.as_str(),
                draft.submitted_via.as_str(),
                payload,
                draft.created_at.to_string(),
                draft.updated_at.to_string(),
            ],
        )?;
        trail::append_from(&tx, &draft.id, 0, &draft.review_trail)?;
        tx.commit()?;

        let mut stored = draft.clone();
        stored.version = 0;
        Ok(stored)
    }

    fn save(&self, record: &Record, expected_version: u64) -> Result<Record> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let found = stored_version(&tx, &record.id)?
            .ok_or_else(|| StorageError::RecordNotFound(record.id.clone()))?;
        if found != expected_version {
            warn!(record = %record.id, expected = expected_version, found, "stale save refused");
            return Err(StorageError::Conflict {
                id: record.id.clone(),
                expected: expected_version,
                found,
            });
        }

        // A shorter trail than the stored one would drop events.
        let stored_len = trail::count(&tx, &record.id)?;
        if record.review_trail.len() < stored_len {
            return Err(StorageError::Conflict {
                id: record.id.clone(),
                expected: expected_version,
                found,
            });
        }

        let next_version = expected_version + 1;
        let payload = serde_json::to_string(&record.payload)?;
        tx.execute(
            "UPDATE record
             SET status = ?1, review_stage = ?2, submitted_via = ?3, payload = ?4,
                 updated_at = ?5, version = ?6
             WHERE id = ?7 AND version = ?8",
            rusqlite::params![
                record.status.as_str(),
                record.review_stage.as_str(),
                record.submitted_via.as_str(),
                payload,
                record.updated_at.to_string(),
                next_version,
                record.id.as_str(),
                expected_version,
            ],
        )?;
        trail::append_from(&tx, &record.id, stored_len, &record.review_trail)?;
        tx.commit()?;

        let mut saved = record.clone();
        saved.version = next_version;
        Ok(saved)
    }

    fn delete(&self, id: &RecordId, expected_version: u64) -> Result<()> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let found =
            stored_version(&tx, id)?.ok_or_else(|| StorageError::RecordNotFound(id.clone()))?;
        if found != expected_version {
            return Err(StorageError::Conflict {
                id: id.clone(),
                expected: expected_version,
                found,
            });
        }

        tx.execute("DELETE FROM record WHERE id = ?1", [id.as_str()])?;
        tx.commit()?;
        Ok(())
    }
}

type RecordRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    u64,
);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn stored_version(conn: &Connection, id: &RecordId) -> Result<Option<u64>> {
    Ok(conn
        .query_row(
            "SELECT version FROM record WHERE id = ?1",
            [id.as_str()],
            |row| row.get(0),
        )
        .optional()?)
}

fn load_record(conn: &Connection, id: &RecordId) -> Result<Record> {
    let row = conn
        .query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM record WHERE id = ?1"),
            [id.as_str()],
            read_row,
        )
        .optional()?
        .ok_or_else(|| StorageError::RecordNotFound(id.clone()))?;
    build_record(conn, row)
}

/// Reconstructs a record from its row plus its trail.
fn build_record(conn: &Connection, row: RecordRow) -> Result<Record> {
    let (id, subject_id, status, stage, via, payload, created_at, updated_at, version) = row;
    let id = RecordId::from(id);
    let review_trail = trail::load(conn, &id)?;

    Ok(Record {
        subject_id,
        status: parse_column("status", &status)?,
        review_stage: parse_column("review stage", &stage)?,
        submitted_via: parse_column("submitted via", &via)?,
        payload: serde_json::from_str(&payload)?,
        created_at: parse_column("created_at", &created_at)?,
        updated_at: parse_column("updated_at", &updated_at)?,
        version,
        review_trail,
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use jiff::Timestamp;

    use crate::model::{
        ApplicationPayload, Decision, Payload, RecordKind, ReviewStage, ReviewStatus,
        SubmitChannel, VolunteerPayload,
    };
    use crate::review;
    use crate::storage::testing::test_storage;

    fn volunteer(subject: &str) -> Record {
        review::create_record(
            subject,
            Payload::Volunteer(VolunteerPayload {
                student_name: "李华".into(),
                student_number: Some("2021001".into()),
                activity: "社区图书整理".into(),
                hours: 6.0,
                proof: Some("proof.jpg".into()),
                require_ocr: true,
                project: None,
            }),
            SubmitChannel::Student,
        )
        .unwrap()
    }

    fn application(subject: &str) -> Record {
        review::create_record(
            subject,
            Payload::Application(ApplicationPayload {
                student_name: "王敏".into(),
                title: "全国大学生数学建模竞赛".into(),
                category: "competition".into(),
                points: 3.0,
                proof: None,
            }),
            SubmitChannel::Teacher,
        )
        .unwrap()
    }

    #[test]
    fn create_and_get_record() {
        let (_dir, storage) = test_storage();
        let record = volunteer("lihua@example.com");

        storage.create(&record).unwrap();
        let loaded = storage.get(&record.id).unwrap();

        assert_eq!(loaded, record);
    }

    #[test]
    fn create_duplicate_record_fails() {
        let (_dir, storage) = test_storage();
        let record = volunteer("lihua@example.com");

        storage.create(&record).unwrap();
        let err = storage.create(&record).unwrap_err();

        assert!(matches!(err, StorageError::RecordAlreadyExists(_)));
    }

    #[test]
    fn get_nonexistent_record_fails() {
        let (_dir, storage) = test_storage();
        let err = storage.get(&RecordId::from("vol-missing")).unwrap_err();

        assert!(matches!(err, StorageError::RecordNotFound(_)));
    }

    #[test]
    fn save_bumps_version_and_appends_trail() {
        let (_dir, storage) = test_storage();
        let record = storage.create(&volunteer("lihua@example.com")).unwrap();

        let advanced = review::decide(&record, Decision::Advance, "张老师", "资料完整").unwrap();
        let saved = storage.save(&advanced, record.version).unwrap();
        assert_eq!(saved.version, 1);

        let loaded = storage.get(&record.id).unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.review_stage, ReviewStage::Stage2);
        assert_eq!(loaded.review_trail, advanced.review_trail);
    }

    #[test]
    fn stale_save_conflicts_and_writes_nothing() {
        let (_dir, storage) = test_storage();
        let record = storage.create(&volunteer("lihua@example.com")).unwrap();

        // Two reviewers read the same version.
        let first = review::decide(&record, Decision::Advance, "张老师", "").unwrap();
        let second = review::decide(&record, Decision::Advance, "李老师", "").unwrap();

        storage.save(&first, record.version).unwrap();
        let err = storage.save(&second, record.version).unwrap_err();

        assert!(matches!(
            err,
            StorageError::Conflict {
                expected: 0,
                found: 1,
                ..
            }
        ));
        let loaded = storage.get(&record.id).unwrap();
        assert_eq!(loaded.review_stage, ReviewStage::Stage2);
        assert_eq!(loaded.review_trail.len(), 1);
        assert_eq!(loaded.review_trail[0].reviewer, "张老师");
    }

    #[test]
    fn save_refuses_to_drop_events() {
        let (_dir, storage) = test_storage();
        let record = storage.create(&volunteer("lihua@example.com")).unwrap();
        let advanced = review::decide(&record, Decision::Advance, "张老师", "").unwrap();
        let saved = storage.save(&advanced, 0).unwrap();

        let mut truncated = saved.clone();
        truncated.review_trail.clear();
        let err = storage.save(&truncated, saved.version).unwrap_err();

        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[test]
    fn save_nonexistent_record_fails() {
        let (_dir, storage) = test_storage();
        let err = storage.save(&volunteer("lihua@example.com"), 0).unwrap_err();

        assert!(matches!(err, StorageError::RecordNotFound(_)));
    }

    #[test]
    fn list_filters_and_orders_newest_first() {
        let (_dir, storage) = test_storage();

        let mut older = volunteer("lihua@example.com");
        older.created_at = Timestamp::new(1_000_000_000, 0).unwrap();
        let mut newer = application("lihua@example.com");
        newer.created_at = Timestamp::new(2_000_000_000, 0).unwrap();
        let other = volunteer("wangmin@example.com");

        storage.create(&older).unwrap();
        storage.create(&newer).unwrap();
        storage.create(&other).unwrap();

        let mine = storage
            .list(&RecordFilter::subject("lihua@example.com"))
            .unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, newer.id);
        assert_eq!(mine[1].id, older.id);

        let volunteers = storage
            .list(&RecordFilter {
                kind: Some(RecordKind::Volunteer),
                status: Some(ReviewStatus::Pending),
                ..RecordFilter::default()
            })
            .unwrap();
        assert_eq!(volunteers.len(), 2);
        assert!(volunteers.iter().all(|r| r.kind() == RecordKind::Volunteer));
    }

    #[test]
    fn list_empty() {
        let (_dir, storage) = test_storage();
        assert!(storage.list(&RecordFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn delete_removes_record_and_trail() {
        let (_dir, storage) = test_storage();
        let record = storage.create(&volunteer("lihua@example.com")).unwrap();

        storage.delete(&record.id, 0).unwrap();

        assert!(matches!(
            storage.get(&record.id).unwrap_err(),
            StorageError::RecordNotFound(_)
        ));
    }

    #[test]
    fn delete_with_stale_version_conflicts() {
        let (_dir, storage) = test_storage();
        let record = storage.create(&volunteer("lihua@example.com")).unwrap();
        let advanced = review::decide(&record, Decision::Advance, "张老师", "").unwrap();
        storage.save(&advanced, 0).unwrap();

        let err = storage.delete(&record.id, 0).unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }
}
