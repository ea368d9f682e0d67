//! Schema creation and versioning.
//!
//! The version lives in `SQLite`'s `user_version` pragma. To change the
//! schema, bump `SCHEMA_VERSION` and add a `migrate_v{N}_to_v{N+1}` step.

use rusqlite::Connection;
use tracing::debug;

use super::{Result, StorageError};

const SCHEMA_VERSION: i32 = 1;

/// Brings the database up to `SCHEMA_VERSION`.
pub(super) fn migrate(conn: &Connection) -> Result<()> {
    let current: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if current > SCHEMA_VERSION {
        return Err(StorageError::SchemaTooNew {
            found: current,
            supported: SCHEMA_VERSION,
        });
    }

    if current < 1 {
        debug!(from = current, to = 1, "migrating schema");
        migrate_v0_to_v1(conn)?;
    }

    if current < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(())
}

fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;

         CREATE TABLE IF NOT EXISTS record (
             id            TEXT PRIMARY KEY,
             kind          TEXT NOT NULL,
             subject_id    TEXT NOT NULL,
             status        TEXT NOT NULL,
             review_stage  TEXT NOT NULL,
             submitted_via TEXT NOT NULL,
             payload       TEXT NOT NULL,
             created_at    TEXT NOT NULL,
             updated_at    TEXT NOT NULL,
             version       INTEGER NOT NULL DEFAULT 0
         );
         CREATE INDEX IF NOT EXISTS record_subject ON record (subject_id);
         CREATE INDEX IF NOT EXISTS record_status ON record (status, review_stage);

         CREATE TABLE IF NOT EXISTS review_event (
             record_id TEXT NOT NULL REFERENCES record (id) ON DELETE CASCADE,
             seq       INTEGER NOT NULL,
             stage     TEXT NOT NULL,
             decision  TEXT NOT NULL,
             reviewer  TEXT NOT NULL,
             note      TEXT NOT NULL,
             timestamp TEXT NOT NULL,
             PRIMARY KEY (record_id, seq)
         );

         CREATE TABLE IF NOT EXISTS project (
             id             TEXT PRIMARY KEY,
             title          TEXT NOT NULL,
             description    TEXT NOT NULL,
             points         REAL NOT NULL,
             deadline       TEXT,
             slots          INTEGER NOT NULL CHECK (slots > 0),
             selected_count INTEGER NOT NULL DEFAULT 0
                 CHECK (selected_count >= 0 AND selected_count <= slots),
             status         TEXT NOT NULL,
             teacher        TEXT NOT NULL,
             created_at     TEXT NOT NULL,
             updated_at     TEXT NOT NULL
         );

         CREATE TABLE IF NOT EXISTS selection (
             id         TEXT PRIMARY KEY,
             project_id TEXT NOT NULL REFERENCES project (id),
             student    TEXT NOT NULL,
             status     TEXT NOT NULL,
             created_at TEXT NOT NULL,
             updated_at TEXT NOT NULL
         );
         CREATE UNIQUE INDEX IF NOT EXISTS selection_active_student
             ON selection (project_id, student) WHERE status = 'active';

         COMMIT;",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_sets_user_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
    }

    #[test]
    fn newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();

        let err = migrate(&conn).unwrap_err();
        assert!(matches!(err, StorageError::SchemaTooNew { .. }));
    }
}
