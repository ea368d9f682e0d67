//! Trail storage: append and load review events.
//!
//! Rows are only ever inserted. A save appends the events past the stored
//! length; it never rewrites a row that is already there.

use rusqlite::Connection;

use crate::model::{RecordId, ReviewEvent};

use super::{Result, StorageError, parse_column};

/// Number of events stored for a record.
pub(super) fn count(conn: &Connection, record_id: &RecordId) -> Result<usize> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM review_event WHERE record_id = ?1",
        [record_id.as_str()],
        |row| row.get(0),
    )?;
    usize::try_from(n).map_err(|e| StorageError::Corrupt(format!("invalid event count: {e}")))
}

/// Inserts `events[from..]`, numbering them from `from`.
pub(super) fn append_from(
    conn: &Connection,
    record_id: &RecordId,
    from: usize,
    events: &[ReviewEvent],
) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO review_event (record_id, seq, stage, decision, reviewer, note, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for (seq, event) in events.iter().enumerate().skip(from) {
        stmt.execute(rusqlite::params![
            record_id.as_str(),
            seq,
            event.stage.as_str(),
            event.decision.as_str(),
            &event.reviewer,
            &event.note,
            event.timestamp.to_string(),
        ])?;
    }
    Ok(())
}

/// Loads a record's events in order.
pub(super) fn load(conn: &Connection, record_id: &RecordId) -> Result<Vec<ReviewEvent>> {
    let mut stmt = conn.prepare(
        "SELECT stage, decision, reviewer, note, timestamp
         FROM review_event WHERE record_id = ?1 ORDER BY seq",
    )?;
    let rows = stmt.query_map([record_id.as_str()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut events = Vec::new();
    for row in rows {
        let (stage, decision, reviewer, note, timestamp) = row?;
        events.push(ReviewEvent {
            stage: parse_column("trail stage", &stage)?,
            decision: parse_column("decision", &decision)?,
            reviewer,
            note,
            timestamp: parse_column("event timestamp", &timestamp)?,
        });
    }
    Ok(events)
}
