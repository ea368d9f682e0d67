//! Selection rows. Slot accounting lives with the project store.

use rusqlite::{Connection, OptionalExtension};

use crate::model::{ProjectId, Selection, SelectionId, SelectionStatus};

use super::{Result, StorageError, parse_column};

const SELECTION_COLUMNS: &str = "id, project_id, student, status, created_at, updated_at";

type SelectionRow = (String, String, String, String, String, String);

pub(super) fn insert(conn: &Connection, selection: &Selection) -> Result<()> {
    conn.execute(
        "INSERT INTO selection (id, project_id, student, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            selection.id.as_str(),
            selection.project.as_str(),
            &selection.student,
            selection.status.as_str(),
            selection.created_at.to_string(),
            selection.updated_at.to_string(),
        ],
    )?;
    Ok(())
}

/// Whether `student` holds an active selection on `project`.
pub(super) fn has_active(conn: &Connection, project: &ProjectId, student: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM selection
             WHERE project_id = ?1 AND student = ?2 AND status = 'active'",
            [project.as_str(), student],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(super) fn load(conn: &Connection, id: &SelectionId) -> Result<Selection> {
    let row = conn
        .query_row(
            &format!("SELECT {SELECTION_COLUMNS} FROM selection WHERE id = ?1"),
            [id.as_str()],
            read_row,
        )
        .optional()?
        .ok_or_else(|| StorageError::SelectionNotFound(id.clone()))?;
    build_selection(row)
}

/// Selections, newest first, optionally by student and/or project.
pub(super) fn list(
    conn: &Connection,
    student: Option<&str>,
    project: Option<&ProjectId>,
) -> Result<Vec<Selection>> {
    let mut clauses = Vec::new();
    let mut params: Vec<String> = Vec::new();
    if let Some(student) = student {
        params.push(student.to_string());
        clauses.push(format!("student = ?{}", params.len()));
    }
    if let Some(project) = project {
        params.push(project.as_str().to_string());
        clauses.push(format!("project_id = ?{}", params.len()));
    }

    let mut sql = format!("SELECT {SELECTION_COLUMNS} FROM selection");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), read_row)?;

    let mut selections = Vec::new();
    for row in rows {
        selections.push(build_selection(row?)?);
    }
    selections.sort_by(|a: &Selection, b: &Selection| {
        b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
    });
    Ok(selections)
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SelectionRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn build_selection(row: SelectionRow) -> Result<Selection> {
    let (id, project, student, status, created_at, updated_at) = row;
    Ok(Selection {
        id: SelectionId::from(id),
        project: ProjectId::from(project),
        student,
        status: parse_column::<SelectionStatus>("selection status", &status)?,
        created_at: parse_column("created_at", &created_at)?,
        updated_at: parse_column("updated_at", &updated_at)?,
    })
}
