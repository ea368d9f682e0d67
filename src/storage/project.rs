//! Project storage, and the slot accounting behind selections.
//!
//! `select` and `cancel_selection` run in `BEGIN IMMEDIATE` transactions,
//! which take the database write lock up front. The slot counter is also
//! guarded by a compare-and-swap on `selected_count < slots`, and by a
//! CHECK constraint in the schema, so it can never exceed capacity.

use jiff::Timestamp;
use jiff::civil::Date;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::info;

use crate::model::{Project, ProjectId, ProjectStatus, Selection, SelectionId, SelectionStatus};
use crate::selection::{self as rules, SelectionError};

use super::{ProjectStore, Result, Storage, StorageError, parse_column, selection};

const PROJECT_COLUMNS: &str = "id, title, description, points, deadline, slots, selected_count, \
                               status, teacher, created_at, updated_at";

impl ProjectStore for Storage {
    fn create_project(&self, project: &Project) -> Result<Project> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO project (id, title, description, points, deadline, slots,
                                  selected_count, status, teacher, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                project.id.as_str(),
                &project.title,
                &project.description,
                project.points,
                project.deadline.map(|d| d.to_string()),
                project.slots,
                project.selected_count,
                project.status.as_str(),
                &project.teacher,
                project.created_at.to_string(),
                project.updated_at.to_string(),
            ],
        )?;
        Ok(project.clone())
    }

    fn get_project(&self, id: &ProjectId) -> Result<Project> {
        let conn = self.open()?;
        load_project(&conn, id)
    }

    fn list_projects(&self, status: Option<ProjectStatus>) -> Result<Vec<Project>> {
        let conn = self.open()?;
        let mut projects = Vec::new();
        match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {PROJECT_COLUMNS} FROM project WHERE status = ?1"
                ))?;
                for row in stmt.query_map([status.as_str()], read_row)? {
                    projects.push(build_project(row?)?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!("SELECT {PROJECT_COLUMNS} FROM project"))?;
                for row in stmt.query_map([], read_row)? {
                    projects.push(build_project(row?)?);
                }
            }
        }
        projects.sort_by(|a: &Project, b: &Project| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    fn set_project_status(&self, id: &ProjectId, status: ProjectStatus) -> Result<Project> {
        let conn = self.open()?;
        let rows = conn.execute(
            "UPDATE project SET status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![status.as_str(), Timestamp::now().to_string(), id.as_str()],
        )?;
        if rows == 0 {
            return Err(StorageError::ProjectNotFound(id.clone()));
        }
        load_project(&conn, id)
    }

    fn select(&self, project_id: &ProjectId, student: &str) -> Result<Selection> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let project = load_project(&tx, project_id)?;
        let new = match rules::new_selection(&project, student) {
            Ok(s) => s,
            Err(e) => {
                info!(project = %project_id, student, reason = %e, "selection refused");
                return Err(e.into());
            }
        };
        if selection::has_active(&tx, project_id, student)? {
            return Err(SelectionError::AlreadySelected {
                project: project_id.clone(),
                student: student.to_string(),
            }
            .into());
        }

        let taken = tx.execute(
            "UPDATE project
             SET selected_count = selected_count + 1, updated_at = ?2
             WHERE id = ?1 AND status = 'active' AND selected_count < slots",
            rusqlite::params![project_id.as_str(), new.created_at.to_string()],
        )?;
        if taken == 0 {
            return Err(SelectionError::Capacity {
                project: project_id.clone(),
                slots: project.slots,
            }
            .into());
        }
        selection::insert(&tx, &new)?;
        tx.commit()?;

        info!(project = %project_id, student, selection = %new.id, "slot taken");
        Ok(new)
    }

    fn cancel_selection(&self, id: &SelectionId) -> Result<Selection> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut current = selection::load(&tx, id)?;
        rules::check_cancellable(&current)?;

        let now = Timestamp::now();
        tx.execute(
            "UPDATE selection SET status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![
                SelectionStatus::Cancelled.as_str(),
                now.to_string(),
                id.as_str()
            ],
        )?;
        tx.execute(
            "UPDATE project
             SET selected_count = MAX(selected_count - 1, 0), updated_at = ?2
             WHERE id = ?1",
            rusqlite::params![current.project.as_str(), now.to_string()],
        )?;
        tx.commit()?;

        info!(project = %current.project, selection = %id, "slot released");
        current.status = SelectionStatus::Cancelled;
        current.updated_at = now;
        Ok(current)
    }

    fn get_selection(&self, id: &SelectionId) -> Result<Selection> {
        let conn = self.open()?;
        selection::load(&conn, id)
    }

    fn list_selections(
        &self,
        student: Option<&str>,
        project: Option<&ProjectId>,
    ) -> Result<Vec<Selection>> {
        let conn = self.open()?;
        selection::list(&conn, student, project)
    }
}

type ProjectRow = (
    String,
    String,
    String,
    f64,
    Option<String>,
    u32,
    u32,
    String,
    String,
    String,
    String,
);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProjectRow> {
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
        row.get(9)?,
        row.get(10)?,
    ))
}

fn load_project(conn: &Connection, id: &ProjectId) -> Result<Project> {
    let row = conn
        .query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM project WHERE id = ?1"),
            [id.as_str()],
            read_row,
        )
        .optional()?
        .ok_or_else(|| StorageError::ProjectNotFound(id.clone()))?;
    build_project(row)
}

fn build_project(row: ProjectRow) -> Result<Project> {
    let (
        id,
        title,
        description,
        points,
        deadline,
        slots,
        selected_count,
        status,
        teacher,
        created_at,
        updated_at,
    ) = row;

    let deadline = deadline
        .as_deref()
        .map(|d| parse_column::<Date>("deadline", d))
        .transpose()?;

    Ok(Project {
        id: ProjectId::from(id),
        title,
        description,
        points,
        deadline,
        slots,
        selected_count,
        status: parse_column("project status", &status)?,
        teacher,
        created_at: parse_column("created_at", &created_at)?,
        updated_at: parse_column("updated_at", &updated_at)?,
    })
}
