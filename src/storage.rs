//! Local persistence for records, trails, projects, and selections.
//!
//! Everything lives in one `SQLite` database so capacity accounting and
//! version checks can run inside a single transaction:
//!
//! ```text
//! <root>/merit.sqlite
//!   record         # One row per record; `version` guards concurrent saves
//!   review_event   # Append-only trail rows, keyed by (record_id, seq)
//!   project        # Teacher projects with a guarded `selected_count`
//!   selection      # Student selections; one active per (project, student)
//! ```
//!
//! Every call opens its own connection with the configured busy timeout,
//! so a `Storage` can be cloned freely across threads.

mod project;
mod record;
mod schema;
mod selection;
mod trail;

use std::path::PathBuf;
use std::time::Duration;
use std::{fs, io};

use rusqlite::{Connection, ErrorCode};
use serde::Serialize;

use crate::model::{
    Project, ProjectId, ProjectStatus, Record, RecordId, RecordKind, ReviewStage, ReviewStatus,
    Selection, SelectionId,
};
use crate::selection::SelectionError;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("record already exists: {0}")]
    RecordAlreadyExists(RecordId),

    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("selection not found: {0}")]
    SelectionNotFound(SelectionId),

    /// The record changed between read and write. Re-fetch and retry.
    #[error("record {id} changed since it was read (expected version {expected}, found {found})")]
    Conflict {
        id: RecordId,
        expected: u64,
        found: u64,
    },

    /// Timed out waiting for another writer. Retryable, like a conflict.
    #[error("timed out waiting for the database lock")]
    Busy,

    /// A business rule checked under the write lock refused the change.
    #[error(transparent)]
    Refused(#[from] SelectionError),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("database schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i32, supported: i32 },

    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                Self::Busy
            }
            _ => Self::Sqlite(e),
        }
    }
}

impl StorageError {
    /// Conflicts and lock timeouts: safe to retry after re-fetching.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Busy)
    }
}

pub type Result<T> = core::result::Result<T, StorageError>;

/// Which records to list. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub subject: Option<String>,
    pub status: Option<ReviewStatus>,
    pub stage: Option<ReviewStage>,
    pub kind: Option<RecordKind>,
}

impl RecordFilter {
    pub fn subject(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            ..Self::default()
        }
    }
}

/// Record counts per status, for dashboards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub cancelled: usize,
}

impl StatusSummary {
    pub fn count(&mut self, status: ReviewStatus) {
        match status {
            ReviewStatus::Pending => self.pending += 1,
            ReviewStatus::Approved => self.approved += 1,
            ReviewStatus::Rejected => self.rejected += 1,
            ReviewStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.approved + self.rejected + self.cancelled
    }
}

/// Where records and their trails persist.
///
/// `save` is conditioned on the version the caller read: a stale version
/// fails with [`StorageError::Conflict`] and nothing is written.
pub trait RecordStore {
    /// Records matching `filter`, newest first.
    fn list(&self, filter: &RecordFilter) -> Result<Vec<Record>>;

    fn get(&self, id: &RecordId) -> Result<Record>;

    /// Persists a freshly created record. Returns it as stored.
    fn create(&self, draft: &Record) -> Result<Record>;

    /// Writes `record` if the stored version still equals `expected_version`.
    /// Returns the record with its new version.
    fn save(&self, record: &Record, expected_version: u64) -> Result<Record>;

    /// Deletes a record if the stored version still equals `expected_version`.
    fn delete(&self, id: &RecordId, expected_version: u64) -> Result<()>;

    fn summary(&self, filter: &RecordFilter) -> Result<StatusSummary> {
        let mut summary = StatusSummary::default();
        for record in self.list(filter)? {
            summary.count(record.status);
        }
        Ok(summary)
    }
}

/// Where projects and selections persist.
///
/// `select` and `cancel_selection` serialize per project: the slot count
/// and the selection row change together or not at all.
pub trait ProjectStore {
    fn create_project(&self, project: &Project) -> Result<Project>;

    fn get_project(&self, id: &ProjectId) -> Result<Project>;

    /// Projects, newest first, optionally by status.
    fn list_projects(&self, status: Option<ProjectStatus>) -> Result<Vec<Project>>;

    fn set_project_status(&self, id: &ProjectId, status: ProjectStatus) -> Result<Project>;

    /// Takes one slot on `project` for `student`, atomically.
    fn select(&self, project: &ProjectId, student: &str) -> Result<Selection>;

    /// Releases the slot held by a selection, atomically.
    fn cancel_selection(&self, id: &SelectionId) -> Result<Selection>;

    fn get_selection(&self, id: &SelectionId) -> Result<Selection>;

    /// Selections, newest first, optionally by student and/or project.
    fn list_selections(
        &self,
        student: Option<&str>,
        project: Option<&ProjectId>,
    ) -> Result<Vec<Selection>>;
}

/// `SQLite`-backed storage.
#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
    timeout: Duration,
}

impl Storage {
    /// How long a call waits on another writer before giving up.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Opens (or creates) the database at `path` and brings its schema up to date.
    ///
    /// The parent directory is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let storage = Self {
            path,
            timeout: Self::DEFAULT_TIMEOUT,
        };
        let conn = storage.open()?;
        schema::migrate(&conn)?;
        Ok(storage)
    }

    /// Sets the per-call timeout used when the database is locked.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the default database path: `~/.merit/merit.sqlite`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".merit").join("merit.sqlite"))
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.timeout)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(conn)
    }
}

/// Parses a stored text column, reporting failures as corruption.
fn parse_column<T>(column: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| StorageError::Corrupt(format!("invalid {column}: {e}")))
}
