//! Project selection: single-gate, capacity-limited enrollment.
//!
//! No reviewers and no trail. A selection is admitted when the project is
//! active and has a free slot. The checks here are pure; the store runs
//! them again inside the transaction that takes the slot, so two students
//! racing for the last slot cannot both win.

use jiff::Timestamp;

use crate::model::{Project, ProjectId, ProjectStatus, Selection, SelectionId, SelectionStatus};

/// Why a selection was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("project {project} is full ({slots} slots taken)")]
    Capacity { project: ProjectId, slots: u32 },

    #[error("project {project} is {status} and not accepting selections")]
    NotAccepting {
        project: ProjectId,
        status: ProjectStatus,
    },

    #[error("{student} has already selected project {project}")]
    AlreadySelected { project: ProjectId, student: String },

    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type Result<T> = core::result::Result<T, SelectionError>;

/// Checks whether `project` can admit one more selection.
pub fn check_admission(project: &Project) -> Result<()> {
    if project.status != ProjectStatus::Active {
        return Err(SelectionError::NotAccepting {
            project: project.id.clone(),
            status: project.status,
        });
    }
    if project.selected_count >= project.slots {
        return Err(SelectionError::Capacity {
            project: project.id.clone(),
            slots: project.slots,
        });
    }
    Ok(())
}

/// Builds the selection a successful `select` will persist.
pub fn new_selection(project: &Project, student: &str) -> Result<Selection> {
    if student.trim().is_empty() {
        return Err(SelectionError::Validation(
            "a selection must name the student".into(),
        ));
    }
    check_admission(project)?;

    let now = Timestamp::now();
    Ok(Selection {
        id: SelectionId::generate(),
        project: project.id.clone(),
        student: student.to_string(),
        status: SelectionStatus::Active,
        created_at: now,
        updated_at: now,
    })
}

/// Checks that a selection can still be cancelled.
pub fn check_cancellable(selection: &Selection) -> Result<()> {
    if selection.status != SelectionStatus::Active {
        return Err(SelectionError::InvalidState(format!(
            "selection {} is already {}",
            selection.id,
            selection.status.as_str()
        )));
    }
    Ok(())
}

/// Validates the fields of a project a teacher is about to publish.
pub fn validate_project(title: &str, slots: u32, points: f64) -> Result<()> {
    if title.trim().is_empty() {
        return Err(SelectionError::Validation("project title must not be empty".into()));
    }
    if slots == 0 {
        return Err(SelectionError::Validation("a project needs at least one slot".into()));
    }
    if !(points >= 0.0 && points.is_finite()) {
        return Err(SelectionError::Validation("points must be zero or more".into()));
    }
    Ok(())
}
