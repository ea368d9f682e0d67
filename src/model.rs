//! Core data model for merit.
//!
//! These types describe what moves through review:
//! records and their trails, teacher projects and student selections,
//! and the actors who act on them.

mod actor;
mod payload;
mod project;
mod record;
mod trail;

use uuid::Uuid;

pub use actor::{Actor, Role};
pub use payload::{ApplicationPayload, Payload, PayloadError, VolunteerPayload};
pub use project::{
    Project, ProjectId, ProjectStatus, Selection, SelectionId, SelectionStatus,
};
pub use record::{Record, RecordId, RecordKind, ReviewStage, ReviewStatus, SubmitChannel};
pub use trail::{Decision, ReviewEvent, TrailStage};

/// Generates a short prefixed identifier, e.g. `vol-3f9a0c12de`.
///
/// Ten hex characters from a v4 UUID keep ids readable on the command line
/// while staying collision-free at portal scale.
fn short_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &hex[..10])
}
