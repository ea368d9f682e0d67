//! Output formatting for CLI display.

use std::fmt::Write as _;

use crate::model::{
    Decision, Project, Record, ReviewEvent, ReviewStage, ReviewStatus, Selection, TrailStage,
};

/// Stage with the portal's label, e.g. `stage2 (二审)`.
pub(super) fn stage_label(stage: ReviewStage) -> String {
    format!("{stage} ({})", stage.label())
}

/// Where a record stands after a transition.
pub(super) fn describe_position(record: &Record) -> String {
    match record.status {
        ReviewStatus::Pending => format!("is pending at {}", stage_label(record.review_stage)),
        ReviewStatus::Approved => "is approved".to_string(),
        ReviewStatus::Rejected => format!(
            "was rejected at {}",
            stage_label(record.review_stage)
        ),
        ReviewStatus::Cancelled => "is cancelled".to_string(),
    }
}

/// One line per record for listings.
pub(super) fn record_line(record: &Record) -> String {
    format!(
        "{}  [{}] [{}]  {}  {}",
        record.id,
        record.status,
        record.review_stage,
        record.subject_id,
        record.payload.headline()
    )
}

/// Full record view: header, payload, and trail.
pub(super) fn record_detail(record: &Record) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}  {}", record.id, record.payload.headline());
    let _ = writeln!(
        out,
        "  student:   {} ({})",
        record.payload.student_name(),
        record.subject_id
    );
    let _ = writeln!(out, "  status:    {}", describe_position(record));
    let _ = writeln!(out, "  submitted: {} via {}", record.created_at, record.submitted_via.as_str());
    if let Some(note) = record.latest_note() {
        let _ = writeln!(out, "  note:      {note}");
    }

    if record.review_trail.is_empty() {
        let _ = writeln!(out, "  trail:     (no decisions yet)");
    } else {
        let _ = writeln!(out, "  trail:");
        for event in &record.review_trail {
            let _ = writeln!(out, "    {}", event_line(event));
        }
    }
    out
}

/// One trail entry. Overrides are called out as such.
pub(super) fn event_line(event: &ReviewEvent) -> String {
    let what = match (event.stage, event.decision) {
        (TrailStage::Override, decision) => format!("admin override: {decision}"),
        (stage, Decision::Revise) => format!("revised at {stage}"),
        (stage, decision) => format!("{stage} {decision}"),
    };
    let mut line = format!("{}  {what} by {}", event.timestamp, event.reviewer);
    if !event.note.is_empty() {
        let _ = write!(line, ": {}", event.note);
    }
    line
}

pub(super) fn project_line(project: &Project) -> String {
    let deadline = project
        .deadline
        .map(|d| format!("  until {d}"))
        .unwrap_or_default();
    format!(
        "{}  [{}]  {}/{} taken  {} pts  {}{deadline}",
        project.id,
        project.status,
        project.selected_count,
        project.slots,
        project.points,
        project.title
    )
}

pub(super) fn selection_line(selection: &Selection) -> String {
    format!(
        "{}  [{}]  {}  {}",
        selection.id,
        selection.status.as_str(),
        selection.project,
        selection.student
    )
}
