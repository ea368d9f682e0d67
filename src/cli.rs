//! CLI interface for Merit.
//!
//! Non-interactive subcommands for students, teachers, and admins alike:
//! arguments in, structured output out. Listings go to stdout (`--json` for
//! machine-readable output); confirmations and progress go to stderr.
//!
//! Commands that act on a record resolve the actor through the identity
//! chain (`--as`/`--role`, `MERIT_IDENTITY`/`MERIT_ROLE`, config).
//! Record, project, and selection ids take a full id or an unambiguous
//! prefix (e.g. `vol-3f9`).

mod format;
mod project;
mod record;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::Config;
use crate::identity;
use crate::model::{Actor, Decision, Project, ProjectId, Record, RecordId, Selection};
use crate::storage::{RecordFilter, Storage};
use crate::workflow::Desk;

use project::{ProjectCommand, SelectionCommand};
use record::RecordCommand;

/// Merit: multi-stage review of student credit claims.
#[derive(Debug, Parser)]
#[command(name = "merit", after_long_help = WORKFLOW_HELP)]
pub struct Cli {
    /// Acting identity (e.g. a student email or teacher account).
    #[arg(long = "as", global = true)]
    identity: Option<String>,

    /// Acting role: student, teacher, or admin.
    #[arg(long, global = true)]
    role: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

const WORKFLOW_HELP: &str = r#"Workflow: a volunteer claim through three stages
  1. merit --as lihua@example.com --role student record submit volunteer \
       --name 李华 --activity "社区服务" --hours 8
     → prints a record ID (e.g. vol-3f9a0c12de)
  2. merit --as teacherA --role teacher review vol-3f9 advance
  3. merit --as teacherA --role teacher review vol-3f9 reject --note "证明缺失"
  4. merit --as admin --role admin override vol-3f9 reopen --note "补交证明后重审"

Projects:
  merit --as teacherA --role teacher project new --title "数据平台" --slots 3 --points 1.5
  merit --as lihua@example.com --role student select proj-0c4"#;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit, list, inspect, revise, and withdraw records.
    Record {
        #[command(subcommand)]
        command: RecordCommand,
    },

    /// Rule on a record's current stage.
    Review {
        /// Record ID: full ID or unambiguous prefix.
        record: String,

        #[command(subcommand)]
        decision: ReviewDecision,
    },

    /// Admin override on an approved or rejected record.
    Override {
        /// Record ID: full ID or unambiguous prefix.
        record: String,

        #[command(subcommand)]
        decision: OverrideDecision,
    },

    /// Record counts per status.
    Summary {
        /// Only count this student's records.
        #[arg(long)]
        student: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Publish and manage teacher projects.
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },

    /// Take a slot on a project.
    Select {
        /// Project ID: full ID or unambiguous prefix.
        project: String,
    },

    /// List or cancel selections.
    Selection {
        #[command(subcommand)]
        command: SelectionCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ReviewDecision {
    /// Pass the current stage. Passing stage3 approves the record.
    Advance {
        #[arg(long, default_value = "")]
        note: String,
    },

    /// Reject at the current stage. A note is required.
    Reject {
        #[arg(long)]
        note: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum OverrideDecision {
    /// Send the record back to stage1 for a fresh review.
    Reopen {
        /// Justification, kept in the trail.
        #[arg(long)]
        note: String,
    },

    /// Void the outcome for good.
    Cancel {
        /// Justification, kept in the trail.
        #[arg(long)]
        note: String,
    },
}

/// Run the CLI, returning an error message on failure.
pub fn run(config: &Config, desk: &Desk<Storage>) -> Result<(), String> {
    let cli = Cli::parse();
    let actor = || identity::resolve_actor(cli.identity.as_deref(), cli.role.as_deref(), config);

    match &cli.command {
        Command::Record { command } => record::run(desk, command, actor),
        Command::Review { record, decision } => {
            let actor = actor()?;
            let (decision, note) = match decision {
                ReviewDecision::Advance { note } => (Decision::Advance, note),
                ReviewDecision::Reject { note } => (Decision::Reject, note),
            };
            cmd_decide(desk, &actor, record, decision, note)
        }
        Command::Override { record, decision } => {
            let actor = actor()?;
            cmd_override(desk, &actor, record, decision)
        }
        Command::Summary { student, json } => cmd_summary(desk, student.as_deref(), *json),
        Command::Project { command } => project::run_project(desk, command, actor),
        Command::Select { project } => {
            let actor = actor()?;
            project::cmd_select(desk, &actor, project)
        }
        Command::Selection { command } => project::run_selection(desk, command, actor),
    }
}

fn cmd_decide(
    desk: &Desk<Storage>,
    actor: &Actor,
    reference: &str,
    decision: Decision,
    note: &str,
) -> Result<(), String> {
    let record = resolve_record(desk, reference)?;
    let updated = desk
        .decide(&record.id, decision, actor, note)
        .map_err(|e| format!("failed to {decision} {}: {e}", record.id))?;

    eprintln!(
        "Record {} {}",
        updated.id,
        format::describe_position(&updated)
    );
    Ok(())
}

fn cmd_override(
    desk: &Desk<Storage>,
    actor: &Actor,
    reference: &str,
    decision: &OverrideDecision,
) -> Result<(), String> {
    let record = resolve_record(desk, reference)?;
    let updated = match decision {
        OverrideDecision::Reopen { note } => desk.reopen(&record.id, actor, note),
        OverrideDecision::Cancel { note } => desk.cancel(&record.id, actor, note),
    }
    .map_err(|e| format!("override on {} failed: {e}", record.id))?;

    eprintln!(
        "Admin override: record {} {}",
        updated.id,
        format::describe_position(&updated)
    );
    Ok(())
}

fn cmd_summary(desk: &Desk<Storage>, student: Option<&str>, json: bool) -> Result<(), String> {
    let filter = student.map(RecordFilter::subject).unwrap_or_default();
    let summary = desk
        .summary(&filter)
        .map_err(|e| format!("failed to summarize records: {e}"))?;

    if json {
        return print_json(&summary);
    }
    println!("pending    {}", summary.pending);
    println!("approved   {}", summary.approved);
    println!("rejected   {}", summary.rejected);
    println!("cancelled  {}", summary.cancelled);
    println!("total      {}", summary.total());
    Ok(())
}

fn print_json(value: &impl Serialize) -> Result<(), String> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| format!("failed to serialize: {e}"))?;
    println!("{json}");
    Ok(())
}

/// Resolve a record reference (full ID or unambiguous prefix) to a record.
fn resolve_record(desk: &Desk<Storage>, reference: &str) -> Result<Record, String> {
    if let Ok(record) = desk.get(&RecordId::from(reference)) {
        return Ok(record);
    }
    let records = desk
        .list(&RecordFilter::default())
        .map_err(|e| format!("failed to list records: {e}"))?;
    resolve_prefix("record", reference, records, |r| r.id.as_str())
}

fn resolve_project(desk: &Desk<Storage>, reference: &str) -> Result<Project, String> {
    if let Ok(project) = desk.get_project(&ProjectId::from(reference)) {
        return Ok(project);
    }
    let projects = desk
        .list_projects(None)
        .map_err(|e| format!("failed to list projects: {e}"))?;
    resolve_prefix("project", reference, projects, |p| p.id.as_str())
}

fn resolve_selection(desk: &Desk<Storage>, reference: &str) -> Result<Selection, String> {
    let selections = desk
        .list_selections(None, None)
        .map_err(|e| format!("failed to list selections: {e}"))?;
    if let Some(exact) = selections.iter().find(|s| s.id.as_str() == reference) {
        return Ok(exact.clone());
    }
    resolve_prefix("selection", reference, selections, |s| s.id.as_str())
}

/// Picks the single item whose id starts with `reference`.
fn resolve_prefix<T>(
    noun: &str,
    reference: &str,
    items: Vec<T>,
    id: impl Fn(&T) -> &str,
) -> Result<T, String> {
    let mut matches: Vec<T> = items
        .into_iter()
        .filter(|item| id(item).starts_with(reference))
        .collect();

    match matches.len() {
        0 => Err(format!("no {noun} matching '{reference}'")),
        1 => Ok(matches.remove(0)),
        n => {
            let ids: Vec<&str> = matches.iter().map(&id).collect();
            Err(format!(
                "'{reference}' is ambiguous: matches {n} {noun}s: {}",
                ids.join(", ")
            ))
        }
    }
}
