//! Project and selection commands.

use clap::Subcommand;
use jiff::civil::Date;

use crate::model::{Actor, ProjectStatus};
use crate::storage::Storage;
use crate::workflow::{Desk, NewProject};

use super::{format, print_json, resolve_project, resolve_selection};

#[derive(Debug, Subcommand)]
pub enum ProjectCommand {
    /// Publish a project. Prints the project ID.
    New {
        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Bonus points a participant earns.
        #[arg(long, default_value_t = 0.0)]
        points: f64,

        /// Last day to take part (YYYY-MM-DD).
        #[arg(long)]
        deadline: Option<Date>,

        /// How many students may select the project.
        #[arg(long)]
        slots: u32,
    },

    /// List projects, newest first.
    List {
        /// active, paused, or archived.
        #[arg(long)]
        status: Option<ProjectStatus>,

        #[arg(long)]
        json: bool,
    },

    /// Stop taking selections for now.
    Pause {
        /// Project ID: full ID or unambiguous prefix.
        project: String,
    },

    /// Take selections again after a pause.
    Resume {
        /// Project ID: full ID or unambiguous prefix.
        project: String,
    },

    /// Close the project for good.
    Archive {
        /// Project ID: full ID or unambiguous prefix.
        project: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum SelectionCommand {
    /// List selections, newest first.
    List {
        #[arg(long)]
        student: Option<String>,

        /// Project ID: full ID or unambiguous prefix.
        #[arg(long)]
        project: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Give a slot back.
    Cancel {
        /// Selection ID: full ID or unambiguous prefix.
        selection: String,
    },
}

pub(super) fn run_project(
    desk: &Desk<Storage>,
    command: &ProjectCommand,
    actor: impl Fn() -> Result<Actor, String>,
) -> Result<(), String> {
    match command {
        ProjectCommand::New {
            title,
            description,
            points,
            deadline,
            slots,
        } => {
            let new = NewProject {
                title: title.clone(),
                description: description.clone(),
                points: *points,
                deadline: *deadline,
                slots: *slots,
            };
            cmd_new(desk, &actor()?, new)
        }
        ProjectCommand::List { status, json } => cmd_list(desk, *status, *json),
        ProjectCommand::Pause { project } => cmd_move(desk, &actor()?, project, ProjectStatus::Paused),
        ProjectCommand::Resume { project } => {
            cmd_move(desk, &actor()?, project, ProjectStatus::Active)
        }
        ProjectCommand::Archive { project } => {
            cmd_move(desk, &actor()?, project, ProjectStatus::Archived)
        }
    }
}

pub(super) fn run_selection(
    desk: &Desk<Storage>,
    command: &SelectionCommand,
    actor: impl Fn() -> Result<Actor, String>,
) -> Result<(), String> {
    match command {
        SelectionCommand::List {
            student,
            project,
            json,
        } => cmd_list_selections(desk, student.as_deref(), project.as_deref(), *json),
        SelectionCommand::Cancel { selection } => cmd_cancel_selection(desk, &actor()?, selection),
    }
}

pub(super) fn cmd_select(desk: &Desk<Storage>, actor: &Actor, reference: &str) -> Result<(), String> {
    let project = resolve_project(desk, reference)?;
    let selection = desk
        .select(actor, &project.id)
        .map_err(|e| format!("failed to select {}: {e}", project.id))?;

    println!("{}", selection.id);
    if let Ok(now) = desk.get_project(&project.id) {
        eprintln!(
            "Selected \"{}\" ({} of {} slots taken)",
            now.title, now.selected_count, now.slots
        );
    }
    Ok(())
}

fn cmd_new(desk: &Desk<Storage>, actor: &Actor, new: NewProject) -> Result<(), String> {
    let project = desk
        .create_project(actor, new)
        .map_err(|e| format!("failed to publish project: {e}"))?;

    println!("{}", project.id);
    Ok(())
}

fn cmd_list(desk: &Desk<Storage>, status: Option<ProjectStatus>, json: bool) -> Result<(), String> {
    let projects = desk
        .list_projects(status)
        .map_err(|e| format!("failed to list projects: {e}"))?;

    if json {
        return print_json(&projects);
    }
    if projects.is_empty() {
        println!("No projects");
        return Ok(());
    }
    for project in &projects {
        println!("{}", format::project_line(project));
    }
    Ok(())
}

fn cmd_move(
    desk: &Desk<Storage>,
    actor: &Actor,
    reference: &str,
    to: ProjectStatus,
) -> Result<(), String> {
    let project = resolve_project(desk, reference)?;
    let moved = match to {
        ProjectStatus::Active => desk.resume_project(actor, &project.id),
        ProjectStatus::Paused => desk.pause_project(actor, &project.id),
        ProjectStatus::Archived => desk.archive_project(actor, &project.id),
    }
    .map_err(|e| format!("failed to update {}: {e}", project.id))?;

    eprintln!("Project {} is now {}", moved.id, moved.status);
    Ok(())
}

fn cmd_list_selections(
    desk: &Desk<Storage>,
    student: Option<&str>,
    project: Option<&str>,
    json: bool,
) -> Result<(), String> {
    let project = project
        .map(|reference| resolve_project(desk, reference))
        .transpose()?;
    let selections = desk
        .list_selections(student, project.as_ref().map(|p| &p.id))
        .map_err(|e| format!("failed to list selections: {e}"))?;

    if json {
        return print_json(&selections);
    }
    if selections.is_empty() {
        println!("No selections");
        return Ok(());
    }
    for selection in &selections {
        println!("{}", format::selection_line(selection));
    }
    Ok(())
}

fn cmd_cancel_selection(
    desk: &Desk<Storage>,
    actor: &Actor,
    reference: &str,
) -> Result<(), String> {
    let selection = resolve_selection(desk, reference)?;
    desk.cancel_selection(actor, &selection.id)
        .map_err(|e| format!("failed to cancel {}: {e}", selection.id))?;

    eprintln!("Selection {} cancelled", selection.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::Parser;

    use crate::cli::{Cli, Command};

    #[test]
    fn project_new_parses_deadline() {
        let cli = Cli::try_parse_from([
            "merit", "project", "new", "--title", "数据平台", "--slots", "3", "--deadline",
            "2025-06-30",
        ])
        .unwrap();

        let Command::Project {
            command: ProjectCommand::New {
                deadline, slots, ..
            },
        } = cli.command
        else {
            panic!("expected project new");
        };
        assert_eq!(deadline, Some(Date::constant(2025, 6, 30)));
        assert_eq!(slots, 3);
    }

    #[test]
    fn project_new_requires_slots() {
        assert!(Cli::try_parse_from(["merit", "project", "new", "--title", "数据平台"]).is_err());
    }
}
