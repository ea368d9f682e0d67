//! Record commands: submit, list, show, revise, withdraw.

use clap::{Args, Subcommand};

use crate::model::{
    Actor, ApplicationPayload, Payload, ProjectId, RecordKind, ReviewStage, ReviewStatus,
    VolunteerPayload,
};
use crate::storage::{RecordFilter, Storage};
use crate::workflow::Desk;

use super::{format, print_json, resolve_record};

#[derive(Debug, Subcommand)]
pub enum RecordCommand {
    /// Submit a new record. Prints the record ID.
    ///
    /// Students submit for themselves. Teachers and admins enter records on
    /// a student's behalf with `--student`.
    Submit {
        /// The student this record is for (teachers and admins only).
        #[arg(long)]
        student: Option<String>,

        #[command(subcommand)]
        payload: PayloadCommand,
    },

    /// List records, newest first.
    List {
        #[arg(long)]
        student: Option<String>,

        /// pending, approved, rejected, or cancelled.
        #[arg(long)]
        status: Option<ReviewStatus>,

        /// stage1, stage2, stage3, or completed.
        #[arg(long)]
        stage: Option<ReviewStage>,

        /// volunteer or application.
        #[arg(long)]
        kind: Option<RecordKind>,

        #[arg(long)]
        json: bool,
    },

    /// Show a record with its full review trail.
    Show {
        /// Record ID: full ID or unambiguous prefix.
        record: String,

        #[arg(long)]
        json: bool,
    },

    /// Replace the content of your own pending record. Review restarts at stage1.
    Revise {
        /// Record ID: full ID or unambiguous prefix.
        record: String,

        /// Why the record changed.
        #[arg(long, default_value = "")]
        note: String,

        #[command(subcommand)]
        payload: PayloadCommand,
    },

    /// Delete your own pending record before anyone has ruled on it.
    Withdraw {
        /// Record ID: full ID or unambiguous prefix.
        record: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum PayloadCommand {
    /// Volunteer hours.
    Volunteer(VolunteerArgs),

    /// Competition, research, or paper credit.
    Application(ApplicationArgs),
}

#[derive(Debug, Args)]
pub struct VolunteerArgs {
    /// Student's name as it should appear on the record.
    #[arg(long)]
    name: String,

    /// Student number.
    #[arg(long)]
    number: Option<String>,

    /// What the hours were spent on.
    #[arg(long)]
    activity: String,

    #[arg(long)]
    hours: f64,

    /// Reference to the uploaded proof.
    #[arg(long)]
    proof: Option<String>,

    /// The proof still needs OCR before review.
    #[arg(long)]
    ocr: bool,

    /// Teacher project the hours were earned on.
    #[arg(long)]
    project: Option<String>,
}

#[derive(Debug, Args)]
pub struct ApplicationArgs {
    #[arg(long)]
    name: String,

    /// Competition, paper, or project name.
    #[arg(long)]
    title: String,

    /// e.g. competition, research, paper.
    #[arg(long)]
    category: String,

    /// Bonus points claimed.
    #[arg(long)]
    points: f64,

    #[arg(long)]
    proof: Option<String>,
}

impl PayloadCommand {
    fn to_payload(&self) -> Payload {
        match self {
            Self::Volunteer(v) => Payload::Volunteer(VolunteerPayload {
                student_name: v.name.clone(),
                student_number: v.number.clone(),
                activity: v.activity.clone(),
                hours: v.hours,
                proof: v.proof.clone(),
                require_ocr: v.ocr,
                project: v.project.as_deref().map(ProjectId::from),
            }),
            Self::Application(a) => Payload::Application(ApplicationPayload {
                student_name: a.name.clone(),
                title: a.title.clone(),
                category: a.category.clone(),
                points: a.points,
                proof: a.proof.clone(),
            }),
        }
    }
}

pub(super) fn run(
    desk: &Desk<Storage>,
    command: &RecordCommand,
    actor: impl Fn() -> Result<Actor, String>,
) -> Result<(), String> {
    match command {
        RecordCommand::Submit { student, payload } => {
            cmd_submit(desk, &actor()?, student.as_deref(), payload)
        }
        RecordCommand::List {
            student,
            status,
            stage,
            kind,
            json,
        } => {
            let filter = RecordFilter {
                subject: student.clone(),
                status: *status,
                stage: *stage,
                kind: *kind,
            };
            cmd_list(desk, &filter, *json)
        }
        RecordCommand::Show { record, json } => cmd_show(desk, record, *json),
        RecordCommand::Revise {
            record,
            note,
            payload,
        } => cmd_revise(desk, &actor()?, record, payload, note),
        RecordCommand::Withdraw { record } => cmd_withdraw(desk, &actor()?, record),
    }
}

fn cmd_submit(
    desk: &Desk<Storage>,
    actor: &Actor,
    student: Option<&str>,
    payload: &PayloadCommand,
) -> Result<(), String> {
    let record = desk
        .submit(actor, student, payload.to_payload())
        .map_err(|e| format!("failed to submit record: {e}"))?;

    println!("{}", record.id);
    eprintln!(
        "Submitted {} for {}: {}",
        record.kind().as_str(),
        record.subject_id,
        record.payload.headline()
    );
    Ok(())
}

fn cmd_list(desk: &Desk<Storage>, filter: &RecordFilter, json: bool) -> Result<(), String> {
    let records = desk
        .list(filter)
        .map_err(|e| format!("failed to list records: {e}"))?;

    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No records");
        return Ok(());
    }
    for record in &records {
        println!("{}", format::record_line(record));
    }
    Ok(())
}

fn cmd_show(desk: &Desk<Storage>, reference: &str, json: bool) -> Result<(), String> {
    let record = resolve_record(desk, reference)?;
    if json {
        return print_json(&record);
    }
    print!("{}", format::record_detail(&record));
    Ok(())
}

fn cmd_revise(
    desk: &Desk<Storage>,
    actor: &Actor,
    reference: &str,
    payload: &PayloadCommand,
    note: &str,
) -> Result<(), String> {
    let record = resolve_record(desk, reference)?;
    let revised = desk
        .revise(&record.id, actor, &payload.to_payload(), note)
        .map_err(|e| format!("failed to revise {}: {e}", record.id))?;

    eprintln!(
        "Record {} revised; review restarts at {}",
        revised.id,
        format::stage_label(revised.review_stage)
    );
    Ok(())
}

fn cmd_withdraw(desk: &Desk<Storage>, actor: &Actor, reference: &str) -> Result<(), String> {
    let record = resolve_record(desk, reference)?;
    desk.withdraw(&record.id, actor)
        .map_err(|e| format!("failed to withdraw {}: {e}", record.id))?;

    eprintln!("Record {} withdrawn", record.id);
    Ok(())
}
