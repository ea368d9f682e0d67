//! The review desk: where actors act on records and projects.
//!
//! A [`Desk`] ties the pieces together. Every mutation follows one path:
//!
//! 1. Load the current record from the store.
//! 2. Ask the [`Authorizer`] whether the actor may make this decision.
//! 3. Compute the next record with the pure engine in [`crate::review`].
//! 4. Save it, conditioned on the version read in step 1.
//! 5. Tell every [`TransitionObserver`].
//!
//! A save that loses a race (or times out on the lock) is retried from
//! step 1, a bounded number of times. A retry only re-applies the decision
//! if the record is still where the actor saw it; a record that moved in
//! between fails with an invalid-state error instead of advancing twice.

use jiff::Timestamp;
use jiff::civil::Date;
use tracing::{info, warn};

use crate::model::{
    Actor, Decision, Payload, Project, ProjectId, ProjectStatus, Record, RecordId, ReviewEvent,
    ReviewStage, ReviewStatus, Role, Selection, SelectionId, SubmitChannel,
};
use crate::review::{self, Authorizer, ReviewError, RolePolicy, TransitionObserver};
use crate::selection::{self, SelectionError};
use crate::storage::{ProjectStore, RecordFilter, RecordStore, StatusSummary, StorageError};

/// Everything a desk operation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// The actor's role does not allow this project or selection operation.
    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for DeskError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Refused(refusal) => Self::Selection(refusal),
            other => Self::Storage(other),
        }
    }
}

impl DeskError {
    /// True exactly for conflicts and lock timeouts that outlived the retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_retryable())
    }
}

pub type Result<T> = core::result::Result<T, DeskError>;

/// What a teacher fills in to publish a project.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub points: f64,
    pub deadline: Option<Date>,
    pub slots: u32,
}

/// Orchestrates store, engine, authorization, and observers.
pub struct Desk<S> {
    store: S,
    authorizer: Box<dyn Authorizer>,
    observers: Vec<Box<dyn TransitionObserver>>,
    conflict_retries: u32,
}

impl<S> Desk<S> {
    pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

    /// A desk over `store` with the default [`RolePolicy`].
    pub fn new(store: S) -> Self {
        Self {
            store,
            authorizer: Box::new(RolePolicy::default()),
            observers: Vec::new(),
            conflict_retries: Self::DEFAULT_CONFLICT_RETRIES,
        }
    }

    #[must_use]
    pub fn with_authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.authorizer = Box::new(authorizer);
        self
    }

    /// How many times a conflicting save is retried before giving up.
    #[must_use]
    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    /// Registers an observer for every persisted transition.
    pub fn observe(&mut self, observer: impl TransitionObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn authorize(&self, actor: &Actor, record: &Record, decision: Decision) -> Result<()> {
        if self.authorizer.can_decide(actor, record, decision) {
            return Ok(());
        }
        warn!(actor = %actor.identity, role = %actor.role, %decision, record = %record.id, "unauthorized");
        Err(ReviewError::Unauthorized {
            actor: actor.identity.clone(),
            role: actor.role.to_string(),
            decision,
            record: record.id.clone(),
        }
        .into())
    }

    fn notify(&self, record: &Record) {
        if let Some(event) = record.review_trail.last() {
            for observer in &self.observers {
                observer.on_transition(record, event);
            }
        }
    }
}

impl<S: RecordStore> Desk<S> {
    /// Creates a record for `subject`.
    ///
    /// Students submit for themselves; teachers and admins enter records on
    /// a student's behalf, which marks them as teacher-submitted.
    pub fn submit(&self, actor: &Actor, subject: Option<&str>, payload: Payload) -> Result<Record> {
        let (subject, via) = match actor.role {
            Role::Student => {
                if subject.is_some_and(|s| s != actor.identity) {
                    return Err(DeskError::Forbidden(format!(
                        "{} may only submit records for themselves",
                        actor.identity
                    )));
                }
                (actor.identity.as_str(), SubmitChannel::Student)
            }
            Role::Teacher | Role::Admin => {
                let subject = subject.ok_or_else(|| {
                    ReviewError::Validation("name the student this record is for".into())
                })?;
                (subject, SubmitChannel::Teacher)
            }
        };
        payload
            .validate()
            .map_err(|e| ReviewError::Validation(e.to_string()))?;

        let draft = review::create_record(subject, payload, via)?;
        let record = self.store.create(&draft)?;
        info!(
            record = %record.id,
            kind = record.kind().as_str(),
            subject = %record.subject_id,
            via = via.as_str(),
            "record created"
        );
        Ok(record)
    }

    pub fn get(&self, id: &RecordId) -> Result<Record> {
        Ok(self.store.get(id)?)
    }

    pub fn list(&self, filter: &RecordFilter) -> Result<Vec<Record>> {
        Ok(self.store.list(filter)?)
    }

    pub fn summary(&self, filter: &RecordFilter) -> Result<StatusSummary> {
        Ok(self.store.summary(filter)?)
    }

    /// The override events on a record, oldest first.
    pub fn corrections(&self, id: &RecordId) -> Result<Vec<ReviewEvent>> {
        let record = self.store.get(id)?;
        Ok(record.corrections().cloned().collect())
    }

    /// A reviewer's `advance` or `reject` on the record's current stage.
    pub fn decide(
        &self,
        id: &RecordId,
        decision: Decision,
        actor: &Actor,
        note: &str,
    ) -> Result<Record> {
        self.apply(id, actor, decision, |record| {
            review::decide(record, decision, &actor.identity, note)
        })
    }

    /// Admin override: back to stage1 for a fresh review.
    pub fn reopen(&self, id: &RecordId, actor: &Actor, note: &str) -> Result<Record> {
        self.apply(id, actor, Decision::Reopen, |record| {
            review::reopen(record, &actor.identity, note)
        })
    }

    /// Admin override: void the outcome for good.
    pub fn cancel(&self, id: &RecordId, actor: &Actor, note: &str) -> Result<Record> {
        self.apply(id, actor, Decision::Cancel, |record| {
            review::cancel(record, &actor.identity, note)
        })
    }

    /// The submitting student replaces the payload of a pending record.
    pub fn revise(
        &self,
        id: &RecordId,
        actor: &Actor,
        payload: &Payload,
        note: &str,
    ) -> Result<Record> {
        self.apply(id, actor, Decision::Revise, |record| {
            review::revise(record, &actor.identity, payload.clone(), note)
        })
    }

    /// The submitting student deletes a record nobody has ruled on yet.
    ///
    /// Authorized like a revision: only the record's own student may withdraw.
    pub fn withdraw(&self, id: &RecordId, actor: &Actor) -> Result<()> {
        let mut attempt = 0;
        loop {
            let current = self.store.get(id)?;
            self.authorize(actor, &current, Decision::Revise)?;
            review::check_withdraw(&current, &actor.identity)?;

            match self.store.delete(id, current.version) {
                Ok(()) => {
                    info!(record = %id, subject = %current.subject_id, "record withdrawn");
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.conflict_retries => {
                    attempt += 1;
                    warn!(record = %id, attempt, error = %e, "retrying withdrawal");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Load, authorize, transition, save; retried on conflict.
    fn apply<F>(&self, id: &RecordId, actor: &Actor, decision: Decision, step: F) -> Result<Record>
    where
        F: Fn(&Record) -> review::Result<Record>,
    {
        // The decision is only valid against the version it was computed from.
        let mut first_read: Option<(u64, ReviewStatus, ReviewStage)> = None;
        let mut attempt = 0;
        loop {
            let current = self.store.get(id)?;
            let (version, status, stage) = *first_read.get_or_insert((
                current.version,
                current.status,
                current.review_stage,
            ));
            if version != current.version {
                return Err(ReviewError::InvalidState(format!(
                    "record {id} changed before {decision} could be saved \
                     (was {status} at {stage}, now {} at {})",
                    current.status, current.review_stage
                ))
                .into());
            }

            self.authorize(actor, &current, decision)?;
            let next = step(&current)?;

            match self.store.save(&next, current.version) {
                Ok(saved) => {
                    info!(
                        record = %id,
                        %decision,
                        from = %current.review_stage,
                        to = %saved.review_stage,
                        status = %saved.status,
                        version = saved.version,
                        "transition saved"
                    );
                    self.notify(&saved);
                    return Ok(saved);
                }
                Err(e) if e.is_retryable() && attempt < self.conflict_retries => {
                    attempt += 1;
                    warn!(record = %id, %decision, attempt, error = %e, "retrying after conflict");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<S: ProjectStore> Desk<S> {
    /// Publishes a project. Teachers own what they publish.
    pub fn create_project(&self, actor: &Actor, new: NewProject) -> Result<Project> {
        if !matches!(actor.role, Role::Teacher | Role::Admin) {
            return Err(DeskError::Forbidden(format!(
                "{} ({}) may not publish projects",
                actor.identity, actor.role
            )));
        }
        selection::validate_project(&new.title, new.slots, new.points)?;

        let now = Timestamp::now();
        let project = self.store.create_project(&Project {
            id: ProjectId::generate(),
            title: new.title,
            description: new.description,
            points: new.points,
            deadline: new.deadline,
            slots: new.slots,
            selected_count: 0,
            status: ProjectStatus::Active,
            teacher: actor.identity.clone(),
            created_at: now,
            updated_at: now,
        })?;
        info!(project = %project.id, teacher = %project.teacher, slots = project.slots, "project published");
        Ok(project)
    }

    pub fn get_project(&self, id: &ProjectId) -> Result<Project> {
        Ok(self.store.get_project(id)?)
    }

    pub fn list_projects(&self, status: Option<ProjectStatus>) -> Result<Vec<Project>> {
        Ok(self.store.list_projects(status)?)
    }

    pub fn pause_project(&self, actor: &Actor, id: &ProjectId) -> Result<Project> {
        self.move_project(actor, id, ProjectStatus::Paused)
    }

    pub fn resume_project(&self, actor: &Actor, id: &ProjectId) -> Result<Project> {
        self.move_project(actor, id, ProjectStatus::Active)
    }

    /// Archived projects stay listed but never take selections again.
    pub fn archive_project(&self, actor: &Actor, id: &ProjectId) -> Result<Project> {
        self.move_project(actor, id, ProjectStatus::Archived)
    }

    /// A student takes one slot on a project.
    pub fn select(&self, actor: &Actor, project: &ProjectId) -> Result<Selection> {
        if actor.role != Role::Student {
            return Err(DeskError::Forbidden(format!(
                "only students select projects; {} is {}",
                actor.identity, actor.role
            )));
        }
        Ok(self.store.select(project, &actor.identity)?)
    }

    /// Releases a slot. The selecting student, the project's teacher, or an
    /// admin may cancel.
    pub fn cancel_selection(&self, actor: &Actor, id: &SelectionId) -> Result<Selection> {
        let current = self.store.get_selection(id)?;
        let allowed = match actor.role {
            Role::Student => actor.identity == current.student,
            Role::Teacher => self.store.get_project(&current.project)?.teacher == actor.identity,
            Role::Admin => true,
        };
        if !allowed {
            return Err(DeskError::Forbidden(format!(
                "{} ({}) may not cancel selection {id}",
                actor.identity, actor.role
            )));
        }
        Ok(self.store.cancel_selection(id)?)
    }

    pub fn list_selections(
        &self,
        student: Option<&str>,
        project: Option<&ProjectId>,
    ) -> Result<Vec<Selection>> {
        Ok(self.store.list_selections(student, project)?)
    }

    fn move_project(&self, actor: &Actor, id: &ProjectId, to: ProjectStatus) -> Result<Project> {
        let project = self.store.get_project(id)?;
        let owns = match actor.role {
            Role::Admin => true,
            Role::Teacher => project.teacher == actor.identity,
            Role::Student => false,
        };
        if !owns {
            return Err(DeskError::Forbidden(format!(
                "{} ({}) may not change project {id}",
                actor.identity, actor.role
            )));
        }

        let allowed = matches!(
            (project.status, to),
            (ProjectStatus::Active, ProjectStatus::Paused)
                | (ProjectStatus::Paused, ProjectStatus::Active)
                | (
                    ProjectStatus::Active | ProjectStatus::Paused,
                    ProjectStatus::Archived
                )
        );
        if !allowed {
            return Err(SelectionError::InvalidState(format!(
                "project {id} is {} and cannot become {to}",
                project.status
            ))
            .into());
        }

        let updated = self.store.set_project_status(id, to)?;
        info!(project = %id, from = %project.status, to = %to, "project status changed");
        Ok(updated)
    }
}
