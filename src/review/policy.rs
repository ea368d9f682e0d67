//! Hooks around the engine: who may decide, and who hears about it.

use serde::{Deserialize, Serialize};

use crate::model::{Actor, Decision, Record, ReviewEvent, ReviewStage, Role};

/// Decides whether an actor may make a decision on a record.
///
/// Consulted before every transition. Deployments pick the mapping;
/// [`RolePolicy`] is the configurable default.
pub trait Authorizer: Send + Sync {
    fn can_decide(&self, actor: &Actor, record: &Record, decision: Decision) -> bool;
}

impl<F> Authorizer for F
where
    F: Fn(&Actor, &Record, Decision) -> bool + Send + Sync,
{
    fn can_decide(&self, actor: &Actor, record: &Record, decision: Decision) -> bool {
        self(actor, record, decision)
    }
}

/// Notified after every persisted transition.
///
/// Lets presentation layers refresh without polling the store.
pub trait TransitionObserver: Send + Sync {
    fn on_transition(&self, record: &Record, event: &ReviewEvent);
}

impl<F> TransitionObserver for F
where
    F: Fn(&Record, &ReviewEvent) + Send + Sync,
{
    fn on_transition(&self, record: &Record, event: &ReviewEvent) {
        self(record, event);
    }
}

/// Role-to-stage mapping, loaded from the `[policy]` table of the config.
///
/// Defaults to the portal's split: teachers review every stage,
/// admins override. Revisions are always the submitting student's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RolePolicy {
    pub stage1: Vec<Role>,
    pub stage2: Vec<Role>,
    pub stage3: Vec<Role>,
    #[serde(rename = "override")]
    pub overrides: Vec<Role>,
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self {
            stage1: vec![Role::Teacher],
            stage2: vec![Role::Teacher],
            stage3: vec![Role::Teacher],
            overrides: vec![Role::Admin],
        }
    }
}

impl RolePolicy {
    /// Roles allowed to rule on a stage. A completed record answers with
    /// the stage3 roles so a late decision surfaces as a state error.
    pub fn reviewers_for(&self, stage: ReviewStage) -> &[Role] {
        match stage {
            ReviewStage::Stage1 => &self.stage1,
            ReviewStage::Stage2 => &self.stage2,
            ReviewStage::Stage3 | ReviewStage::Completed => &self.stage3,
        }
    }
}

impl Authorizer for RolePolicy {
    fn can_decide(&self, actor: &Actor, record: &Record, decision: Decision) -> bool {
        match decision {
            Decision::Advance | Decision::Reject => {
                self.reviewers_for(record.review_stage).contains(&actor.role)
            }
            Decision::Reopen | Decision::Cancel => self.overrides.contains(&actor.role),
            Decision::Revise => actor.role == Role::Student && actor.identity == record.subject_id,
        }
    }
}
