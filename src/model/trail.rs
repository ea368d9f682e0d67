//! Review trail: the append-only history of decisions on a record.
//!
//! One event per transition. Events are never edited or removed;
//! reopening a record starts a fresh cycle on top of the existing trail.

use std::fmt;
use std::str::FromStr;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::ReviewStage;

/// What an actor did to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Pass the current stage.
    Advance,
    /// Reject at the current stage. Terminal until reopened.
    Reject,
    /// Admin override: send a decided record back to stage1.
    Reopen,
    /// Admin override: void a decided record for good.
    Cancel,
    /// Submitter amended a pending record; review restarts at stage1.
    Revise,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::Reject => "reject",
            Self::Reopen => "reopen",
            Self::Cancel => "cancel",
            Self::Revise => "revise",
        }
    }

    pub fn is_override(self) -> bool {
        matches!(self, Self::Reopen | Self::Cancel)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "advance" => Ok(Self::Advance),
            "reject" => Ok(Self::Reject),
            "reopen" => Ok(Self::Reopen),
            "cancel" => Ok(Self::Cancel),
            "revise" => Ok(Self::Revise),
            other => Err(format!("unknown decision: {other}")),
        }
    }
}

/// The stage an event concludes, or the synthetic override marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailStage {
    Stage1,
    Stage2,
    Stage3,
    Override,
}

impl TrailStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stage1 => "stage1",
            Self::Stage2 => "stage2",
            Self::Stage3 => "stage3",
            Self::Override => "override",
        }
    }
}

impl From<ReviewStage> for TrailStage {
    /// `Completed` never concludes a stage of its own; it maps to stage3,
    /// the stage whose approval produced it.
    fn from(stage: ReviewStage) -> Self {
        match stage {
            ReviewStage::Stage1 => Self::Stage1,
            ReviewStage::Stage2 => Self::Stage2,
            ReviewStage::Stage3 | ReviewStage::Completed => Self::Stage3,
        }
    }
}

impl fmt::Display for TrailStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrailStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stage1" => Ok(Self::Stage1),
            "stage2" => Ok(Self::Stage2),
            "stage3" => Ok(Self::Stage3),
            "override" => Ok(Self::Override),
            other => Err(format!("unknown trail stage: {other}")),
        }
    }
}

/// A single entry in a record's review trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEvent {
    pub stage: TrailStage,
    pub decision: Decision,
    pub reviewer: String,
    pub note: String,
    pub timestamp: Timestamp,
}

impl ReviewEvent {
    pub fn is_override(&self) -> bool {
        self.decision.is_override()
    }
}
