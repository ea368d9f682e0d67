//! Reviewable records: the credit claims that move through review.

use std::fmt;
use std::str::FromStr;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{Decision, Payload, ReviewEvent, short_id};

/// Opaque, immutable record identifier (e.g. `vol-3f9a0c12de`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Generates a fresh id prefixed by the record kind.
    pub fn generate(kind: RecordKind) -> Self {
        let prefix = match kind {
            RecordKind::Volunteer => "vol",
            RecordKind::Application => "app",
            RecordKind::Selection => "enr",
        };
        Self(short_id(prefix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which family of credit claim a record belongs to.
///
/// `Volunteer` and `Application` records go through the three-stage pipeline.
/// `Selection` is the capacity-gated project enrollment, which has no trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Volunteer,
    Application,
    Selection,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Volunteer => "volunteer",
            Self::Application => "application",
            Self::Selection => "selection",
        }
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "volunteer" => Ok(Self::Volunteer),
            "application" => Ok(Self::Application),
            "selection" => Ok(Self::Selection),
            other => Err(format!("unknown record kind: {other}")),
        }
    }
}

/// Review outcome. `Pending` is the only non-terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl ReviewStatus {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Approved, Self::Rejected, Self::Cancelled];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states an admin override may act on.
    pub fn is_overridable(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown review status: {other}")),
        }
    }
}

/// Position in the review pipeline.
///
/// Meaningful only while the record is pending; frozen once it leaves pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStage {
    Stage1,
    Stage2,
    Stage3,
    Completed,
}

impl ReviewStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stage1 => "stage1",
            Self::Stage2 => "stage2",
            Self::Stage3 => "stage3",
            Self::Completed => "completed",
        }
    }

    /// The stage an `advance` lands on. `Completed` has no successor.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Stage1 => Some(Self::Stage2),
            Self::Stage2 => Some(Self::Stage3),
            Self::Stage3 => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    /// Human-facing label used by the portal (一审, 二审, 三审, 已完成).
    pub fn label(self) -> &'static str {
        match self {
            Self::Stage1 => "一审",
            Self::Stage2 => "二审",
            Self::Stage3 => "三审",
            Self::Completed => "已完成",
        }
    }
}

impl fmt::Display for ReviewStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stage1" => Ok(Self::Stage1),
            "stage2" => Ok(Self::Stage2),
            "stage3" => Ok(Self::Stage3),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown review stage: {other}")),
        }
    }
}

/// How a record entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitChannel {
    /// Submitted by the student. Only these may be revised or withdrawn.
    Student,
    /// Entered by a teacher on the student's behalf.
    Teacher,
}

impl SubmitChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
        }
    }
}

impl FromStr for SubmitChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            other => Err(format!("unknown submit channel: {other}")),
        }
    }
}

/// A credit claim under review.
///
/// `version` is the optimistic-concurrency token: the store bumps it on
/// every successful save and refuses saves against a stale value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub subject_id: String,
    pub status: ReviewStatus,
    pub review_stage: ReviewStage,
    pub review_trail: Vec<ReviewEvent>,
    pub submitted_via: SubmitChannel,
    pub payload: Payload,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub version: u64,
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        self.payload.kind()
    }

    /// The note of the most recent decision or override, if any.
    pub fn latest_note(&self) -> Option<&str> {
        self.review_trail
            .last()
            .map(|e| e.note.as_str())
            .filter(|n| !n.is_empty())
    }

    /// Override events, in the order they happened.
    pub fn corrections(&self) -> impl Iterator<Item = &ReviewEvent> {
        self.review_trail.iter().filter(|e| e.is_override())
    }

    /// Whether any reviewer has ruled on this record yet.
    pub fn has_review_decisions(&self) -> bool {
        self.review_trail
            .iter()
            .any(|e| matches!(e.decision, Decision::Advance | Decision::Reject))
    }
}
