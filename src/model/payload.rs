//! Payload: the kind-specific content of a record.
//!
//! The review engine never looks inside a payload; it is carried through
//! every transition unchanged. Field checks live here so every submitter
//! surface validates the same way.

use serde::{Deserialize, Serialize};

use super::{ProjectId, RecordKind};

/// What a record claims credit for.
///
/// Tagged by kind so each stored payload is self-describing when read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Payload {
    /// Volunteer hours.
    Volunteer(VolunteerPayload),

    /// Competition, research, or other credit application.
    Application(ApplicationPayload),
}

/// Volunteer-hours claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerPayload {
    pub student_name: String,

    /// Student number, when the submitter supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_number: Option<String>,

    pub activity: String,

    pub hours: f64,

    /// Reference to an uploaded proof file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,

    /// Whether the proof still needs OCR before review.
    #[serde(default)]
    pub require_ocr: bool,

    /// Teacher project the hours were earned on, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectId>,
}

/// Competition or research credit application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationPayload {
    pub student_name: String,

    /// Competition, paper, or project name.
    pub title: String,

    /// Free-form category, e.g. "competition" or "research".
    pub category: String,

    /// Bonus points claimed.
    pub points: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
}

/// A payload field that fails submission checks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{0} must be a positive number")]
    NotPositive(&'static str),
}

impl Payload {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Volunteer(_) => RecordKind::Volunteer,
            Self::Application(_) => RecordKind::Application,
        }
    }

    pub fn student_name(&self) -> &str {
        match self {
            Self::Volunteer(v) => &v.student_name,
            Self::Application(a) => &a.student_name,
        }
    }

    /// One-line description for listings.
    pub fn headline(&self) -> String {
        match self {
            Self::Volunteer(v) => format!("{} ({}h)", v.activity, v.hours),
            Self::Application(a) => format!("{} [{}] ({} pts)", a.title, a.category, a.points),
        }
    }

    /// Submission checks: non-empty names, positive hours and points.
    pub fn validate(&self) -> Result<(), PayloadError> {
        match self {
            Self::Volunteer(v) => {
                require_text("student name", &v.student_name)?;
                require_text("activity", &v.activity)?;
                require_positive("hours", v.hours)
            }
            Self::Application(a) => {
                require_text("student name", &a.student_name)?;
                require_text("title", &a.title)?;
                require_text("category", &a.category)?;
                require_positive("points", a.points)
            }
        }
    }
}

fn require_text(field: &'static str, value: &str) -> Result<(), PayloadError> {
    if value.trim().is_empty() {
        return Err(PayloadError::Empty(field));
    }
    Ok(())
}

fn require_positive(field: &'static str, value: f64) -> Result<(), PayloadError> {
    // NaN fails this comparison too.
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(PayloadError::NotPositive(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volunteer(activity: &str, hours: f64) -> Payload {
        Payload::Volunteer(VolunteerPayload {
            student_name: "李华".into(),
            student_number: None,
            activity: activity.into(),
            hours,
            proof: None,
            require_ocr: false,
            project: None,
        })
    }

    #[test]
    fn valid_volunteer_payload_passes() {
        assert!(volunteer("社区图书整理", 6.0).validate().is_ok());
    }

    #[test]
    fn blank_activity_is_rejected() {
        let err = volunteer("  ", 6.0).validate().unwrap_err();
        assert_eq!(err, PayloadError::Empty("activity"));
    }

    #[test]
    fn non_positive_hours_are_rejected() {
        assert_eq!(
            volunteer("社区服务", 0.0).validate().unwrap_err(),
            PayloadError::NotPositive("hours")
        );
        assert!(volunteer("社区服务", f64::NAN).validate().is_err());
    }

    #[test]
    fn application_requires_points() {
        let payload = Payload::Application(ApplicationPayload {
            student_name: "王敏".into(),
            title: "数学建模竞赛".into(),
            category: "competition".into(),
            points: -1.0,
            proof: None,
        });
        assert_eq!(
            payload.validate().unwrap_err(),
            PayloadError::NotPositive("points")
        );
    }

    #[test]
    fn payload_json_is_tagged_by_kind() {
        let json = serde_json::to_value(volunteer("社区服务", 2.0)).unwrap();
        assert_eq!(json["kind"], "volunteer");
        assert_eq!(json["activity"], "社区服务");
    }
}
