//! The review engine: pure state transitions over a record.
//!
//! Every function takes the current record by reference and returns the
//! next record value. Nothing is mutated on failure, so a caller holding
//! the input can always retry against fresher state.
//!
//! ```text
//! stage1 ─advance→ stage2 ─advance→ stage3 ─advance→ completed (approved)
//!    │                │                │
//!    └────reject──────┴────reject──────┴──→ rejected (stage frozen)
//!
//! approved | rejected ─reopen→ pending @ stage1
//! approved | rejected ─cancel→ cancelled (final)
//! ```

mod policy;

use jiff::Timestamp;

use crate::model::{
    Decision, Payload, Record, RecordId, ReviewEvent, ReviewStage, ReviewStatus, SubmitChannel,
    TrailStage,
};

pub use policy::{Authorizer, RolePolicy, TransitionObserver};

/// Why a review operation was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    /// Malformed input. Correct it and try again.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The record's current status or stage does not permit the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The acting role is not allowed to make this decision here.
    #[error("{actor} ({role}) may not {decision} record {record}")]
    Unauthorized {
        actor: String,
        role: String,
        decision: Decision,
        record: RecordId,
    },
}

pub type Result<T> = core::result::Result<T, ReviewError>;

/// Creates a new record: pending at stage1 with an empty trail.
///
/// The subject must be named; every record belongs to exactly one student.
pub fn create_record(subject_id: &str, payload: Payload, via: SubmitChannel) -> Result<Record> {
    if subject_id.trim().is_empty() {
        return Err(ReviewError::Validation(
            "a record must name its submitting student".into(),
        ));
    }

    let now = Timestamp::now();
    Ok(Record {
        id: RecordId::generate(payload.kind()),
        subject_id: subject_id.to_string(),
        status: ReviewStatus::Pending,
        review_stage: ReviewStage::Stage1,
        review_trail: Vec::new(),
        submitted_via: via,
        payload,
        created_at: now,
        updated_at: now,
        version: 0,
    })
}

/// Applies a reviewer's `advance` or `reject` to the record's current stage.
///
/// Advancing stage3 approves the record. Rejecting freezes the stage
/// and is terminal until an override reopens it. A reject must carry a note.
pub fn decide(record: &Record, decision: Decision, reviewer: &str, note: &str) -> Result<Record> {
    if !matches!(decision, Decision::Advance | Decision::Reject) {
        return Err(ReviewError::Validation(format!(
            "'{decision}' is not a stage decision; use advance or reject"
        )));
    }
    require_actor(reviewer)?;

    if record.status != ReviewStatus::Pending {
        return Err(ReviewError::InvalidState(format!(
            "cannot decide on a non-pending record ({} is {})",
            record.id, record.status
        )));
    }
    let Some(next) = record.review_stage.next() else {
        return Err(ReviewError::InvalidState(format!(
            "record {} is pending but already completed its stages",
            record.id
        )));
    };

    if decision == Decision::Reject && note.trim().is_empty() {
        return Err(ReviewError::Validation(
            "a rejection must explain itself in a note".into(),
        ));
    }

    let concluded = record.review_stage;
    let mut updated = record.clone();
    match decision {
        Decision::Advance => {
            updated.review_stage = next;
            if next == ReviewStage::Completed {
                updated.status = ReviewStatus::Approved;
            }
        }
        _ => updated.status = ReviewStatus::Rejected,
    }
    append(&mut updated, concluded.into(), decision, reviewer, note);
    Ok(updated)
}

/// Admin override: sends an approved or rejected record back to stage1.
pub fn reopen(record: &Record, actor: &str, note: &str) -> Result<Record> {
    check_override(record, Decision::Reopen, actor, note)?;

    let mut updated = record.clone();
    updated.status = ReviewStatus::Pending;
    updated.review_stage = ReviewStage::Stage1;
    append(&mut updated, TrailStage::Override, Decision::Reopen, actor, note);
    Ok(updated)
}

/// Admin override: voids an approved or rejected record for good.
///
/// The stage is left where it was; it no longer means anything.
pub fn cancel(record: &Record, actor: &str, note: &str) -> Result<Record> {
    check_override(record, Decision::Cancel, actor, note)?;

    let mut updated = record.clone();
    updated.status = ReviewStatus::Cancelled;
    append(&mut updated, TrailStage::Override, Decision::Cancel, actor, note);
    Ok(updated)
}

/// Submitter amendment: replaces the payload of a pending, self-submitted
/// record and restarts review at stage1.
pub fn revise(record: &Record, submitter: &str, payload: Payload, note: &str) -> Result<Record> {
    require_actor(submitter)?;
    check_own_pending_submission(record, submitter, "revise")?;
    if payload.kind() != record.kind() {
        return Err(ReviewError::Validation(format!(
            "cannot turn a {} record into a {} record",
            record.kind().as_str(),
            payload.kind().as_str()
        )));
    }
    payload
        .validate()
        .map_err(|e| ReviewError::Validation(e.to_string()))?;

    let concluded = record.review_stage;
    let mut updated = record.clone();
    updated.payload = payload;
    updated.review_stage = ReviewStage::Stage1;
    append(&mut updated, concluded.into(), Decision::Revise, submitter, note);
    Ok(updated)
}

/// Checks that a submitter may withdraw (delete) their record.
///
/// Only pending, self-submitted records nobody has ruled on yet qualify.
pub fn check_withdraw(record: &Record, submitter: &str) -> Result<()> {
    check_own_pending_submission(record, submitter, "withdraw")?;
    if record.has_review_decisions() {
        return Err(ReviewError::InvalidState(format!(
            "record {} already has review decisions and can no longer be withdrawn",
            record.id
        )));
    }
    Ok(())
}

fn check_override(record: &Record, decision: Decision, actor: &str, note: &str) -> Result<()> {
    require_actor(actor)?;
    if !record.status.is_overridable() {
        return Err(ReviewError::InvalidState(format!(
            "cannot {decision} record {}: overrides apply only to approved or rejected records, it is {}",
            record.id, record.status
        )));
    }
    if note.trim().is_empty() {
        return Err(ReviewError::Validation(format!(
            "an override ({decision}) requires a justification note"
        )));
    }
    Ok(())
}

fn check_own_pending_submission(record: &Record, submitter: &str, verb: &str) -> Result<()> {
    if record.status != ReviewStatus::Pending || record.submitted_via != SubmitChannel::Student {
        return Err(ReviewError::InvalidState(format!(
            "only pending student submissions may {verb}; record {} is {} via {}",
            record.id,
            record.status,
            record.submitted_via.as_str()
        )));
    }
    if record.subject_id != submitter {
        return Err(ReviewError::Validation(format!(
            "record {} belongs to {}, not {submitter}",
            record.id, record.subject_id
        )));
    }
    Ok(())
}

fn require_actor(actor: &str) -> Result<()> {
    if actor.trim().is_empty() {
        return Err(ReviewError::Validation(
            "the acting reviewer must be identified".into(),
        ));
    }
    Ok(())
}

/// Appends one event and stamps `updated_at` with the event's time.
fn append(record: &mut Record, stage: TrailStage, decision: Decision, actor: &str, note: &str) {
    let now = Timestamp::now();
    record.review_trail.push(ReviewEvent {
        stage,
        decision,
        reviewer: actor.to_string(),
        note: note.to_string(),
        timestamp: now,
    });
    record.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use crate::model::{ApplicationPayload, VolunteerPayload};

    fn volunteer_payload(activity: &str, hours: f64) -> Payload {
        Payload::Volunteer(VolunteerPayload {
            student_name: "李华".into(),
            student_number: Some("2021001".into()),
            activity: activity.into(),
            hours,
            proof: None,
            require_ocr: false,
            project: None,
        })
    }

    fn sample_record() -> Record {
        create_record(
            "lihua@example.com",
            volunteer_payload("社区图书整理", 6.0),
            SubmitChannel::Student,
        )
        .unwrap()
    }

    fn advanced(times: usize) -> Record {
        let mut record = sample_record();
        for _ in 0..times {
            record = decide(&record, Decision::Advance, "张老师", "").unwrap();
        }
        record
    }

    #[test]
    fn new_record_is_pending_at_stage1() {
        let record = sample_record();
        assert_eq!(record.status, ReviewStatus::Pending);
        assert_eq!(record.review_stage, ReviewStage::Stage1);
        assert!(record.review_trail.is_empty());
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn empty_subject_is_rejected() {
        let err = create_record(" ", volunteer_payload("x", 1.0), SubmitChannel::Student)
            .unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));
    }

    #[test]
    fn volunteer_passes_three_stages() {
        let record = sample_record();
        let r1 = decide(&record, Decision::Advance, "张老师", "资料完整").unwrap();
        let r2 = decide(&r1, Decision::Advance, "李老师", "符合政策").unwrap();
        let r3 = decide(&r2, Decision::Advance, "王老师", "通过终审").unwrap();

        assert_eq!(r3.status, ReviewStatus::Approved);
        assert_eq!(r3.review_stage, ReviewStage::Completed);
        assert_eq!(r3.review_trail.len(), 3);

        let stages: Vec<_> = r3.review_trail.iter().map(|e| e.stage).collect();
        assert_eq!(
            stages,
            [TrailStage::Stage1, TrailStage::Stage2, TrailStage::Stage3]
        );
        assert_eq!(r3.review_trail[2].reviewer, "王老师");
        assert_eq!(r3.latest_note(), Some("通过终审"));
    }

    #[test]
    fn reject_at_stage2_freezes_stage() {
        let stage2 = advanced(1);
        assert_eq!(stage2.review_stage, ReviewStage::Stage2);

        let rejected = decide(&stage2, Decision::Reject, "审核老师", "材料不完整").unwrap();

        assert_eq!(rejected.status, ReviewStatus::Rejected);
        assert_eq!(rejected.review_stage, ReviewStage::Stage2);
        assert_eq!(rejected.review_trail.last().unwrap().stage, TrailStage::Stage2);
        assert_eq!(rejected.review_trail.last().unwrap().decision, Decision::Reject);
    }

    #[test]
    fn reject_requires_note() {
        let record = sample_record();
        let err = decide(&record, Decision::Reject, "张老师", "   ").unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));
    }

    #[test]
    fn decide_on_terminal_record_fails() {
        let rejected = decide(&sample_record(), Decision::Reject, "张老师", "不符合").unwrap();
        for decision in [Decision::Advance, Decision::Reject] {
            let err = decide(&rejected, decision, "张老师", "再审").unwrap_err();
            assert!(matches!(err, ReviewError::InvalidState(_)));
        }
    }

    #[test]
    fn decide_refuses_override_decisions() {
        let err = decide(&sample_record(), Decision::Reopen, "张老师", "x").unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));
    }

    #[test]
    fn decide_requires_reviewer() {
        let err = decide(&sample_record(), Decision::Advance, "", "").unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));
    }

    #[test]
    fn reopen_after_rejection_restarts_pipeline() {
        let stage2 = advanced(1);
        let rejected = decide(&stage2, Decision::Reject, "审核老师", "材料不完整").unwrap();
        let reopened = reopen(&rejected, "admin", "补充材料后重审").unwrap();

        assert_eq!(reopened.status, ReviewStatus::Pending);
        assert_eq!(reopened.review_stage, ReviewStage::Stage1);
        assert_eq!(reopened.review_trail.len(), 3);
        assert_eq!(reopened.corrections().count(), 1);

        let again = decide(&reopened, Decision::Advance, "张老师", "").unwrap();
        assert_eq!(again.review_stage, ReviewStage::Stage2);
        assert_eq!(again.review_trail.last().unwrap().stage, TrailStage::Stage1);
    }

    #[test]
    fn cancel_keeps_stage_and_is_final() {
        let approved = advanced(3);
        let cancelled = cancel(&approved, "admin", "材料造假").unwrap();

        assert_eq!(cancelled.status, ReviewStatus::Cancelled);
        assert_eq!(cancelled.review_stage, ReviewStage::Completed);

        let last = cancelled.review_trail.last().unwrap();
        assert_eq!(last.stage, TrailStage::Override);
        assert_eq!(last.decision, Decision::Cancel);

        assert!(matches!(
            reopen(&cancelled, "admin", "撤回作废").unwrap_err(),
            ReviewError::InvalidState(_)
        ));
    }

    #[test]
    fn overrides_require_note() {
        let approved = advanced(3);
        assert!(matches!(
            reopen(&approved, "admin", "").unwrap_err(),
            ReviewError::Validation(_)
        ));
        assert!(matches!(
            cancel(&approved, "admin", " ").unwrap_err(),
            ReviewError::Validation(_)
        ));
    }

    #[test]
    fn override_on_pending_fails() {
        let record = advanced(1);
        assert!(matches!(
            reopen(&record, "admin", "复核").unwrap_err(),
            ReviewError::InvalidState(_)
        ));
        assert!(matches!(
            cancel(&record, "admin", "作废").unwrap_err(),
            ReviewError::InvalidState(_)
        ));
    }

    #[test]
    fn override_state_is_checked_before_note() {
        let pending = advanced(1);
        assert!(matches!(
            reopen(&pending, "admin", "").unwrap_err(),
            ReviewError::InvalidState(_)
        ));

        let cancelled = cancel(&advanced(3), "admin", "材料造假").unwrap();
        assert!(matches!(
            reopen(&cancelled, "admin", " ").unwrap_err(),
            ReviewError::InvalidState(_)
        ));
        assert!(matches!(
            cancel(&cancelled, "admin", "").unwrap_err(),
            ReviewError::InvalidState(_)
        ));
    }

    #[test]
    fn revise_resets_to_stage1_and_keeps_trail() {
        let record = advanced(2);
        let revised = revise(
            &record,
            "lihua@example.com",
            volunteer_payload("社区图书整理", 8.0),
            "补充时长",
        )
        .unwrap();

        assert_eq!(revised.review_stage, ReviewStage::Stage1);
        assert_eq!(revised.status, ReviewStatus::Pending);
        assert_eq!(revised.review_trail.len(), 3);
        assert_eq!(revised.review_trail[..2], record.review_trail[..]);

        let last = revised.review_trail.last().unwrap();
        assert_eq!(last.decision, Decision::Revise);
        assert_eq!(last.stage, TrailStage::Stage3);
    }

    #[test]
    fn revise_rejects_other_students_and_kind_changes() {
        let record = sample_record();
        assert!(
            revise(&record, "someone@example.com", volunteer_payload("x", 1.0), "").is_err()
        );

        let application = Payload::Application(ApplicationPayload {
            student_name: "李华".into(),
            title: "挑战杯".into(),
            category: "competition".into(),
            points: 2.0,
            proof: None,
        });
        assert!(matches!(
            revise(&record, "lihua@example.com", application, "").unwrap_err(),
            ReviewError::Validation(_)
        ));
    }

    #[test]
    fn teacher_entered_records_cannot_be_revised() {
        let record = create_record(
            "lihua@example.com",
            volunteer_payload("实验室志愿", 3.0),
            SubmitChannel::Teacher,
        )
        .unwrap();
        assert!(matches!(
            revise(&record, "lihua@example.com", volunteer_payload("x", 1.0), "").unwrap_err(),
            ReviewError::InvalidState(_)
        ));
    }

    #[test]
    fn withdraw_only_before_any_decision() {
        let record = sample_record();
        assert!(check_withdraw(&record, "lihua@example.com").is_ok());

        let decided = advanced(1);
        assert!(matches!(
            check_withdraw(&decided, "lihua@example.com").unwrap_err(),
            ReviewError::InvalidState(_)
        ));
    }

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Advance,
        Reject,
        Reopen,
        Cancel,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            3 => Just(Step::Advance),
            1 => Just(Step::Reject),
            1 => Just(Step::Reopen),
            1 => Just(Step::Cancel),
        ]
    }

    fn apply(record: &Record, step: Step) -> Result<Record> {
        match step {
            Step::Advance => decide(record, Decision::Advance, "张老师", ""),
            Step::Reject => decide(record, Decision::Reject, "张老师", "不符合"),
            Step::Reopen => reopen(record, "admin", "复核"),
            Step::Cancel => cancel(record, "admin", "作废"),
        }
    }

    proptest! {
        #[test]
        fn advances_visit_stages_in_order(n in 0usize..6) {
            let mut record = sample_record();
            let mut seen = vec![record.review_stage];
            for _ in 0..n {
                match decide(&record, Decision::Advance, "张老师", "") {
                    Ok(next) => {
                        record = next;
                        seen.push(record.review_stage);
                    }
                    Err(e) => {
                        prop_assert!(matches!(e, ReviewError::InvalidState(_)));
                        break;
                    }
                }
            }
            let expected = [
                ReviewStage::Stage1,
                ReviewStage::Stage2,
                ReviewStage::Stage3,
                ReviewStage::Completed,
            ];
            prop_assert_eq!(&seen[..], &expected[..seen.len()]);
        }

        #[test]
        fn reject_freezes_any_pending_stage(n in 0usize..3) {
            let record = advanced(n);
            let stage = record.review_stage;
            let rejected = decide(&record, Decision::Reject, "张老师", "不符合").unwrap();
            prop_assert_eq!(rejected.status, ReviewStatus::Rejected);
            prop_assert_eq!(rejected.review_stage, stage);
            prop_assert!(decide(&rejected, Decision::Advance, "张老师", "").is_err());
        }

        #[test]
        fn trail_is_append_only(steps in proptest::collection::vec(step(), 0..30)) {
            let mut record = sample_record();
            for s in steps {
                let before = record.review_trail.clone();
                match apply(&record, s) {
                    Ok(next) => {
                        prop_assert_eq!(next.review_trail.len(), before.len() + 1);
                        prop_assert_eq!(&next.review_trail[..before.len()], &before[..]);
                        record = next;
                    }
                    Err(_) => prop_assert_eq!(&record.review_trail, &before),
                }
            }
        }

        #[test]
        fn overrides_follow_status(
            steps in proptest::collection::vec(step(), 0..20),
            note in prop_oneof![Just(""), Just("复核")],
        ) {
            let mut record = sample_record();
            for s in steps {
                if let Ok(next) = apply(&record, s) {
                    record = next;
                }
                let reopened = reopen(&record, "admin", note);
                let cancelled = cancel(&record, "admin", note);
                if record.status.is_overridable() && note.is_empty() {
                    prop_assert!(matches!(reopened, Err(ReviewError::Validation(_))));
                    prop_assert!(matches!(cancelled, Err(ReviewError::Validation(_))));
                } else if record.status.is_overridable() {
                    let reopened = reopened.unwrap();
                    prop_assert_eq!(reopened.status, ReviewStatus::Pending);
                    prop_assert_eq!(reopened.review_stage, ReviewStage::Stage1);
                    prop_assert_eq!(cancelled.unwrap().status, ReviewStatus::Cancelled);
                } else {
                    prop_assert!(matches!(reopened, Err(ReviewError::InvalidState(_))));
                    prop_assert!(matches!(cancelled, Err(ReviewError::InvalidState(_))));
                }
            }
        }
    }
}
