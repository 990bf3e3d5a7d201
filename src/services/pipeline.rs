//! Candidate status pipeline.
//!
//! Every state is reachable from every other; a transition never fails.
//! Exam reminders for candidates on probation are derived on read.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use super::{new_id, timestamp};
use crate::auth::Actor;
use crate::models::{Candidate, CandidateStatus, Comment, CommentType, Reminder, ReminderPriority};

/// Days on probation during which the first exam reminder shows.
const FIRST_EXAM_WINDOW: (i64, i64) = (40, 50);
const FIRST_EXAM_DUE: i64 = 45;
const SECOND_EXAM_WINDOW: (i64, i64) = (85, 95);
const SECOND_EXAM_DUE: i64 = 90;

/// A pipeline column for the kanban board.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStage {
    pub status: CandidateStatus,
    pub label: String,
    pub ordinal: usize,
    pub tracks_start_date: bool,
}

pub fn pipeline_stages() -> Vec<PipelineStage> {
    CandidateStatus::ALL
        .iter()
        .enumerate()
        .map(|(ordinal, status)| PipelineStage {
            status: status.clone(),
            label: status.label().to_string(),
            ordinal,
            tracks_start_date: status.tracks_start_date(),
        })
        .collect()
}

/// Move `candidate` to `target`. Returns the previous status.
///
/// An explicit `reason` is always recorded as a `status_change` comment.
/// Without one, a comment is generated only when the status actually changes.
pub fn apply_status_change(
    candidate: &mut Candidate,
    target: CandidateStatus,
    reason: Option<&str>,
    start_date: Option<NaiveDate>,
    actor: &Actor,
    now: DateTime<Utc>,
) -> CandidateStatus {
    let previous = std::mem::replace(&mut candidate.status, target);
    candidate.last_update = timestamp(now);
    candidate.updated_by = actor.username.clone();

    let text = match reason.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reason) => Some(reason.to_string()),
        None if previous != candidate.status => Some(format!(
            "Status changed from {} to {}",
            previous.label(),
            candidate.status.label()
        )),
        None => None,
    };

    if let Some(text) = text {
        candidate.comments.push(Comment {
            id: new_id(),
            text,
            author: actor.username.clone(),
            comment_type: CommentType::StatusChange,
            created_at: timestamp(now),
            edited_at: None,
        });
    }

    if let Some(date) = start_date {
        if candidate.status.tracks_start_date() {
            candidate.start_date = Some(date.format("%Y-%m-%d").to_string());
        }
    }

    previous
}

/// Exam reminders derived from a candidate's probation start date.
pub fn synthetic_reminders(candidate: &Candidate, now: DateTime<Utc>) -> Vec<Reminder> {
    if candidate.status != CandidateStatus::Probation {
        return Vec::new();
    }
    let Some(start) = candidate.start_date() else {
        return Vec::new();
    };

    let days = (now.date_naive() - start).num_days();
    let mut reminders = Vec::new();

    if (FIRST_EXAM_WINDOW.0..=FIRST_EXAM_WINDOW.1).contains(&days) {
        reminders.push(exam_reminder(
            candidate,
            "first-exam",
            "First exam due",
            start,
            FIRST_EXAM_DUE,
            days,
            now,
        ));
    }
    if (SECOND_EXAM_WINDOW.0..=SECOND_EXAM_WINDOW.1).contains(&days) {
        reminders.push(exam_reminder(
            candidate,
            "second-exam",
            "Second exam due",
            start,
            SECOND_EXAM_DUE,
            days,
            now,
        ));
    }

    reminders
}

fn exam_reminder(
    candidate: &Candidate,
    slug: &str,
    title: &str,
    start: NaiveDate,
    due_day: i64,
    days: i64,
    now: DateTime<Utc>,
) -> Reminder {
    let priority = if days >= due_day {
        ReminderPriority::High
    } else {
        ReminderPriority::Medium
    };

    Reminder {
        id: format!("auto-{}-{}", slug, candidate.id),
        title: title.to_string(),
        description: Some(format!(
            "{} started probation {} days ago",
            candidate.full_name, days
        )),
        due_date: (start + Duration::days(due_day))
            .format("%Y-%m-%d")
            .to_string(),
        priority,
        completed: false,
        created_by: "system".to_string(),
        created_at: timestamp(now),
        automatic: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn actor() -> Actor {
        Actor {
            id: "u1".into(),
            username: "maria".into(),
            role: crate::models::Role::Recruiter,
        }
    }

    fn candidate(status: &str, start_date: Option<NaiveDate>) -> Candidate {
        let mut value = json!({
            "id": "42",
            "fullName": "Ana Ruiz",
            "status": status,
            "appliedAt": "2024-01-10T09:00:00.000Z",
            "lastUpdate": "2024-01-10T09:00:00.000Z",
            "updatedBy": "jonas"
        });
        if let Some(date) = start_date {
            value["startDate"] = json!(date.format("%Y-%m-%d").to_string());
        }
        serde_json::from_value(value).unwrap()
    }

    fn days_ago(days: i64) -> Option<NaiveDate> {
        Some(now().date_naive() - Duration::days(days))
    }

    #[test]
    fn test_any_state_reaches_any_state() {
        for from in CandidateStatus::ALL {
            for to in CandidateStatus::ALL {
                let mut c = candidate(from.as_str(), None);
                let previous =
                    apply_status_change(&mut c, to.clone(), None, None, &actor(), now());
                assert_eq!(previous, from);
                assert_eq!(c.status, to);
            }
        }
    }

    #[test]
    fn test_legacy_status_moves_into_pipeline() {
        let mut c = candidate("hired", None);
        let previous = apply_status_change(
            &mut c,
            CandidateStatus::Received,
            None,
            None,
            &actor(),
            now(),
        );

        assert_eq!(previous, CandidateStatus::Unrecognized("hired".to_string()));
        assert_eq!(c.status, CandidateStatus::Received);
        assert_eq!(c.comments[0].text, "Status changed from hired to Received");
    }

    #[test]
    fn test_transition_stamps_and_comments() {
        let mut c = candidate("interview_approved", None);
        apply_status_change(
            &mut c,
            CandidateStatus::Probation,
            Some("Passed interview"),
            NaiveDate::from_ymd_opt(2024, 6, 3),
            &actor(),
            now(),
        );

        assert_eq!(c.last_update, "2024-06-01T12:00:00.000Z");
        assert_eq!(c.updated_by, "maria");
        assert_eq!(c.start_date.as_deref(), Some("2024-06-03"));
        assert_eq!(c.comments.len(), 1);
        assert_eq!(c.comments[0].text, "Passed interview");
        assert_eq!(c.comments[0].comment_type, CommentType::StatusChange);
    }

    #[test]
    fn test_start_date_ignored_outside_probation_states() {
        let mut c = candidate("received", None);
        apply_status_change(
            &mut c,
            CandidateStatus::FirstExam,
            None,
            NaiveDate::from_ymd_opt(2024, 6, 3),
            &actor(),
            now(),
        );
        assert!(c.start_date.is_none());
    }

    #[test]
    fn test_noop_transition_stamps_without_duplicate_comment() {
        let mut c = candidate("under_review", None);
        apply_status_change(&mut c, CandidateStatus::FirstExam, None, None, &actor(), now());
        assert_eq!(c.comments.len(), 1);

        let later = now() + Duration::hours(1);
        apply_status_change(&mut c, CandidateStatus::FirstExam, None, None, &actor(), later);
        assert_eq!(c.comments.len(), 1);
        assert_eq!(c.last_update, "2024-06-01T13:00:00.000Z");

        apply_status_change(
            &mut c,
            CandidateStatus::FirstExam,
            Some("Rescheduled"),
            None,
            &actor(),
            later,
        );
        assert_eq!(c.comments.len(), 2);
    }

    #[test]
    fn test_first_exam_reminder_priority_by_day() {
        let at_45 = synthetic_reminders(&candidate("probation", days_ago(45)), now());
        assert_eq!(at_45.len(), 1);
        assert_eq!(at_45[0].priority, ReminderPriority::High);
        assert_eq!(at_45[0].id, "auto-first-exam-42");
        assert!(at_45[0].automatic);

        let at_42 = synthetic_reminders(&candidate("probation", days_ago(42)), now());
        assert_eq!(at_42[0].priority, ReminderPriority::Medium);

        assert!(synthetic_reminders(&candidate("probation", days_ago(30)), now()).is_empty());
        assert!(synthetic_reminders(&candidate("probation", days_ago(51)), now()).is_empty());
        assert_eq!(
            synthetic_reminders(&candidate("probation", days_ago(40)), now()).len(),
            1
        );
        assert_eq!(
            synthetic_reminders(&candidate("probation", days_ago(50)), now()).len(),
            1
        );
    }

    #[test]
    fn test_second_exam_reminder_window() {
        let at_90 = synthetic_reminders(&candidate("probation", days_ago(90)), now());
        assert_eq!(at_90.len(), 1);
        assert_eq!(at_90[0].id, "auto-second-exam-42");
        assert_eq!(at_90[0].priority, ReminderPriority::High);

        let at_86 = synthetic_reminders(&candidate("probation", days_ago(86)), now());
        assert_eq!(at_86[0].priority, ReminderPriority::Medium);
        assert!(synthetic_reminders(&candidate("probation", days_ago(96)), now()).is_empty());
    }

    #[test]
    fn test_reminders_only_on_probation() {
        let c = candidate("probation_approved", days_ago(45));
        assert!(synthetic_reminders(&c, now()).is_empty());

        let c = candidate("probation", None);
        assert!(synthetic_reminders(&c, now()).is_empty());
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let c = candidate("probation", days_ago(45));
        assert_eq!(synthetic_reminders(&c, now()), synthetic_reminders(&c, now()));
    }

    #[test]
    fn test_pipeline_stages_in_column_order() {
        let stages = pipeline_stages();
        assert_eq!(stages.len(), 10);
        assert_eq!(stages[0].status, CandidateStatus::Received);
        assert_eq!(stages[9].status, CandidateStatus::Rejected);
        assert!(stages[6].tracks_start_date);
    }
}
