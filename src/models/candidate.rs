//! Candidate model matching the dashboard's Candidate interface.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::store::Record;

/// Pipeline state of a candidate. Every state is reachable from every other.
///
/// Other clients may write states this backend does not know; those are kept
/// verbatim in [`CandidateStatus::Unrecognized`] and written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CandidateStatus {
    Received,
    UnderReview,
    InterviewRequested,
    FirstExam,
    SecondExam,
    InterviewApproved,
    Probation,
    ProbationApproved,
    BadgePending,
    Rejected,
    Unrecognized(String),
}

impl CandidateStatus {
    /// All states in kanban column order.
    pub const ALL: [CandidateStatus; 10] = [
        CandidateStatus::Received,
        CandidateStatus::UnderReview,
        CandidateStatus::InterviewRequested,
        CandidateStatus::FirstExam,
        CandidateStatus::SecondExam,
        CandidateStatus::InterviewApproved,
        CandidateStatus::Probation,
        CandidateStatus::ProbationApproved,
        CandidateStatus::BadgePending,
        CandidateStatus::Rejected,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            CandidateStatus::Received => "received",
            CandidateStatus::UnderReview => "under_review",
            CandidateStatus::InterviewRequested => "interview_requested",
            CandidateStatus::FirstExam => "first_exam",
            CandidateStatus::SecondExam => "second_exam",
            CandidateStatus::InterviewApproved => "interview_approved",
            CandidateStatus::Probation => "probation",
            CandidateStatus::ProbationApproved => "probation_approved",
            CandidateStatus::BadgePending => "badge_pending",
            CandidateStatus::Rejected => "rejected",
            CandidateStatus::Unrecognized(raw) => raw,
        }
    }

    /// One of the known pipeline states, by wire name.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// Any wire value, keeping unknown ones as [`CandidateStatus::Unrecognized`].
    pub fn parse(s: &str) -> Self {
        Self::from_str(s).unwrap_or_else(|| CandidateStatus::Unrecognized(s.to_string()))
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, CandidateStatus::Unrecognized(_))
    }

    pub fn label(&self) -> &str {
        match self {
            CandidateStatus::Received => "Received",
            CandidateStatus::UnderReview => "Under review",
            CandidateStatus::InterviewRequested => "Interview requested",
            CandidateStatus::FirstExam => "First exam",
            CandidateStatus::SecondExam => "Second exam",
            CandidateStatus::InterviewApproved => "Interview approved",
            CandidateStatus::Probation => "Probation",
            CandidateStatus::ProbationApproved => "Probation approved",
            CandidateStatus::BadgePending => "Badge pending",
            CandidateStatus::Rejected => "Rejected",
            CandidateStatus::Unrecognized(raw) => raw,
        }
    }

    /// States in which the candidate has a start date on the job.
    pub fn tracks_start_date(&self) -> bool {
        matches!(
            self,
            CandidateStatus::Probation
                | CandidateStatus::ProbationApproved
                | CandidateStatus::BadgePending
        )
    }
}

impl Serialize for CandidateStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CandidateStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(CandidateStatus::parse(&raw))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommentType {
    #[default]
    General,
    StatusChange,
}

/// A comment embedded in a candidate's thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub author: String,
    #[serde(rename = "type", default)]
    pub comment_type: CommentType,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReminderPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl ReminderPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderPriority::Low => "low",
            ReminderPriority::Medium => "medium",
            ReminderPriority::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(ReminderPriority::Low),
            "medium" => Some(ReminderPriority::Medium),
            "high" => Some(ReminderPriority::High),
            _ => None,
        }
    }
}

/// A reminder attached to a candidate, either entered by hand or synthesized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub due_date: String,
    #[serde(default)]
    pub priority: ReminderPriority,
    #[serde(default)]
    pub completed: bool,
    pub created_by: String,
    pub created_at: String,
    /// Synthesized from candidate state, never persisted.
    #[serde(default)]
    pub automatic: bool,
}

/// A job applicant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default = "received")]
    pub status: CandidateStatus,
    #[serde(default)]
    pub applied_at: String,
    /// Calendar date (YYYY-MM-DD) the candidate started on the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub reminders: Vec<Reminder>,
    #[serde(default)]
    pub last_update: String,
    #[serde(default)]
    pub updated_by: String,
    /// Fields written by other clients, kept across rewrites.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn received() -> CandidateStatus {
    CandidateStatus::Received
}

impl Candidate {
    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
            .as_deref()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    }
}

impl Record for Candidate {
    const KIND: &'static str = "candidate";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Request body for creating a candidate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCandidateRequest {
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub status: Option<CandidateStatus>,
    #[serde(default)]
    pub applied_at: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Request body for a partial candidate update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCandidateRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Request body for moving a candidate through the pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeRequest {
    pub status: CandidateStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    pub text: String,
    #[serde(default)]
    pub comment_type: Option<CommentType>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReminderRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub due_date: String,
    #[serde(default)]
    pub priority: Option<ReminderPriority>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReminderRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub priority: Option<ReminderPriority>,
    #[serde(default)]
    pub completed: Option<bool>,
}

/// Query filter for candidate listings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateFilter {
    #[serde(default)]
    pub status: Option<CandidateStatus>,
    #[serde(default)]
    pub position: Option<String>,
}

impl CandidateFilter {
    pub fn matches(&self, candidate: &Candidate) -> bool {
        let status_ok = self.status.as_ref().map_or(true, |s| candidate.status == *s);
        let position_ok = self.position.as_deref().map_or(true, |wanted| {
            candidate
                .position
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(wanted))
        });
        status_ok && position_ok
    }
}
