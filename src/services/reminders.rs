//! Reminders across all candidates, manual and synthesized.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::candidates::parse_due_date;
use super::{synthetic_reminders, CandidateService};
use crate::errors::AppError;
use crate::models::{Candidate, CandidateFilter, Reminder};

/// A reminder together with the candidate it belongs to.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateReminder {
    pub candidate_id: String,
    pub candidate_name: String,
    #[serde(flatten)]
    pub reminder: Reminder,
}

impl CandidateReminder {
    fn new(candidate: &Candidate, reminder: Reminder) -> Self {
        Self {
            candidate_id: candidate.id.clone(),
            candidate_name: candidate.full_name.clone(),
            reminder,
        }
    }
}

pub struct ReminderService {
    candidates: Arc<CandidateService>,
}

impl ReminderService {
    pub fn new(candidates: Arc<CandidateService>) -> Self {
        Self { candidates }
    }

    /// Every stored reminder plus the synthetic exam reminders as of `now`.
    pub async fn all(&self, now: DateTime<Utc>) -> Result<Vec<CandidateReminder>, AppError> {
        let candidates = self.candidates.list(&CandidateFilter::default()).await?;
        Ok(collect(&candidates, now, |_| true))
    }

    /// Open reminders due by `now` and all synthetic ones, most urgent first.
    pub async fn due_alerts(&self, now: DateTime<Utc>) -> Result<Vec<CandidateReminder>, AppError> {
        let candidates = self.candidates.list(&CandidateFilter::default()).await?;
        Ok(due_alerts(&candidates, now))
    }
}

fn collect<F>(candidates: &[Candidate], now: DateTime<Utc>, keep: F) -> Vec<CandidateReminder>
where
    F: Fn(&Reminder) -> bool,
{
    let mut reminders = Vec::new();
    for candidate in candidates {
        reminders.extend(
            candidate
                .reminders
                .iter()
                .filter(|&r| !r.automatic && keep(r))
                .map(|r| CandidateReminder::new(candidate, r.clone())),
        );
        reminders.extend(
            synthetic_reminders(candidate, now)
                .into_iter()
                .map(|r| CandidateReminder::new(candidate, r)),
        );
    }
    reminders
}

fn due_alerts(candidates: &[Candidate], now: DateTime<Utc>) -> Vec<CandidateReminder> {
    let today = now.date_naive();
    let mut alerts = collect(candidates, now, |r| {
        !r.completed && parse_due_date(&r.due_date).is_some_and(|due| due <= today)
    });

    alerts.sort_by(|a, b| {
        b.reminder
            .priority
            .cmp(&a.reminder.priority)
            .then_with(|| {
                parse_due_date(&a.reminder.due_date).cmp(&parse_due_date(&b.reminder.due_date))
            })
    });
    alerts
}
