//! Background tasks: candidate polling, reminder alerts and realtime reconciliation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::db::{ChangeFeed, Table};
use crate::services::{CandidateService, ReminderService};

/// Re-list candidates every `period`, refreshing the cache and the search index.
pub fn spawn_candidate_poll(candidates: Arc<CandidateService>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; startup already indexed.
        interval.tick().await;

        loop {
            interval.tick().await;
            match candidates.refresh().await {
                Ok(count) => tracing::debug!(count, "Candidate poll completed"),
                Err(e) => tracing::warn!("Candidate poll failed: {}", e),
            }
        }
    })
}

/// Recompute due reminders every `period` and log them.
pub fn spawn_reminder_check(reminders: Arc<ReminderService>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match reminders.due_alerts(Utc::now()).await {
                Ok(alerts) if alerts.is_empty() => tracing::debug!("No reminders due"),
                Ok(alerts) => {
                    for alert in &alerts {
                        tracing::info!(
                            candidate_id = %alert.candidate_id,
                            reminder_id = %alert.reminder.id,
                            priority = alert.reminder.priority.as_str(),
                            due_date = %alert.reminder.due_date,
                            "Reminder due: {}",
                            alert.reminder.title
                        );
                    }
                }
                Err(e) => tracing::warn!("Reminder check failed: {}", e),
            }
        }
    })
}

/// Reconcile candidates after committed relational changes.
///
/// Comment and reminder events carry the owning candidate's id.
pub fn spawn_change_listener(
    changes: &ChangeFeed,
    candidates: Arc<CandidateService>,
) -> JoinHandle<()> {
    changes.on_change(
        &[Table::Candidates, Table::Comments, Table::Reminders],
        move |event| {
            tracing::debug!(
                table = ?event.table,
                kind = ?event.kind,
                record_id = %event.record_id,
                "Change received"
            );
            let candidates = Arc::clone(&candidates);
            tokio::spawn(async move {
                candidates.reconcile(&event.record_id).await;
            });
        },
    )
}
