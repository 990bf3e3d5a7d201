//! Reminder overview and pipeline endpoints.

use axum::extract::State;
use chrono::Utc;

use super::{success, ApiResult};
use crate::services::{pipeline_stages, CandidateReminder, PipelineStage};
use crate::AppState;

/// GET /api/pipeline - Pipeline states in kanban order.
pub async fn get_pipeline() -> ApiResult<Vec<PipelineStage>> {
    success(pipeline_stages())
}

/// GET /api/reminders - All reminders, manual and synthetic.
pub async fn list_reminders(State(state): State<AppState>) -> ApiResult<Vec<CandidateReminder>> {
    success(state.reminders.all(Utc::now()).await?)
}

/// GET /api/reminders/due - Reminders needing attention, most urgent first.
pub async fn list_due_reminders(
    State(state): State<AppState>,
) -> ApiResult<Vec<CandidateReminder>> {
    success(state.reminders.due_alerts(Utc::now()).await?)
}
