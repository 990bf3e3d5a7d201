//! Candidate API endpoints, including the comment thread and reminder set.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{created, success, ApiResult};
use crate::auth::Actor;
use crate::models::{
    Candidate, CandidateFilter, Comment, CommentRequest, CreateCandidateRequest,
    CreateReminderRequest, Reminder, StatusChangeRequest, UpdateCandidateRequest,
    UpdateReminderRequest,
};
use crate::AppState;

/// GET /api/candidates - List candidates, optionally filtered by status or position.
pub async fn list_candidates(
    State(state): State<AppState>,
    Query(filter): Query<CandidateFilter>,
) -> ApiResult<Vec<Candidate>> {
    success(state.candidates.list(&filter).await?)
}

/// GET /api/candidates/{id} - Get a single candidate.
pub async fn get_candidate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Candidate> {
    success(state.candidates.get(&id).await?)
}

/// POST /api/candidates - Create a new candidate.
pub async fn create_candidate(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateCandidateRequest>,
) -> ApiResult<Candidate> {
    created(state.candidates.create(&actor, &request).await?)
}

/// PUT /api/candidates/{id} - Update candidate fields.
pub async fn update_candidate(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(request): Json<UpdateCandidateRequest>,
) -> ApiResult<Candidate> {
    success(state.candidates.update(&actor, &id, &request).await?)
}

/// DELETE /api/candidates/{id} - Delete a candidate.
pub async fn delete_candidate(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.candidates.delete(&actor, &id).await?;
    success(())
}

/// PUT /api/candidates/{id}/status - Move a candidate to another pipeline state.
pub async fn change_candidate_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(request): Json<StatusChangeRequest>,
) -> ApiResult<Candidate> {
    success(state.candidates.change_status(&actor, &id, &request).await?)
}

/// POST /api/candidates/{id}/comments - Add a comment.
pub async fn add_comment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(request): Json<CommentRequest>,
) -> ApiResult<Comment> {
    created(state.candidates.add_comment(&actor, &id, &request).await?)
}

/// PUT /api/candidates/{id}/comments/{comment_id} - Edit a comment.
pub async fn edit_comment(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, comment_id)): Path<(String, String)>,
    Json(request): Json<CommentRequest>,
) -> ApiResult<Comment> {
    success(
        state
            .candidates
            .edit_comment(&actor, &id, &comment_id, &request)
            .await?,
    )
}

/// DELETE /api/candidates/{id}/comments/{comment_id} - Delete a comment.
pub async fn delete_comment(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, comment_id)): Path<(String, String)>,
) -> ApiResult<()> {
    state
        .candidates
        .delete_comment(&actor, &id, &comment_id)
        .await?;
    success(())
}

/// POST /api/candidates/{id}/reminders - Add a reminder.
pub async fn add_reminder(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(request): Json<CreateReminderRequest>,
) -> ApiResult<Reminder> {
    created(state.candidates.add_reminder(&actor, &id, &request).await?)
}

/// PUT /api/candidates/{id}/reminders/{reminder_id} - Update or complete a reminder.
pub async fn update_reminder(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, reminder_id)): Path<(String, String)>,
    Json(request): Json<UpdateReminderRequest>,
) -> ApiResult<Reminder> {
    success(
        state
            .candidates
            .update_reminder(&actor, &id, &reminder_id, &request)
            .await?,
    )
}

/// DELETE /api/candidates/{id}/reminders/{reminder_id} - Delete a reminder.
pub async fn delete_reminder(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, reminder_id)): Path<(String, String)>,
) -> ApiResult<()> {
    state
        .candidates
        .delete_reminder(&actor, &id, &reminder_id)
        .await?;
    success(())
}

/// GET /api/export - Export all candidates. Audited.
pub async fn export_candidates(
    State(state): State<AppState>,
    actor: Actor,
) -> ApiResult<Vec<Candidate>> {
    success(state.candidates.export(&actor).await?)
}
