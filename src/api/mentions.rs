//! Mention endpoints for the acting user.

use axum::extract::{Path, Query, State};

use super::{success, ApiResult};
use crate::auth::Actor;
use crate::models::{Mention, MentionQuery};
use crate::AppState;

/// GET /api/mentions - Mentions of the acting user, newest first.
pub async fn list_mentions(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<MentionQuery>,
) -> ApiResult<Vec<Mention>> {
    success(state.mentions.list_for(&actor, query.unread_only).await?)
}

/// PUT /api/mentions/{id}/read - Mark a mention read.
pub async fn mark_mention_read(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Mention> {
    success(state.mentions.mark_read(&actor, &id).await?)
}
