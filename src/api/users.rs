//! User administration and login endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{created, success, ApiResult};
use crate::auth::Actor;
use crate::models::{CreateUserRequest, LoginRequest, UpdateUserRequest, UserProfile};
use crate::AppState;

/// POST /api/auth/login - Log in by username or email.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<UserProfile> {
    success(state.users.login(&request).await?)
}

/// GET /api/users - List all users. Admins only.
pub async fn list_users(State(state): State<AppState>, actor: Actor) -> ApiResult<Vec<UserProfile>> {
    success(state.users.list(&actor).await?)
}

/// GET /api/users/{id} - Get a single user. Admins, or the user themselves.
pub async fn get_user(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<UserProfile> {
    success(state.users.get(&actor, &id).await?)
}

/// POST /api/users - Create a user. Admins only.
pub async fn create_user(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<UserProfile> {
    created(state.users.create(&actor, &request).await?)
}

/// PUT /api/users/{id} - Update profile, role, status or password. Admins only.
pub async fn update_user(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<UserProfile> {
    success(state.users.update(&actor, &id, &request).await?)
}

/// DELETE /api/users/{id} - Delete a user. Admins only.
pub async fn delete_user(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.users.delete(&actor, &id).await?;
    success(())
}
