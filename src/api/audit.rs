//! Audit log endpoint.

use axum::extract::{Query, State};

use super::{success, ApiResult};
use crate::auth::Actor;
use crate::models::{AuditLogEntry, AuditLogQuery};
use crate::AppState;

/// GET /api/audit-logs - Read the audit log, newest first.
///
/// Only the configured reader role gets through; everyone else receives 403.
pub async fn list_audit_logs(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<AuditLogQuery>,
) -> ApiResult<Vec<AuditLogEntry>> {
    success(state.audit.read(&actor, &query).await?)
}
