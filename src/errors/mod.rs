//! API errors and the `{ success: false, error }` envelope.
//!
//! Every failure a handler can return is an [`AppError`]; its variant picks
//! the HTTP status and the stable `code` clients switch on.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

/// Stable values of `error.code`.
pub mod codes {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const ACCESS_DENIED: &str = "ACCESS_DENIED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const CONCURRENCY_CONFLICT: &str = "CONCURRENCY_CONFLICT";
    pub const UPSTREAM_UNAVAILABLE: &str = "UPSTREAM_UNAVAILABLE";
    pub const UPSTREAM_UNAUTHORIZED: &str = "UPSTREAM_UNAUTHORIZED";
    pub const MALFORMED_DOCUMENT: &str = "MALFORMED_DOCUMENT";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const SEARCH_ERROR: &str = "SEARCH_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
}

#[derive(Debug)]
pub enum AppError {
    /// Missing or wrong PSK, unknown acting user, bad login
    Unauthorized(String),
    /// Authenticated, but the role may not do this
    AccessDenied(String),
    NotFound(String),
    /// Input failed a domain rule
    Validation(String),
    /// Stale concurrency token on a document write
    Conflict { message: String, path: String },
    /// Remote store unreachable or failing
    Upstream(String),
    /// Remote store refused our credential
    UpstreamUnauthorized(String),
    /// Remote document is not a JSON array
    MalformedDocument(String),
    Database(String),
    Search(String),
    /// Unparseable request body or query
    BadRequest(String),
}

impl AppError {
    fn classify(&self) -> (StatusCode, &'static str) {
        use AppError::*;
        match self {
            Unauthorized(_) => (StatusCode::UNAUTHORIZED, codes::UNAUTHORIZED),
            AccessDenied(_) => (StatusCode::FORBIDDEN, codes::ACCESS_DENIED),
            NotFound(_) => (StatusCode::NOT_FOUND, codes::NOT_FOUND),
            Validation(_) => (StatusCode::BAD_REQUEST, codes::VALIDATION_ERROR),
            Conflict { .. } => (StatusCode::CONFLICT, codes::CONCURRENCY_CONFLICT),
            Upstream(_) => (StatusCode::SERVICE_UNAVAILABLE, codes::UPSTREAM_UNAVAILABLE),
            UpstreamUnauthorized(_) => (StatusCode::BAD_GATEWAY, codes::UPSTREAM_UNAUTHORIZED),
            MalformedDocument(_) => (StatusCode::BAD_GATEWAY, codes::MALFORMED_DOCUMENT),
            Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, codes::DATABASE_ERROR),
            Search(_) => (StatusCode::INTERNAL_SERVER_ERROR, codes::SEARCH_ERROR),
            BadRequest(_) => (StatusCode::BAD_REQUEST, codes::BAD_REQUEST),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.classify().0
    }

    pub fn error_code(&self) -> &'static str {
        self.classify().1
    }

    /// Human-readable text for `error.message`.
    pub fn message(&self) -> &str {
        match self {
            AppError::Conflict { message, .. } => message,
            AppError::Unauthorized(msg)
            | AppError::AccessDenied(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Upstream(msg)
            | AppError::UpstreamUnauthorized(msg)
            | AppError::MalformedDocument(msg)
            | AppError::Database(msg)
            | AppError::Search(msg)
            | AppError::BadRequest(msg) => msg,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConcurrencyConflict { path } => AppError::Conflict {
                message: format!(
                    "{} changed since it was read; reload and repeat the change",
                    path
                ),
                path,
            },
            StoreError::RecordNotFound { id } => AppError::NotFound(format!("{} not found", id)),
            StoreError::Rejected(msg) => AppError::Validation(msg),
            StoreError::TransientFetch(msg) => {
                tracing::error!("Store unavailable: {}", msg);
                AppError::Upstream(msg)
            }
            StoreError::Authorization(msg) => {
                tracing::error!("Store credential rejected: {}", msg);
                AppError::UpstreamUnauthorized(msg)
            }
            err @ (StoreError::MalformedDocument { .. } | StoreError::UndecodableRecord { .. }) => {
                tracing::error!("{}", err);
                AppError::MalformedDocument(err.to_string())
            }
            StoreError::Database(msg) => AppError::Database(msg),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = ?err, "SQLite query failed");
        AppError::Database(format!("relational store: {err}"))
    }
}

impl From<tantivy::TantivyError> for AppError {
    fn from(err: tantivy::TantivyError) -> Self {
        tracing::error!(error = ?err, "Candidate index failed");
        AppError::Search(format!("candidate index: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::warn!(error = %err, "Rejecting unparseable JSON");
        AppError::BadRequest(format!("invalid JSON: {err}"))
    }
}

/// The `error` object of a failed response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

impl ErrorResponse {
    pub fn new(error: &AppError) -> Self {
        let details = match error {
            AppError::Conflict { path, .. } => Some(serde_json::json!({ "document": path })),
            _ => None,
        };

        let (_, code) = error.classify();
        Self {
            success: false,
            error: ErrorBody {
                code: code.to_owned(),
                message: error.message().to_owned(),
                details,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorResponse::new(&self))).into_response()
    }
}
