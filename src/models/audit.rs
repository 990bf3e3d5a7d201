//! Audit log model.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// What an audit entry records. Entries written by other clients may carry
/// actions outside this list; they are read back as `Unrecognized`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuditAction {
    Login,
    LoginFailed,
    UserCreated,
    UserUpdated,
    UserDeleted,
    CandidateCreated,
    CandidateUpdated,
    CandidateDeleted,
    StatusChanged,
    CommentAdded,
    DataExported,
    Unrecognized(String),
}

impl AuditAction {
    pub fn as_str(&self) -> &str {
        match self {
            AuditAction::Login => "login",
            AuditAction::LoginFailed => "login_failed",
            AuditAction::UserCreated => "user_created",
            AuditAction::UserUpdated => "user_updated",
            AuditAction::UserDeleted => "user_deleted",
            AuditAction::CandidateCreated => "candidate_created",
            AuditAction::CandidateUpdated => "candidate_updated",
            AuditAction::CandidateDeleted => "candidate_deleted",
            AuditAction::StatusChanged => "status_changed",
            AuditAction::CommentAdded => "comment_added",
            AuditAction::DataExported => "data_exported",
            AuditAction::Unrecognized(raw) => raw,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "login" => AuditAction::Login,
            "login_failed" => AuditAction::LoginFailed,
            "user_created" => AuditAction::UserCreated,
            "user_updated" => AuditAction::UserUpdated,
            "user_deleted" => AuditAction::UserDeleted,
            "candidate_created" => AuditAction::CandidateCreated,
            "candidate_updated" => AuditAction::CandidateUpdated,
            "candidate_deleted" => AuditAction::CandidateDeleted,
            "status_changed" => AuditAction::StatusChanged,
            "comment_added" => AuditAction::CommentAdded,
            "data_exported" => AuditAction::DataExported,
            other => AuditAction::Unrecognized(other.to_string()),
        }
    }
}

impl Serialize for AuditAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AuditAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(AuditAction::parse(&raw))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

/// One structured audit event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub actor_id: String,
    #[serde(default)]
    pub actor_name: String,
    pub action: AuditAction,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
    #[serde(default)]
    pub severity: Severity,
    /// Fields written by other clients.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Query parameters for reading the audit log.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogQuery {
    #[serde(default)]
    pub action: Option<AuditAction>,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}
