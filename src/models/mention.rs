//! Mention model: a user tagged with `@username` in a candidate comment.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Mention {
    pub id: String,
    pub candidate_id: String,
    pub comment_id: String,
    pub mentioned_user_id: String,
    pub mentioned_by: String,
    pub created_at: String,
    #[serde(default)]
    pub read: bool,
    /// Fields written by other clients.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentionQuery {
    #[serde(default)]
    pub unread_only: bool,
}
