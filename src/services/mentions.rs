//! `@username` mentions in candidate comments.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use super::{new_id, timestamp};
use crate::auth::Actor;
use crate::errors::AppError;
use crate::models::{Comment, Mention, User};
use crate::store::{
    decode_record, decode_records, DocumentRepository, DocumentStore, RecordStore, StoreError,
};

pub const MENTIONS_DOCUMENT: &str = "mentions.json";

fn is_username_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Distinct `@username` tokens in `text`, in order of appearance.
///
/// An `@` inside a word (an e-mail address) is not a mention.
pub fn parse_mentions(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut previous: Option<char> = None;

    for (i, c) in text.char_indices() {
        if c == '@' && !previous.is_some_and(is_username_char) {
            let rest = &text[i + c.len_utf8()..];
            let end = rest
                .find(|ch: char| !is_username_char(ch))
                .unwrap_or(rest.len());
            let name = rest[..end].trim_end_matches(['.', '-']);
            if !name.is_empty() && !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                names.push(name.to_string());
            }
        }
        previous = Some(c);
    }

    names
}

pub struct MentionService {
    repo: DocumentRepository<Value>,
    users: Arc<dyn RecordStore<User>>,
}

impl MentionService {
    pub fn new(store: Arc<dyn DocumentStore>, users: Arc<dyn RecordStore<User>>) -> Self {
        Self {
            repo: DocumentRepository::new(store, MENTIONS_DOCUMENT),
            users,
        }
    }

    /// Store one mention per active user tagged in `comment`.
    pub async fn record_for_comment(
        &self,
        candidate_id: &str,
        comment: &Comment,
        author: &Actor,
    ) -> Result<Vec<Mention>, StoreError> {
        let names = parse_mentions(&comment.text);
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let users = self.users.list().await?;
        let now = timestamp(Utc::now());
        let mut created: Vec<Mention> = Vec::new();
        for name in &names {
            let Some(user) = users
                .iter()
                .find(|u| u.active && u.username.eq_ignore_ascii_case(name))
            else {
                continue;
            };
            if user.id == author.id || created.iter().any(|m| m.mentioned_user_id == user.id) {
                continue;
            }
            created.push(Mention {
                id: new_id(),
                candidate_id: candidate_id.to_string(),
                comment_id: comment.id.clone(),
                mentioned_user_id: user.id.clone(),
                mentioned_by: author.username.clone(),
                created_at: now.clone(),
                read: false,
                extra: serde_json::Map::new(),
            });
        }

        if created.is_empty() {
            return Ok(created);
        }

        let encoded = serde_json::to_value(&created)
            .map_err(|e| StoreError::Rejected(format!("cannot encode mentions: {}", e)))?;
        let Value::Array(encoded) = encoded else {
            return Err(StoreError::Rejected("mentions did not encode as an array".to_string()));
        };

        let (mut mentions, token) = self.repo.load().await?;
        mentions.extend(encoded);
        let message = format!("Add mentions for comment {}", comment.id);
        self.repo.save(&mentions, token.as_ref(), &message).await?;

        tracing::debug!(
            candidate_id,
            count = created.len(),
            "Recorded mentions"
        );
        Ok(created)
    }

    /// Mentions of `user`, newest first.
    pub async fn list_for(&self, user: &Actor, unread_only: bool) -> Result<Vec<Mention>, AppError> {
        let mentions: Vec<Mention> =
            decode_records(self.repo.path(), self.repo.snapshot().await?);
        Ok(mentions
            .into_iter()
            .rev()
            .filter(|m| m.mentioned_user_id == user.id)
            .filter(|m| !unread_only || !m.read)
            .collect())
    }

    /// Mark a mention read. Only the mentioned user may do so.
    pub async fn mark_read(&self, user: &Actor, mention_id: &str) -> Result<Mention, AppError> {
        let (mut mentions, token) = self.repo.load().await?;
        let slot = mentions
            .iter_mut()
            .find(|m| m.get("id").and_then(Value::as_str) == Some(mention_id))
            .ok_or_else(|| AppError::NotFound(format!("Mention {} not found", mention_id)))?;
        let mut mention: Mention = decode_record(self.repo.path(), slot.clone())?;

        if mention.mentioned_user_id != user.id {
            return Err(AppError::AccessDenied(
                "Only the mentioned user may mark a mention read".to_string(),
            ));
        }
        if mention.read {
            return Ok(mention);
        }

        mention.read = true;
        slot["read"] = Value::Bool(true);

        let message = format!("Update mention {}", mention_id);
        self.repo.save(&mentions, token.as_ref(), &message).await?;
        Ok(mention)
    }
}
