//! Append-only audit log kept in one document.
//!
//! Anyone authenticated may append. Reading is limited to a single role.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use super::{new_id, timestamp};
use crate::auth::Actor;
use crate::errors::AppError;
use crate::models::{AuditAction, AuditLogEntry, AuditLogQuery, Severity};
use crate::store::{decode_records, DocumentRepository, DocumentStore, StoreError};

pub const AUDIT_LOG_DOCUMENT: &str = "audit_logs.json";

/// An audit event before it is stamped with id, time and actor.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    action: AuditAction,
    description: String,
    before: Option<Value>,
    after: Option<Value>,
    severity: Severity,
}

impl AuditEvent {
    pub fn new(action: AuditAction, description: impl Into<String>) -> Self {
        Self {
            action,
            description: description.into(),
            before: None,
            after: None,
            severity: Severity::Info,
        }
    }

    pub fn before(mut self, value: impl serde::Serialize) -> Self {
        self.before = serde_json::to_value(value).ok();
        self
    }

    pub fn after(mut self, value: impl serde::Serialize) -> Self {
        self.after = serde_json::to_value(value).ok();
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

pub struct AuditLogService {
    repo: DocumentRepository<Value>,
    reader_role: crate::models::Role,
    retention: usize,
}

impl AuditLogService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        reader_role: crate::models::Role,
        retention: usize,
    ) -> Self {
        Self {
            repo: DocumentRepository::new(store, AUDIT_LOG_DOCUMENT),
            reader_role,
            retention: retention.max(1),
        }
    }

    /// Append one entry, dropping the oldest beyond the retention cap.
    ///
    /// Existing entries are written back exactly as they were read.
    pub async fn record(&self, actor: &Actor, event: AuditEvent) -> Result<AuditLogEntry, StoreError> {
        let entry = AuditLogEntry {
            id: new_id(),
            timestamp: timestamp(Utc::now()),
            actor_id: actor.id.clone(),
            actor_name: actor.username.clone(),
            action: event.action,
            description: event.description,
            before: event.before,
            after: event.after,
            severity: event.severity,
            extra: serde_json::Map::new(),
        };
        let encoded = serde_json::to_value(&entry)
            .map_err(|e| StoreError::Rejected(format!("cannot encode audit entry: {}", e)))?;

        let (mut entries, token) = self.repo.load().await?;
        entries.push(encoded);
        if entries.len() > self.retention {
            let excess = entries.len() - self.retention;
            entries.drain(..excess);
            tracing::debug!(dropped = excess, "Audit log trimmed to retention cap");
        }

        let message = format!("Append audit log entry {}", entry.id);
        self.repo.save(&entries, token.as_ref(), &message).await?;
        Ok(entry)
    }

    /// Append without failing the caller; a lost entry is logged.
    pub async fn log(&self, actor: &Actor, event: AuditEvent) {
        let action = event.action.clone();
        if let Err(e) = self.record(actor, event).await {
            tracing::warn!(
                action = action.as_str(),
                actor = %actor.username,
                "Failed to append audit entry: {}",
                e
            );
        }
    }

    /// Entries newest first. Only the reader role gets past the gate.
    pub async fn read(
        &self,
        actor: &Actor,
        query: &AuditLogQuery,
    ) -> Result<Vec<AuditLogEntry>, AppError> {
        if actor.role != self.reader_role {
            return Err(AppError::AccessDenied(format!(
                "Audit logs are readable by role {} only",
                self.reader_role.as_str()
            )));
        }

        let entries: Vec<AuditLogEntry> =
            decode_records(self.repo.path(), self.repo.snapshot().await?);
        let filtered = entries
            .into_iter()
            .rev()
            .filter(|e| query.action.as_ref().map_or(true, |a| e.action == *a))
            .filter(|e| query.actor_id.as_deref().map_or(true, |id| e.actor_id == id));

        Ok(match query.limit {
            Some(limit) => filtered.take(limit).collect(),
            None => filtered.collect(),
        })
    }
}
