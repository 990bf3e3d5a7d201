//! Document store module.
//!
//! A document is a whole JSON file kept in a remote repository. Reads return
//! the content together with a [`ConcurrencyToken`]; writes replace the whole
//! file and must present the token from the most recent read of that path.

mod cache;
mod github;
mod memory;
mod records;
mod repository;

pub use cache::*;
pub use github::*;
pub use memory::*;
pub use records::*;
pub use repository::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors raised by document and record stores.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Network failure or 5xx from the remote service. Never retried.
    #[error("transient fetch failure: {0}")]
    TransientFetch(String),
    /// The store credential is missing or lacks the required scope.
    #[error("store credential rejected: {0}")]
    Authorization(String),
    /// The write token does not match the current state of the document.
    #[error("concurrency conflict on {path}")]
    ConcurrencyConflict { path: String },
    /// The document body could not be decoded into a JSON array.
    #[error("malformed document at {path}: {reason}")]
    MalformedDocument { path: String, reason: String },
    /// One element of an otherwise valid document does not fit the model.
    #[error("record {id} in {path} cannot be decoded: {reason}")]
    UndecodableRecord {
        path: String,
        id: String,
        reason: String,
    },
    /// A record is absent from an otherwise present collection.
    #[error("record {id} not found")]
    RecordNotFound { id: String },
    /// A mutation refused to apply.
    #[error("mutation rejected: {0}")]
    Rejected(String),
    /// Relational backend failure.
    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Whether a secondary store may be tried after this error.
    ///
    /// Conflicts and record-level outcomes are answers, not outages.
    pub fn allows_fallback(&self) -> bool {
        matches!(
            self,
            StoreError::TransientFetch(_)
                | StoreError::Authorization(_)
                | StoreError::MalformedDocument { .. }
                | StoreError::Database(_)
        )
    }

    pub(crate) fn malformed(path: &str, reason: impl fmt::Display) -> Self {
        StoreError::MalformedDocument {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        StoreError::Database(err.to_string())
    }
}

/// Opaque token gating writes to a document (the remote content hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcurrencyToken(String);

impl ConcurrencyToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document content plus the token required to overwrite it.
#[derive(Debug, Clone)]
pub struct VersionedDocument {
    pub content: serde_json::Value,
    pub token: ConcurrencyToken,
}

/// Whole-document get/put against a file-backed store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the document at `path`. An absent path is `Ok(None)`.
    async fn get(&self, path: &str) -> Result<Option<VersionedDocument>, StoreError>;

    /// Overwrite the document at `path`, returning the token of the new revision.
    ///
    /// Without a token the write creates the document; a stale token, or a
    /// missing token for an existing document, fails with
    /// [`StoreError::ConcurrencyConflict`].
    async fn put(
        &self,
        path: &str,
        content: &serde_json::Value,
        message: &str,
        token: Option<&ConcurrencyToken>,
    ) -> Result<ConcurrencyToken, StoreError>;

    /// Read-only fetch without a token, for listings that never write back.
    async fn read_only(&self, path: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.get(path).await?.map(|doc| doc.content))
    }

    /// Short backend name for log lines.
    fn name(&self) -> &'static str;
}

/// Serialize a document the way it is stored: pretty-printed with a trailing newline.
pub(crate) fn render_document(content: &serde_json::Value) -> Result<String, StoreError> {
    let mut body = serde_json::to_string_pretty(content)
        .map_err(|e| StoreError::Rejected(format!("Failed to serialize document: {}", e)))?;
    body.push('\n');
    Ok(body)
}
