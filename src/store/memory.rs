//! In-process document store with the same optimistic-concurrency contract as
//! the GitHub adapter.

use std::collections::HashMap;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::{render_document, ConcurrencyToken, DocumentStore, StoreError, VersionedDocument};

#[derive(Debug, Clone)]
struct StoredFile {
    body: String,
    token: ConcurrencyToken,
    revisions: u64,
}

/// Document store kept in memory. Tokens are SHA-256 digests of the stored bytes.
#[derive(Debug, Default)]
pub struct InMemoryFileStore {
    files: RwLock<HashMap<String, StoredFile>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of revisions written to `path` so far.
    #[cfg(test)]
    pub async fn revisions(&self, path: &str) -> u64 {
        self.files
            .read()
            .await
            .get(path)
            .map(|f| f.revisions)
            .unwrap_or(0)
    }

    /// Raw stored bytes of `path`, exactly as a reader would receive them.
    #[cfg(test)]
    pub async fn raw(&self, path: &str) -> Option<String> {
        self.files.read().await.get(path).map(|f| f.body.clone())
    }
}

fn content_token(body: &str) -> ConcurrencyToken {
    ConcurrencyToken::new(hex::encode(Sha256::digest(body.as_bytes())))
}

#[async_trait]
impl DocumentStore for InMemoryFileStore {
    async fn get(&self, path: &str) -> Result<Option<VersionedDocument>, StoreError> {
        let files = self.files.read().await;
        let Some(file) = files.get(path) else {
            return Ok(None);
        };

        let content =
            serde_json::from_str(&file.body).map_err(|e| StoreError::malformed(path, e))?;

        Ok(Some(VersionedDocument {
            content,
            token: file.token.clone(),
        }))
    }

    async fn put(
        &self,
        path: &str,
        content: &serde_json::Value,
        message: &str,
        token: Option<&ConcurrencyToken>,
    ) -> Result<ConcurrencyToken, StoreError> {
        let body = render_document(content)?;
        let mut files = self.files.write().await;

        let current = files.get(path);
        let accepted = match (current, token) {
            (None, None) => true,
            (Some(file), Some(expected)) => file.token == *expected,
            _ => false,
        };
        if !accepted {
            tracing::debug!(path, "rejected in-memory write with stale token");
            return Err(StoreError::ConcurrencyConflict {
                path: path.to_string(),
            });
        }

        let revisions = current.map(|f| f.revisions).unwrap_or(0) + 1;
        let new_token = content_token(&body);
        tracing::debug!(
            path,
            revisions,
            commit_message = message,
            "in-memory document written"
        );

        files.insert(
            path.to_string(),
            StoredFile {
                body,
                token: new_token.clone(),
                revisions,
            },
        );

        Ok(new_token)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
