//! Typed whole-document repository.
//!
//! Every change is a read-modify-write of the full array: `load` the items
//! with their token, mutate in memory, `save` the whole array back.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use super::{ConcurrencyToken, DocumentStore, StoreError};

/// A JSON array of `T` stored as one document.
pub struct DocumentRepository<T> {
    store: Arc<dyn DocumentStore>,
    path: String,
    _items: PhantomData<fn() -> T>,
}

impl<T> Clone for DocumentRepository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            path: self.path.clone(),
            _items: PhantomData,
        }
    }
}

impl<T> DocumentRepository<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn DocumentStore>, path: impl Into<String>) -> Self {
        Self {
            store,
            path: path.into(),
            _items: PhantomData,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Load all items and the token needed to write them back.
    ///
    /// An absent document yields no items and no token.
    pub async fn load(&self) -> Result<(Vec<T>, Option<ConcurrencyToken>), StoreError> {
        match self.store.get(&self.path).await? {
            Some(doc) => Ok((decode_items(&self.path, doc.content)?, Some(doc.token))),
            None => Ok((Vec::new(), None)),
        }
    }

    /// Load all items for display only, possibly through a cheaper read path.
    pub async fn snapshot(&self) -> Result<Vec<T>, StoreError> {
        match self.store.read_only(&self.path).await? {
            Some(content) => decode_items(&self.path, content),
            None => Ok(Vec::new()),
        }
    }

    /// Overwrite the whole document. `token` must come from the preceding `load`.
    pub async fn save(
        &self,
        items: &[T],
        token: Option<&ConcurrencyToken>,
        message: &str,
    ) -> Result<ConcurrencyToken, StoreError> {
        let content = serde_json::to_value(items)
            .map_err(|e| StoreError::Rejected(format!("Failed to encode {}: {}", self.path, e)))?;
        self.store.put(&self.path, &content, message, token).await
    }
}

fn decode_items<T: DeserializeOwned>(
    path: &str,
    content: serde_json::Value,
) -> Result<Vec<T>, StoreError> {
    match content {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::Array(_) => {
            serde_json::from_value(content).map_err(|e| StoreError::malformed(path, e))
        }
        other => Err(StoreError::malformed(
            path,
            format!("expected a JSON array, found {}", json_kind(&other)),
        )),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryFileStore;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: String,
    }

    fn repo(store: &Arc<InMemoryFileStore>) -> DocumentRepository<Item> {
        let store: Arc<dyn DocumentStore> = store.clone();
        DocumentRepository::new(store, "items.json")
    }

    #[tokio::test]
    async fn test_absent_document_loads_empty_without_token() {
        let store = Arc::new(InMemoryFileStore::new());
        let (items, token) = repo(&store).load().await.unwrap();
        assert!(items.is_empty());
        assert!(token.is_none());
    }

    #[tokio::test]
    async fn test_null_document_is_empty() {
        let store = Arc::new(InMemoryFileStore::new());
        store
            .put("items.json", &serde_json::Value::Null, "Init", None)
            .await
            .unwrap();

        let (items, token) = repo(&store).load().await.unwrap();
        assert!(items.is_empty());
        assert!(token.is_some());
    }

    #[tokio::test]
    async fn test_object_document_is_malformed() {
        let store = Arc::new(InMemoryFileStore::new());
        store
            .put("items.json", &json!({ "id": "1" }), "Init", None)
            .await
            .unwrap();

        let result = repo(&store).load().await;
        assert!(matches!(result, Err(StoreError::MalformedDocument { .. })));
    }

    #[tokio::test]
    async fn test_save_returns_token_for_next_write() {
        let store = Arc::new(InMemoryFileStore::new());
        let repo = repo(&store);

        let first = repo
            .save(&[Item { id: "a".into() }], None, "Create items")
            .await
            .unwrap();
        let (mut items, token) = repo.load().await.unwrap();
        assert_eq!(token.as_ref(), Some(&first));

        items.push(Item { id: "b".into() });
        repo.save(&items, token.as_ref(), "Add item b").await.unwrap();

        let snapshot = repo.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 2);

        // The first token is now stale.
        let stale = repo.save(&items, Some(&first), "Stale write").await;
        assert!(matches!(stale, Err(StoreError::ConcurrencyConflict { .. })));
    }
}
