//! Record-level store capability.
//!
//! [`RecordStore`] is what domain services talk to. It has a document-backed
//! implementation ([`DocumentRecordStore`]), a relational one
//! (`crate::db::RelationalStore`), and the [`PreferredThenFallback`] composite.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::{DocumentRepository, DocumentStore, StoreError};

/// A domain entity stored as one element of a collection.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Singular noun used in commit messages and logs.
    const KIND: &'static str;

    fn id(&self) -> &str;
}

/// In-place change applied to one record inside a read-modify-write cycle.
///
/// It may run more than once when a fallback store is tried.
pub type Mutation<'a, T> = &'a (dyn Fn(&mut T) -> Result<(), StoreError> + Send + Sync);

#[async_trait]
pub trait RecordStore<T: Record>: Send + Sync {
    async fn list(&self) -> Result<Vec<T>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<T>, StoreError>;

    /// Add a new record. An existing id is rejected.
    async fn insert(&self, record: &T) -> Result<(), StoreError>;

    /// Apply `mutation` to the record with `id` and persist it.
    async fn update(&self, id: &str, mutation: Mutation<'_, T>) -> Result<T, StoreError>;

    /// Remove the record with `id`. Returns false when it did not exist.
    async fn remove(&self, id: &str) -> Result<bool, StoreError>;

    /// Short backend name for log lines.
    fn backend(&self) -> &'static str;
}

/// Record store over one whole-document collection.
///
/// Only the record being written is decoded and re-encoded; every other
/// element of the array is carried through as the JSON that was read.
pub struct DocumentRecordStore<T> {
    repo: DocumentRepository<Value>,
    backend: &'static str,
    _records: PhantomData<fn() -> T>,
}

fn record_id(value: &Value) -> Option<&str> {
    value.get("id").and_then(Value::as_str)
}

/// Decode one array element of the document at `path`.
pub fn decode_record<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, StoreError> {
    let id = record_id(&value).unwrap_or("<no id>").to_string();
    serde_json::from_value(value).map_err(|e| StoreError::UndecodableRecord {
        path: path.to_string(),
        id,
        reason: e.to_string(),
    })
}

/// Decode every element that fits `T`. The others are logged and left out.
pub fn decode_records<T: DeserializeOwned>(path: &str, values: Vec<Value>) -> Vec<T> {
    values
        .into_iter()
        .filter_map(|value| match decode_record(path, value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(path, "Skipping record: {}", e);
                None
            }
        })
        .collect()
}

impl<T: Record> DocumentRecordStore<T> {
    pub fn new(store: Arc<dyn DocumentStore>, path: impl Into<String>) -> Self {
        let backend = store.name();
        Self {
            repo: DocumentRepository::new(store, path),
            backend,
            _records: PhantomData,
        }
    }

    fn decode(&self, value: Value) -> Result<T, StoreError> {
        decode_record(self.repo.path(), value)
    }

    fn encode(&self, record: &T) -> Result<Value, StoreError> {
        serde_json::to_value(record).map_err(|e| {
            StoreError::Rejected(format!("cannot encode {} {}: {}", T::KIND, record.id(), e))
        })
    }
}

#[async_trait]
impl<T: Record> RecordStore<T> for DocumentRecordStore<T> {
    async fn list(&self) -> Result<Vec<T>, StoreError> {
        let values = self.repo.snapshot().await?;
        Ok(decode_records(self.repo.path(), values))
    }

    async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        self.repo
            .snapshot()
            .await?
            .into_iter()
            .find(|v| record_id(v) == Some(id))
            .map(|v| self.decode(v))
            .transpose()
    }

    async fn insert(&self, record: &T) -> Result<(), StoreError> {
        let (mut items, token) = self.repo.load().await?;
        if items.iter().any(|v| record_id(v) == Some(record.id())) {
            return Err(StoreError::Rejected(format!(
                "{} {} already exists",
                T::KIND,
                record.id()
            )));
        }

        items.push(self.encode(record)?);
        let message = format!("Add {} {}", T::KIND, record.id());
        self.repo.save(&items, token.as_ref(), &message).await?;
        Ok(())
    }

    async fn update(&self, id: &str, mutation: Mutation<'_, T>) -> Result<T, StoreError> {
        let (mut items, token) = self.repo.load().await?;
        let slot = items
            .iter_mut()
            .find(|v| record_id(v) == Some(id))
            .ok_or_else(|| StoreError::RecordNotFound { id: id.to_string() })?;

        let mut record = self.decode(slot.clone())?;
        mutation(&mut record)?;
        *slot = self.encode(&record)?;

        let message = format!("Update {} {}", T::KIND, id);
        self.repo.save(&items, token.as_ref(), &message).await?;
        Ok(record)
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let (mut items, token) = self.repo.load().await?;
        let before = items.len();
        items.retain(|v| record_id(v) != Some(id));
        if items.len() == before {
            return Ok(false);
        }

        let message = format!("Delete {} {}", T::KIND, id);
        self.repo.save(&items, token.as_ref(), &message).await?;
        Ok(true)
    }

    fn backend(&self) -> &'static str {
        self.backend
    }
}

/// Tries the preferred store and, on an outage-type error, the fallback.
///
/// Conflicts and record-level answers from the preferred store are returned
/// as-is. The two stores are never reconciled.
pub struct PreferredThenFallback<T> {
    preferred: Arc<dyn RecordStore<T>>,
    fallback: Arc<dyn RecordStore<T>>,
}

impl<T: Record> PreferredThenFallback<T> {
    pub fn new(preferred: Arc<dyn RecordStore<T>>, fallback: Arc<dyn RecordStore<T>>) -> Self {
        Self {
            preferred,
            fallback,
        }
    }

    fn falls_back(&self, operation: &str, err: &StoreError) -> bool {
        if !err.allows_fallback() {
            return false;
        }
        tracing::warn!(
            kind = T::KIND,
            operation,
            preferred = self.preferred.backend(),
            fallback = self.fallback.backend(),
            "Preferred store failed, using fallback: {}",
            err
        );
        true
    }
}

#[async_trait]
impl<T: Record> RecordStore<T> for PreferredThenFallback<T> {
    async fn list(&self) -> Result<Vec<T>, StoreError> {
        match self.preferred.list().await {
            Err(e) if self.falls_back("list", &e) => self.fallback.list().await,
            other => other,
        }
    }

    async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        match self.preferred.get(id).await {
            Err(e) if self.falls_back("get", &e) => self.fallback.get(id).await,
            other => other,
        }
    }

    async fn insert(&self, record: &T) -> Result<(), StoreError> {
        match self.preferred.insert(record).await {
            Err(e) if self.falls_back("insert", &e) => self.fallback.insert(record).await,
            other => other,
        }
    }

    async fn update(&self, id: &str, mutation: Mutation<'_, T>) -> Result<T, StoreError> {
        match self.preferred.update(id, mutation).await {
            Err(e) if self.falls_back("update", &e) => self.fallback.update(id, mutation).await,
            other => other,
        }
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        match self.preferred.remove(id).await {
            Err(e) if self.falls_back("remove", &e) => self.fallback.remove(id).await,
            other => other,
        }
    }

    fn backend(&self) -> &'static str {
        self.preferred.backend()
    }
}
