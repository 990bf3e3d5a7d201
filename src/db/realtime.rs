//! Table change notifications.
//!
//! Subscribers only learn that something changed; they re-fetch to reconcile.

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Users,
    Candidates,
    Comments,
    Reminders,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    /// Row id; for `comments` and `reminders` the owning candidate id.
    pub record_id: String,
}

/// Fan-out of committed row changes.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, table: Table, kind: ChangeKind, record_id: &str) {
        let event = ChangeEvent {
            table,
            kind,
            record_id: record_id.to_string(),
        };
        // No receivers is not an error.
        if self.sender.send(event).is_err() {
            tracing::trace!(?table, ?kind, record_id, "change event dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Invoke `callback` for every change to one of `tables` until the feed closes.
    pub fn on_change<F>(&self, tables: &[Table], mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        let tables = tables.to_vec();
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if tables.contains(&event.table) => callback(event),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(?tables, skipped, "change subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
