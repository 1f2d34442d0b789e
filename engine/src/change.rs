//! Change tracking and commit-time notifications.
//!
//! Writes inside a transaction push a [`Change`] into the transaction's
//! [`ChangeBuffer`]. The buffer is flushed to the [`ChangeFeed`] only after
//! the transaction commits, in write order; an aborted transaction drops it.

use crate::{record::Record, StoreName};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const FEED_CAPACITY: usize = 256;

/// Kind of write that produced a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// A new key was written
    Add,
    /// An existing record was overwritten
    Update,
}

/// A committed write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub kind: ChangeKind,
    pub store_name: StoreName,
    /// The record as written
    pub record: Record,
}

/// How a write treats the dirty flag and change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Application write: marks the record dirty and emits a change
    Local,
    /// Server-originated write: keeps the flag as given and emits a change
    Remote,
    /// Bookkeeping write: keeps the flag as given and emits nothing
    Silent,
}

impl WriteMode {
    pub(crate) fn prepare(self, record: &mut Record) {
        if self == WriteMode::Local {
            record.changed_since_sync = true;
        }
    }

    pub(crate) fn emits(self) -> bool {
        self != WriteMode::Silent
    }
}

/// Changes accumulated by one transaction.
#[derive(Debug, Default)]
pub(crate) struct ChangeBuffer {
    changes: Vec<Change>,
}

impl ChangeBuffer {
    pub fn push(&mut self, kind: ChangeKind, store_name: &str, record: Record) {
        self.changes.push(Change {
            kind,
            store_name: store_name.to_string(),
            record,
        });
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }
}

/// Broadcast of committed changes.
#[derive(Debug, Clone)]
pub(crate) struct ChangeFeed {
    sender: broadcast::Sender<Change>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.sender.subscribe()
    }

    /// Publish committed changes in order. Having no subscriber is fine.
    pub fn publish(&self, changes: Vec<Change>) {
        for change in changes {
            if self.sender.send(change).is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_mode_marks_dirty() {
        let mut record = Record::new().with_key("a");
        WriteMode::Remote.prepare(&mut record);
        assert!(!record.is_dirty());
        WriteMode::Local.prepare(&mut record);
        assert!(record.is_dirty());
    }

    #[test]
    fn silent_mode_does_not_emit() {
        assert!(WriteMode::Local.emits());
        assert!(WriteMode::Remote.emits());
        assert!(!WriteMode::Silent.emits());
    }

    #[tokio::test]
    async fn feed_preserves_order() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();

        let mut buffer = ChangeBuffer::default();
        buffer.push(ChangeKind::Add, "notes", Record::new().with_key("a"));
        buffer.push(ChangeKind::Update, "notes", Record::new().with_key("a"));
        feed.publish(buffer.into_changes());

        assert_eq!(rx.recv().await.unwrap().kind, ChangeKind::Add);
        assert_eq!(rx.recv().await.unwrap().kind, ChangeKind::Update);
    }

    #[test]
    fn publish_without_subscribers() {
        let feed = ChangeFeed::new();
        let mut buffer = ChangeBuffer::default();
        buffer.push(ChangeKind::Add, "notes", Record::new().with_key("a"));
        feed.publish(buffer.into_changes());
    }

    #[test]
    fn change_serialization() {
        let change = Change {
            kind: ChangeKind::Add,
            store_name: "notes".into(),
            record: Record::new().with_key("a"),
        };
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(value["kind"], "add");
        assert_eq!(value["storeName"], "notes");
    }
}
