//! In-memory authoritative store.
//!
//! Every accepted write is appended to a change log. The position of an entry
//! in the log (starting at 1) is its sequence number, which clients keep as
//! their per-store watermark.

use std::collections::HashMap;

use serde_json::{Map, Value};
use syncdb_engine::{diff, ClientId, Cursor, Diff, Message, Record, RecordKey, StoreName, Version};
use tokio::sync::RwLock;

use crate::error::{AppError, Result};

/// Current server-side state of one record.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub version: Version,
    pub payload: Map<String, Value>,
}

#[derive(Debug, Clone)]
enum ChangeKind {
    Create(Map<String, Value>),
    Update(Diff),
}

/// One accepted write.
#[derive(Debug, Clone)]
struct LogEntry {
    store: StoreName,
    key: RecordKey,
    origin: Option<ClientId>,
    version: Version,
    kind: ChangeKind,
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<(StoreName, RecordKey), StoredRecord>,
    log: Vec<LogEntry>,
}

/// Authoritative record store shared by all connections.
#[derive(Debug, Default)]
pub struct RemoteStore {
    inner: RwLock<Inner>,
}

impl RemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a client write and return the version now held by the server.
    ///
    /// A new key starts at version 1. A known key is diffed against the
    /// stored payload; an identical payload keeps the current version and is
    /// not logged.
    pub async fn accept(
        &self,
        store: &str,
        origin: Option<&str>,
        record: Record,
    ) -> Result<Version> {
        let key = record
            .key
            .ok_or_else(|| AppError::BadRequest(format!("create for '{store}' without key")))?;
        let payload = record.fields;

        let mut inner = self.inner.write().await;
        let id = (store.to_string(), key.clone());

        let (version, kind) = match inner.records.get(&id) {
            None => (1, ChangeKind::Create(payload.clone())),
            Some(current) => {
                let d = diff::diff_maps(&current.payload, &payload)?;
                if d.is_empty() {
                    tracing::debug!(store, key = %key, "create matches stored record");
                    return Ok(current.version);
                }
                (current.version + 1, ChangeKind::Update(d))
            }
        };

        inner
            .records
            .insert(id, StoredRecord { version, payload });
        inner.log.push(LogEntry {
            store: store.to_string(),
            key: key.clone(),
            origin: origin.map(str::to_string),
            version,
            kind,
        });

        tracing::debug!(
            store,
            key = %key,
            version,
            sequence = inner.log.len(),
            "write accepted"
        );
        Ok(version)
    }

    /// Changes to `store` after `since` that did not originate from `client`,
    /// as protocol messages in log order.
    pub async fn changes_since(&self, store: &str, client: &str, since: Cursor) -> Vec<Message> {
        let inner = self.inner.read().await;
        let skip = usize::try_from(since.max(0)).unwrap_or(usize::MAX);

        inner
            .log
            .iter()
            .enumerate()
            .skip(skip)
            .filter(|(_, entry)| entry.store == store && entry.origin.as_deref() != Some(client))
            .map(|(index, entry)| {
                let timestamp = index as Cursor + 1;
                match &entry.kind {
                    ChangeKind::Create(payload) => {
                        let mut record = Record::new().with_key(entry.key.clone());
                        record.version = Some(entry.version);
                        record.fields = payload.clone();
                        Message::Create {
                            store_name: entry.store.clone(),
                            client_id: None,
                            record,
                            timestamp: Some(timestamp),
                        }
                    }
                    ChangeKind::Update(d) => Message::Update {
                        store_name: entry.store.clone(),
                        key: entry.key.clone(),
                        diff: d.clone(),
                        timestamp,
                        new_version: Some(entry.version),
                    },
                }
            })
            .collect()
    }

    /// Current state of a record.
    pub async fn get(&self, store: &str, key: &str) -> Option<StoredRecord> {
        self.inner
            .read()
            .await
            .records
            .get(&(store.to_string(), key.to_string()))
            .cloned()
    }
}
