//! Snapshot types for persisting and restoring database state.
//!
//! A database opened with [`Database::open_at`] keeps `<dir>/<name>.json`
//! in sync with its contents: the file is loaded on open and rewritten
//! atomically after every read-write commit. Maps are `BTreeMap`s so the
//! output is deterministic.
//!
//! [`Database::open_at`]: crate::Database::open_at

use crate::{
    error::Result,
    record::Record,
    schema::StoreDef,
    store::{Backend, ObjectStore},
    Error, RecordKey, SchemaVersion, StoreName,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Contents of one store in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Store definition including the indexes it was built with
    pub def: StoreDef,
    /// Records by key
    pub records: BTreeMap<RecordKey, Record>,
}

/// A point-in-time snapshot of a whole database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Database name
    pub name: String,
    /// Schema version the stores were built at
    pub version: SchemaVersion,
    /// Every store, meta store included
    pub stores: BTreeMap<StoreName, StoreSnapshot>,
}

impl DatabaseSnapshot {
    /// Count records across all stores.
    pub fn record_count(&self) -> usize {
        self.stores.values().map(|s| s.records.len()).sum()
    }

    /// Get a record from the snapshot.
    pub fn get_record(&self, store: &str, key: &str) -> Option<&Record> {
        self.stores.get(store)?.records.get(key)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        for (name, store) in &snapshot.stores {
            for (key, record) in &store.records {
                if record.key.as_deref() != Some(key.as_str()) {
                    return Err(Error::InvalidSnapshot(format!(
                        "record '{key}' in store '{name}' carries a different key"
                    )));
                }
            }
        }

        Ok(snapshot)
    }
}

impl Backend {
    /// Capture every store.
    pub(crate) fn to_snapshot(&self, name: &str) -> DatabaseSnapshot {
        let stores = self
            .stores
            .iter()
            .map(|(store_name, store)| {
                let records = store
                    .records()
                    .filter_map(|r| r.key.clone().map(|k| (k, r.clone())))
                    .collect();
                (
                    store_name.clone(),
                    StoreSnapshot {
                        def: store.def().clone(),
                        records,
                    },
                )
            })
            .collect();

        DatabaseSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            name: name.to_string(),
            version: self.version,
            stores,
        }
    }

    /// Rebuild stores and indexes from a snapshot.
    pub(crate) fn from_snapshot(snapshot: DatabaseSnapshot) -> Result<Self> {
        let mut stores = BTreeMap::new();
        for (name, data) in snapshot.stores {
            let mut store = ObjectStore::new(data.def);
            for record in data.records.into_values() {
                store.insert(record)?;
            }
            stores.insert(name, store);
        }
        Ok(Backend {
            version: snapshot.version,
            stores,
        })
    }
}

/// Path of the snapshot file for database `name` under `dir`.
pub(crate) fn snapshot_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.json"))
}

/// Load a snapshot file; `None` if it does not exist.
pub(crate) async fn load(path: &Path) -> Result<Option<DatabaseSnapshot>> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => DatabaseSnapshot::from_json(&json).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Persistence(format!("{}: {e}", path.display()))),
    }
}

/// Write a snapshot next to `path` and rename it into place.
pub(crate) async fn save(path: &Path, snapshot: &DatabaseSnapshot) -> Result<()> {
    let json = snapshot.to_json()?;
    let tmp = path.with_extension("json.tmp");

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::Persistence(format!("{}: {e}", parent.display())))?;
    }
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| Error::Persistence(format!("{}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::Persistence(format!("{}: {e}", path.display())))?;

    tracing::trace!(path = %path.display(), records = snapshot.record_count(), "snapshot saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::KeyRange;
    use serde_json::json;

    fn backend() -> Backend {
        let mut backend = Backend {
            version: 2,
            ..Backend::default()
        };
        backend
            .ensure_store(&StoreDef::new("notes").with_index("byTitle", "title"))
            .unwrap();
        let notes = backend.store_mut("notes").unwrap();
        notes
            .insert(Record::new().with_key("a").with("title", "z"))
            .unwrap();
        notes
            .insert(Record::new().with_key("b").with("title", "y"))
            .unwrap();
        backend
    }

    #[test]
    fn snapshot_round_trip_rebuilds_indexes() {
        let snapshot = backend().to_snapshot("app");
        assert_eq!(snapshot.record_count(), 2);
        assert_eq!(
            snapshot.get_record("notes", "a").unwrap().get("title"),
            Some(&json!("z"))
        );

        let json = snapshot.to_json().unwrap();
        let restored = Backend::from_snapshot(DatabaseSnapshot::from_json(&json).unwrap()).unwrap();

        assert_eq!(restored.version, 2);
        let index = restored.store("notes").unwrap().index("byTitle").unwrap();
        assert_eq!(index.scan(&KeyRange::all()), vec!["b", "a"]);
    }

    #[test]
    fn future_format_rejected() {
        let mut snapshot = backend().to_snapshot("app");
        snapshot.format_version = SNAPSHOT_FORMAT_VERSION + 1;
        let json = snapshot.to_json().unwrap();
        assert!(matches!(
            DatabaseSnapshot::from_json(&json),
            Err(Error::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn mismatched_key_rejected() {
        let mut snapshot = backend().to_snapshot("app");
        let store = snapshot.stores.get_mut("notes").unwrap();
        let record = store.records.remove("a").unwrap();
        store.records.insert("other".into(), record);

        let json = snapshot.to_json().unwrap();
        assert!(matches!(
            DatabaseSnapshot::from_json(&json),
            Err(Error::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn garbage_rejected() {
        assert!(matches!(
            DatabaseSnapshot::from_json("not json"),
            Err(Error::InvalidSnapshot(_))
        ));
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot_path(dir.path(), "app");

        assert!(load(&path).await.unwrap().is_none());

        let snapshot = backend().to_snapshot("app");
        save(&path, &snapshot).await.unwrap();
        assert_eq!(load(&path).await.unwrap(), Some(snapshot));
        assert!(!path.with_extension("json.tmp").exists());
    }
}
