//! Object stores - the in-memory state behind a database.
//!
//! An [`ObjectStore`] holds the records of one store keyed by record key and
//! keeps its secondary indexes current on every write. [`Backend`] is the
//! whole database: every store plus the schema version it was built at.

use crate::{
    error::Result,
    index::Index,
    record::Record,
    schema::{IndexDef, StoreDef},
    Error, RecordKey, SchemaVersion, StoreName,
};
use std::collections::BTreeMap;

/// Records and indexes of one store.
#[derive(Debug, Clone)]
pub(crate) struct ObjectStore {
    def: StoreDef,
    records: BTreeMap<RecordKey, Record>,
    indexes: BTreeMap<String, Index>,
}

impl ObjectStore {
    /// Create an empty store with the indexes named in `def`.
    pub fn new(def: StoreDef) -> Self {
        let indexes = def
            .indexes
            .iter()
            .map(|i| (i.name.clone(), Index::new(i.clone())))
            .collect();
        Self {
            def,
            records: BTreeMap::new(),
            indexes,
        }
    }

    pub fn def(&self) -> &StoreDef {
        &self.def
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.get(name)
    }

    /// Insert or replace a keyed record, returning the previous one.
    ///
    /// Unique indexes are checked before anything changes, so a failed
    /// insert leaves the store untouched.
    pub fn insert(&mut self, record: Record) -> Result<Option<Record>> {
        let key = record.key.clone().ok_or(Error::MissingKey)?;

        for index in self.indexes.values() {
            index.check(&key, &record)?;
        }

        let previous = self.records.remove(&key);
        if let Some(old) = &previous {
            for index in self.indexes.values_mut() {
                index.remove(&key, old);
            }
        }
        for index in self.indexes.values_mut() {
            index.insert(&key, &record);
        }
        self.records.insert(key, record);

        Ok(previous)
    }

    /// Put `key` back to `previous` without constraint checks. Used to undo
    /// writes of an aborted transaction.
    pub fn restore(&mut self, key: &str, previous: Option<Record>) {
        if let Some(current) = self.records.remove(key) {
            for index in self.indexes.values_mut() {
                index.remove(key, &current);
            }
        }
        if let Some(record) = previous {
            for index in self.indexes.values_mut() {
                index.insert(key, &record);
            }
            self.records.insert(key.to_string(), record);
        }
    }

    /// Create `def` if the store does not have it yet, indexing existing
    /// records. Fails if existing records already violate a unique index.
    pub fn ensure_index(&mut self, def: &IndexDef) -> Result<()> {
        if self.indexes.contains_key(&def.name) {
            return Ok(());
        }

        let mut index = Index::new(def.clone());
        for (key, record) in &self.records {
            index.check(key, record)?;
            index.insert(key, record);
        }

        tracing::debug!(store = %self.def.name, index = %def.name, "index created");
        self.indexes.insert(def.name.clone(), index);
        self.def.indexes.push(def.clone());
        Ok(())
    }
}

/// Entry of the undo log kept by a read-write transaction.
#[derive(Debug, Clone)]
pub(crate) struct Undo {
    pub store: StoreName,
    pub key: RecordKey,
    pub previous: Option<Record>,
}

/// All stores of one database.
#[derive(Debug, Clone, Default)]
pub(crate) struct Backend {
    pub version: SchemaVersion,
    pub stores: BTreeMap<StoreName, ObjectStore>,
}

impl Backend {
    pub fn store(&self, name: &str) -> Result<&ObjectStore> {
        self.stores
            .get(name)
            .ok_or_else(|| Error::StoreNotFound(name.to_string()))
    }

    pub fn store_mut(&mut self, name: &str) -> Result<&mut ObjectStore> {
        self.stores
            .get_mut(name)
            .ok_or_else(|| Error::StoreNotFound(name.to_string()))
    }

    /// Create `def` if missing, otherwise add any indexes it lacks.
    pub fn ensure_store(&mut self, def: &StoreDef) -> Result<()> {
        match self.stores.get_mut(&def.name) {
            Some(store) => {
                for index in &def.indexes {
                    store.ensure_index(index)?;
                }
            }
            None => {
                tracing::debug!(store = %def.name, "store created");
                self.stores
                    .insert(def.name.clone(), ObjectStore::new(def.clone()));
            }
        }
        Ok(())
    }

    /// Roll back an undo log, newest entry first.
    pub fn undo(&mut self, log: Vec<Undo>) {
        for entry in log.into_iter().rev() {
            if let Some(store) = self.stores.get_mut(&entry.store) {
                store.restore(&entry.key, entry.previous);
            }
        }
    }
}
