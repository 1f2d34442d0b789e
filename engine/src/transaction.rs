//! Transactions over one or more stores.
//!
//! A [`Transaction`] is scoped to a fixed set of store names and runs under
//! the database lock: shared for [`Mode::Read`], exclusive for
//! [`Mode::ReadWrite`]. Every write records what it replaced so an aborted
//! transaction can be rolled back, and buffers a [`Change`] that is only
//! published once the transaction commits.
//!
//! [`Change`]: crate::Change

use crate::{
    barrier::Countdown,
    change::{ChangeBuffer, ChangeKind, WriteMode},
    error::Result,
    index::{Index, KeyRange},
    record::{generate_key, Record},
    store::{Backend, ObjectStore, Undo},
    Change, Error, RecordKey, StoreName,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    ReadWrite,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" | "read" | "readonly" => Ok(Mode::Read),
            "rw" | "readwrite" => Ok(Mode::ReadWrite),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

enum Access<'db> {
    Read(&'db Backend),
    Write(&'db mut Backend),
}

/// An open transaction.
pub struct Transaction<'db> {
    access: Access<'db>,
    scope: BTreeSet<StoreName>,
    undo: Vec<Undo>,
    changes: ChangeBuffer,
}

impl<'db> Transaction<'db> {
    pub(crate) fn read(backend: &'db Backend, scope: BTreeSet<StoreName>) -> Self {
        Self {
            access: Access::Read(backend),
            scope,
            undo: Vec::new(),
            changes: ChangeBuffer::default(),
        }
    }

    pub(crate) fn write(backend: &'db mut Backend, scope: BTreeSet<StoreName>) -> Self {
        Self {
            access: Access::Write(backend),
            scope,
            undo: Vec::new(),
            changes: ChangeBuffer::default(),
        }
    }

    /// The mode this transaction was opened with.
    pub fn mode(&self) -> Mode {
        match self.access {
            Access::Read(_) => Mode::Read,
            Access::Write(_) => Mode::ReadWrite,
        }
    }

    /// Store names this transaction covers.
    pub fn scope(&self) -> impl Iterator<Item = &str> {
        self.scope.iter().map(String::as_str)
    }

    /// Handle to one store of the scope.
    pub fn store<'tx>(&'tx mut self, name: &str) -> Result<StoreHandle<'tx, 'db>> {
        self.backend().store(name)?;
        if !self.scope.contains(name) {
            return Err(Error::StoreNotInScope(name.to_string()));
        }
        Ok(StoreHandle {
            tx: self,
            name: name.to_string(),
        })
    }

    fn backend(&self) -> &Backend {
        match &self.access {
            Access::Read(backend) => backend,
            Access::Write(backend) => backend,
        }
    }

    /// Consume the transaction, yielding its undo log and buffered changes.
    pub(crate) fn finish(self) -> (Vec<Undo>, Vec<Change>) {
        (self.undo, self.changes.into_changes())
    }
}

/// Scoped handle to one store inside a transaction.
pub struct StoreHandle<'tx, 'db> {
    tx: &'tx mut Transaction<'db>,
    name: StoreName,
}

impl StoreHandle<'_, '_> {
    /// Store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn inner(&self) -> Result<&ObjectStore> {
        self.tx.backend().store(&self.name)
    }

    /// Get one record by key.
    pub fn get(&self, key: &str) -> Result<Option<Record>> {
        Ok(self.inner()?.get(key).cloned())
    }

    /// Get several records by key, in the order asked. Missing keys yield
    /// `None`.
    pub fn get_many<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<Option<Record>>> {
        let store = self.inner()?;
        Ok(fan_in(keys, |key| store.get(key.as_ref()).cloned()))
    }

    /// Every record, in key order.
    pub fn all(&self) -> Result<Vec<Record>> {
        Ok(self.inner()?.records().cloned().collect())
    }

    /// Number of records.
    pub fn count(&self) -> Result<usize> {
        Ok(self.inner()?.len())
    }

    /// Handle to a secondary index.
    pub fn index(&self, name: &str) -> Result<IndexHandle<'_>> {
        let store = self.inner()?;
        let index = store
            .index(name)
            .ok_or_else(|| Error::IndexNotFound(format!("{}.{name}", self.name)))?;
        Ok(IndexHandle { store, index })
    }

    /// Insert or replace a record and mark it dirty. A record without a key
    /// gets a generated one, which is returned.
    pub fn put(&mut self, record: Record) -> Result<RecordKey> {
        self.write_record(record, WriteMode::Local, false)
    }

    /// Insert a new record and mark it dirty. Fails if the key exists.
    pub fn add(&mut self, record: Record) -> Result<RecordKey> {
        self.write_record(record, WriteMode::Local, true)
    }

    /// `put` several records.
    pub fn put_many(&mut self, records: impl IntoIterator<Item = Record>) -> Result<Vec<RecordKey>> {
        records.into_iter().map(|r| self.put(r)).collect()
    }

    /// Insert or replace a record with an explicit write mode.
    pub fn write(&mut self, record: Record, mode: WriteMode) -> Result<RecordKey> {
        self.write_record(record, mode, false)
    }

    fn write_record(
        &mut self,
        mut record: Record,
        mode: WriteMode,
        must_be_new: bool,
    ) -> Result<RecordKey> {
        let tx = &mut *self.tx;
        let Access::Write(backend) = &mut tx.access else {
            return Err(Error::ReadOnly(self.name.clone()));
        };

        let key = record.key.get_or_insert_with(generate_key).clone();
        mode.prepare(&mut record);

        let store = backend.store_mut(&self.name)?;
        if must_be_new && store.contains(&key) {
            return Err(Error::RecordAlreadyExists(key));
        }

        let emitted = mode.emits().then(|| record.clone());
        let previous = store.insert(record)?;
        let kind = if previous.is_some() && !must_be_new {
            ChangeKind::Update
        } else {
            ChangeKind::Add
        };

        tx.undo.push(Undo {
            store: self.name.clone(),
            key: key.clone(),
            previous,
        });
        if let Some(record) = emitted {
            tx.changes.push(kind, &self.name, record);
        }

        tracing::trace!(store = %self.name, key = %key, ?mode, "record written");
        Ok(key)
    }
}

/// Read handle to a secondary index.
pub struct IndexHandle<'a> {
    store: &'a ObjectStore,
    index: &'a Index,
}

impl IndexHandle<'_> {
    /// Records whose index value equals any of `values`, grouped by value in
    /// the order given. A record is returned at most once.
    pub fn get(&self, values: &[Value]) -> Vec<Record> {
        let groups = fan_in(values, |value| self.index.lookup(value));
        self.collect(groups)
    }

    /// Records inside any of `ranges`, grouped by range in the order given.
    /// A record is returned at most once.
    pub fn range(&self, ranges: &[KeyRange]) -> Vec<Record> {
        let groups = fan_in(ranges, |range| self.index.scan(range));
        self.collect(groups)
    }

    /// Number of records inside `range`.
    pub fn count(&self, range: &KeyRange) -> usize {
        self.index.scan(range).len()
    }

    /// Index name.
    pub fn name(&self) -> &str {
        &self.index.def().name
    }

    fn collect(&self, groups: Vec<Vec<RecordKey>>) -> Vec<Record> {
        let mut seen = HashSet::new();
        groups
            .into_iter()
            .flatten()
            .filter(|key| seen.insert(key.clone()))
            .filter_map(|key| self.store.get(&key).cloned())
            .collect()
    }
}

/// Run one lookup per input and gather the results in input order.
///
/// Each lookup releases one barrier unit; the results are handed over by the
/// barrier's zero callback once the last lookup has finished.
fn fan_in<I, T>(inputs: &[I], mut lookup: impl FnMut(&I) -> T) -> Vec<T>
where
    T: Send + 'static,
{
    if inputs.is_empty() {
        return Vec::new();
    }

    let countdown = Countdown::new(inputs.len() as i64);
    let slots = Arc::new(Mutex::new(Vec::with_capacity(inputs.len())));
    let (done, mut gathered) = oneshot::channel();

    let mut done = Some(done);
    let filled = slots.clone();
    countdown.on_zero(move || {
        if let Some(done) = done.take() {
            let _ = done.send(std::mem::take(&mut *filled.lock()));
        }
    });

    for input in inputs {
        let result = lookup(input);
        slots.lock().push(result);
        countdown.add(-1);
    }

    gathered.try_recv().unwrap_or_default()
}
