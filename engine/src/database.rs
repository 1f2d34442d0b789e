//! Database - the entry point of the engine.
//!
//! A [`Database`] owns the stores declared by its [`Schema`] plus the meta
//! store, runs transactions over them, publishes committed changes and
//! drives push/pull sessions against a remote.

use crate::{
    change::{Change, ChangeFeed},
    config::SyncConfig,
    error::Result,
    identity::{self, ClientIdentity, META_KEY},
    index::KeyRange,
    record::Record,
    schema::{Migrations, Schema, StoreDef},
    snapshot,
    store::Backend,
    sync::{
        self, session::guarded, Channel, Connector, PullReport, PushReport, SessionOptions,
        WsConnector,
    },
    transaction::{Mode, Transaction},
    watermark, ClientId, Cursor, Error, RecordKey, SchemaVersion, StoreName, META_STORE,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

struct Inner {
    name: String,
    schema: Schema,
    backend: RwLock<Backend>,
    persist: Option<PathBuf>,
    feed: ChangeFeed,
    identity: ClientIdentity,
    remote: parking_lot::RwLock<Option<Arc<dyn Connector>>>,
    session_defaults: parking_lot::RwLock<SessionOptions>,
}

/// A local database. Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.inner.name)
            .field("version", &self.inner.schema.version)
            .field("persist", &self.inner.persist)
            .finish()
    }
}

impl Database {
    // ========================================================================
    // Opening
    // ========================================================================

    /// Open an in-memory database.
    pub async fn open(
        name: impl Into<String>,
        schema: Schema,
        migrations: Migrations,
    ) -> Result<Self> {
        Self::build(name.into(), schema, migrations, None).await
    }

    /// Open a database persisted as `<dir>/<name>.json`.
    pub async fn open_at(
        dir: impl AsRef<Path>,
        name: impl Into<String>,
        schema: Schema,
        migrations: Migrations,
    ) -> Result<Self> {
        let name = name.into();
        let path = snapshot::snapshot_path(dir.as_ref(), &name);
        Self::build(name, schema, migrations, Some(path)).await
    }

    async fn build(
        name: String,
        schema: Schema,
        migrations: Migrations,
        persist: Option<PathBuf>,
    ) -> Result<Self> {
        schema.validate()?;

        let mut backend = match &persist {
            Some(path) => match snapshot::load(path).await? {
                Some(snapshot) => Backend::from_snapshot(snapshot)?,
                None => Backend::default(),
            },
            None => Backend::default(),
        };

        let stored = backend.version;
        if schema.version < stored {
            return Err(Error::VersionDowngrade {
                requested: schema.version,
                stored,
            });
        }

        if schema.version > stored {
            upgrade(&mut backend, &schema, &migrations, stored)?;
            if let Some(path) = &persist {
                snapshot::save(path, &backend.to_snapshot(&name)).await?;
            }
            tracing::info!(db = %name, from = stored, to = schema.version, "database upgraded");
        }

        Ok(Self {
            inner: Arc::new(Inner {
                name,
                schema,
                backend: RwLock::new(backend),
                persist,
                feed: ChangeFeed::new(),
                identity: ClientIdentity::new(),
                remote: parking_lot::RwLock::new(None),
                session_defaults: parking_lot::RwLock::new(SessionOptions::new()),
            }),
        })
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Schema version.
    pub fn version(&self) -> SchemaVersion {
        self.inner.schema.version
    }

    /// The schema the database was opened with.
    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Run `work` in one transaction over `stores`.
    ///
    /// A read-write transaction commits when `work` returns `Ok`; on `Err`
    /// every write is rolled back and no change is published. Persistent
    /// databases write their snapshot before the commit resolves.
    pub async fn transaction<T, F>(&self, stores: &[&str], mode: Mode, work: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T> + Send,
        T: Send,
    {
        let scope = self.scope(stores)?;

        match mode {
            Mode::Read => {
                let guard = self.inner.backend.read().await;
                let mut tx = Transaction::read(&guard, scope);
                work(&mut tx)
            }
            Mode::ReadWrite => {
                let mut guard = self.inner.backend.write().await;
                let mut tx = Transaction::write(&mut guard, scope);
                let result = work(&mut tx);
                let (undo, changes) = tx.finish();

                let value = match result {
                    Ok(value) => value,
                    Err(e) => {
                        guard.undo(undo);
                        tracing::debug!(error = %e, "transaction aborted");
                        return Err(e);
                    }
                };

                if !undo.is_empty() {
                    if let Some(path) = &self.inner.persist {
                        let snapshot = guard.to_snapshot(&self.inner.name);
                        if let Err(e) = snapshot::save(path, &snapshot).await {
                            guard.undo(undo);
                            tracing::error!(error = %e, "commit failed to persist");
                            return Err(e);
                        }
                    }
                }
                drop(guard);

                self.inner.feed.publish(changes);
                Ok(value)
            }
        }
    }

    /// Run `work` in a read-only transaction over `stores`.
    pub async fn read<T, F>(&self, stores: &[&str], work: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T> + Send,
        T: Send,
    {
        self.transaction(stores, Mode::Read, work).await
    }

    /// Handle for single-store operations outside an explicit transaction.
    pub fn store(&self, name: impl Into<StoreName>) -> StoreRef {
        StoreRef {
            db: self.clone(),
            name: name.into(),
        }
    }

    /// Subscribe to committed changes.
    pub fn changes(&self) -> broadcast::Receiver<Change> {
        self.inner.feed.subscribe()
    }

    fn scope(&self, stores: &[&str]) -> Result<BTreeSet<StoreName>> {
        stores
            .iter()
            .map(|name| {
                if *name == META_STORE || self.inner.schema.store(name).is_some() {
                    Ok(name.to_string())
                } else {
                    Err(Error::StoreNotFound(name.to_string()))
                }
            })
            .collect()
    }

    // ========================================================================
    // Identity and watermarks
    // ========================================================================

    /// The client id of this database, created on first use.
    pub async fn client_id(&self) -> Result<ClientId> {
        self.inner.identity.get_or_create(self).await
    }

    /// Watermark of `store`; [`NEVER_SYNCED`](crate::NEVER_SYNCED) before
    /// the first pulled change.
    pub async fn synced_to(&self, store: &str) -> Result<Cursor> {
        if self.inner.schema.store(store).is_none() {
            return Err(Error::StoreNotFound(store.to_string()));
        }
        self.read(&[META_STORE], |tx| watermark::synced_to(tx, store))
            .await
    }

    // ========================================================================
    // Remote sync
    // ========================================================================

    /// Apply a sync configuration: a remote URL installs a WebSocket
    /// connector and a timeout becomes the default for every session.
    pub fn configure(&self, config: &SyncConfig) {
        if let Some(url) = &config.remote {
            self.set_remote(WsConnector::new(url.clone()));
        }
        *self.inner.session_defaults.write() = config.session_options();
    }

    /// Use `connector` to open a channel for each push and pull.
    pub fn set_remote(&self, connector: impl Connector + 'static) {
        *self.inner.remote.write() = Some(Arc::new(connector));
    }

    /// Whether a remote is configured.
    pub fn has_remote(&self) -> bool {
        self.inner.remote.read().is_some()
    }

    /// Send every dirty record of `stores` (all stores if empty) to the
    /// remote and wait until each is acknowledged. Opening the channel is
    /// bounded by the configured session timeout too.
    pub async fn push_to_remote(&self, stores: &[&str]) -> Result<PushReport> {
        let options = self.inner.session_defaults.read().clone();
        let mut channel = guarded(&options, self.connect()).await?;
        self.push_with(channel.as_mut(), stores, options).await
    }

    /// Fetch every change of `stores` (all stores if empty) past their
    /// watermarks from the remote and apply it.
    pub async fn pull_from_remote(&self, stores: &[&str]) -> Result<PullReport> {
        let options = self.inner.session_defaults.read().clone();
        let mut channel = guarded(&options, self.connect()).await?;
        self.pull_with(channel.as_mut(), stores, options).await
    }

    /// Push over an already open channel. The channel is closed afterwards.
    pub async fn push_with(
        &self,
        channel: &mut dyn Channel,
        stores: &[&str],
        options: SessionOptions,
    ) -> Result<PushReport> {
        let stores = self.sync_scope(stores)?;
        let result = sync::push::run(self, channel, &stores, &options).await;
        sync::finish(channel, "push", &result).await;
        result
    }

    /// Pull over an already open channel. The channel is closed afterwards.
    pub async fn pull_with(
        &self,
        channel: &mut dyn Channel,
        stores: &[&str],
        options: SessionOptions,
    ) -> Result<PullReport> {
        let stores = self.sync_scope(stores)?;
        let result = sync::pull::run(self, channel, &stores, &options).await;
        sync::finish(channel, "pull", &result).await;
        result
    }

    async fn connect(&self) -> Result<Box<dyn Channel>> {
        let connector = self.inner.remote.read().clone().ok_or(Error::NoRemote)?;
        connector.connect().await
    }

    fn sync_scope(&self, stores: &[&str]) -> Result<Vec<StoreName>> {
        if stores.is_empty() {
            return Ok(self.inner.schema.store_names());
        }
        let mut names = Vec::with_capacity(stores.len());
        for name in stores {
            if self.inner.schema.store(name).is_none() {
                return Err(Error::StoreNotFound(name.to_string()));
            }
            if !names.iter().any(|n: &StoreName| n == name) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

/// Create stores, indexes and meta records for `schema`, then run the
/// migration hooks above `from`.
fn upgrade(
    backend: &mut Backend,
    schema: &Schema,
    migrations: &Migrations,
    from: SchemaVersion,
) -> Result<()> {
    backend.ensure_store(&StoreDef::new(META_STORE))?;
    let meta = backend.store_mut(META_STORE)?;
    if !meta.contains(META_KEY) {
        meta.insert(identity::initial_record())?;
    }

    for def in schema.stores.values() {
        backend.ensure_store(&def.with_builtin_indexes())?;
        let meta = backend.store_mut(META_STORE)?;
        let key = watermark::meta_key(&def.name);
        if !meta.contains(&key) {
            meta.insert(watermark::initial_record(&def.name))?;
        }
    }

    let scope = backend.stores.keys().cloned().collect();
    let mut tx = Transaction::write(backend, scope);
    migrations.run(from, schema.version, &mut tx)?;
    drop(tx);

    backend.version = schema.version;
    Ok(())
}

/// Single-store handle; every call runs in its own transaction.
#[derive(Debug, Clone)]
pub struct StoreRef {
    db: Database,
    name: StoreName,
}

impl StoreRef {
    /// Store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self, key: &str) -> Result<Option<Record>> {
        self.db
            .read(&[self.name.as_str()], |tx| tx.store(&self.name)?.get(key))
            .await
    }

    pub async fn get_many<K: AsRef<str> + Sync>(&self, keys: &[K]) -> Result<Vec<Option<Record>>> {
        self.db
            .read(&[self.name.as_str()], |tx| tx.store(&self.name)?.get_many(keys))
            .await
    }

    pub async fn all(&self) -> Result<Vec<Record>> {
        self.db
            .read(&[self.name.as_str()], |tx| tx.store(&self.name)?.all())
            .await
    }

    pub async fn count(&self) -> Result<usize> {
        self.db
            .read(&[self.name.as_str()], |tx| tx.store(&self.name)?.count())
            .await
    }

    pub async fn put(&self, record: Record) -> Result<RecordKey> {
        self.db
            .transaction(&[self.name.as_str()], Mode::ReadWrite, |tx| {
                tx.store(&self.name)?.put(record)
            })
            .await
    }

    pub async fn add(&self, record: Record) -> Result<RecordKey> {
        self.db
            .transaction(&[self.name.as_str()], Mode::ReadWrite, |tx| {
                tx.store(&self.name)?.add(record)
            })
            .await
    }

    pub async fn put_many(&self, records: Vec<Record>) -> Result<Vec<RecordKey>> {
        self.db
            .transaction(&[self.name.as_str()], Mode::ReadWrite, |tx| {
                tx.store(&self.name)?.put_many(records)
            })
            .await
    }

    /// Records whose `index` value equals any of `values`.
    pub async fn index_get(&self, index: &str, values: &[Value]) -> Result<Vec<Record>> {
        self.db
            .read(&[self.name.as_str()], |tx| Ok(tx.store(&self.name)?.index(index)?.get(values)))
            .await
    }

    /// Records whose `index` value falls in any of `ranges`.
    pub async fn index_range(&self, index: &str, ranges: &[KeyRange]) -> Result<Vec<Record>> {
        self.db
            .read(&[self.name.as_str()], |tx| {
                Ok(tx.store(&self.name)?.index(index)?.range(ranges))
            })
            .await
    }
}
