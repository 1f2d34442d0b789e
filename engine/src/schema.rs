//! Schema declaration and migrations.
//!
//! A [`Schema`] names the stores of a database and their secondary indexes.
//! Opening a database at a higher version than the stored one creates any
//! missing stores and indexes, then runs the registered [`Migrations`] for
//! each version step inside the same upgrade transaction.

use crate::{error::Result, Error, SchemaVersion, StoreName, Transaction, META_STORE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the built-in index over the dirty flag, added to every store.
pub const CHANGED_SINCE_SYNC_INDEX: &str = "changedSinceSync";

/// Definition of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDef {
    /// Index name, unique within its store
    pub name: String,
    /// Field path the index projects; dotted paths reach nested objects
    pub key_path: String,
    /// Whether two records may share an index value
    #[serde(default)]
    pub unique: bool,
}

impl IndexDef {
    /// Create a non-unique index.
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            unique: false,
        }
    }

    /// Create a unique index.
    pub fn unique(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            unique: true,
            ..Self::new(name, key_path)
        }
    }
}

/// Definition of a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDef {
    /// Store name
    pub name: StoreName,
    /// Secondary indexes
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

impl StoreDef {
    /// Create a store definition without indexes.
    pub fn new(name: impl Into<StoreName>) -> Self {
        Self {
            name: name.into(),
            indexes: Vec::new(),
        }
    }

    /// Add a non-unique index.
    pub fn with_index(mut self, name: impl Into<String>, key_path: impl Into<String>) -> Self {
        self.indexes.push(IndexDef::new(name, key_path));
        self
    }

    /// Add a unique index.
    pub fn with_unique_index(
        mut self,
        name: impl Into<String>,
        key_path: impl Into<String>,
    ) -> Self {
        self.indexes.push(IndexDef::unique(name, key_path));
        self
    }

    /// Look up an index by name.
    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// The declared indexes plus the built-in dirty-flag index.
    pub(crate) fn with_builtin_indexes(&self) -> StoreDef {
        let mut def = self.clone();
        if def.index(CHANGED_SINCE_SYNC_INDEX).is_none() {
            def.indexes.push(IndexDef::new(
                CHANGED_SINCE_SYNC_INDEX,
                crate::record::CHANGED_FIELD,
            ));
        }
        def
    }
}

/// Versioned set of store declarations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Schema version; opening with a higher version triggers an upgrade
    pub version: SchemaVersion,
    /// Store definitions by name
    pub stores: BTreeMap<StoreName, StoreDef>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            version,
            stores: BTreeMap::new(),
        }
    }

    /// Add a store to the schema.
    pub fn add_store(&mut self, store: StoreDef) -> &mut Self {
        self.stores.insert(store.name.clone(), store);
        self
    }

    /// Builder-style method to add a store.
    pub fn with_store(mut self, store: StoreDef) -> Self {
        self.add_store(store);
        self
    }

    /// Get a store definition by name.
    pub fn store(&self, name: &str) -> Option<&StoreDef> {
        self.stores.get(name)
    }

    /// Names of the declared stores, in order.
    pub fn store_names(&self) -> Vec<StoreName> {
        self.stores.keys().cloned().collect()
    }

    /// Check the schema for reserved names and duplicate indexes.
    pub fn validate(&self) -> Result<()> {
        if self.version == 0 {
            return Err(Error::InvalidSchema("version must be at least 1".into()));
        }

        for (name, def) in &self.stores {
            if name == META_STORE {
                return Err(Error::InvalidSchema(format!(
                    "store name '{META_STORE}' is reserved"
                )));
            }
            if name != &def.name {
                return Err(Error::InvalidSchema(format!(
                    "store '{}' registered under '{name}'",
                    def.name
                )));
            }
            for (i, index) in def.indexes.iter().enumerate() {
                if def.indexes[..i].iter().any(|other| other.name == index.name) {
                    return Err(Error::InvalidSchema(format!(
                        "duplicate index '{}' on store '{name}'",
                        index.name
                    )));
                }
            }
        }

        Ok(())
    }
}

type MigrationFn = Box<dyn Fn(&mut Transaction<'_>) -> Result<()> + Send + Sync>;

/// Migration hooks keyed by the version they upgrade to.
#[derive(Default)]
pub struct Migrations {
    steps: BTreeMap<SchemaVersion, MigrationFn>,
}

impl Migrations {
    /// No migrations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the hook that upgrades the database to `version`.
    pub fn on(
        mut self,
        version: SchemaVersion,
        step: impl Fn(&mut Transaction<'_>) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.steps.insert(version, Box::new(step));
        self
    }

    /// Run every hook in `(from, to]` in ascending version order.
    pub(crate) fn run(
        &self,
        from: SchemaVersion,
        to: SchemaVersion,
        tx: &mut Transaction<'_>,
    ) -> Result<()> {
        if from >= to {
            return Ok(());
        }
        for (version, step) in self.steps.range(from + 1..=to) {
            tracing::debug!(version, "running migration");
            step(tx)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Migrations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migrations")
            .field("versions", &self.steps.keys().collect::<Vec<_>>())
            .finish()
    }
}
