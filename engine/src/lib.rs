//! # SyncDB Engine
//!
//! An offline-first replication engine for a local transactional store.
//!
//! Local writes are accepted immediately and marked dirty. A push session
//! later sends every dirty record to the authoritative server and clears the
//! flag once the server acknowledges it; a pull session asks the server for
//! everything past the per-store watermark and applies it transactionally.
//!
//! ## Core Concepts
//!
//! ### Records and stores
//!
//! A [`Record`] is a JSON object with three reserved fields: `key`,
//! `version` (assigned by the server) and `changedSinceSync`. Records live in
//! named stores declared by a [`Schema`], each with optional secondary
//! indexes plus a built-in `changedSinceSync` index.
//!
//! ### Transactions
//!
//! [`Database::transaction`] runs a unit of work over a set of stores
//! atomically. Change events ([`Change`]) are broadcast only after commit.
//!
//! ### Sync sessions
//!
//! - [`Database::push_to_remote`] sends dirty records and waits for every `ok`
//! - [`Database::pull_from_remote`] requests changes since each store's
//!   watermark and waits until the announced count has been applied
//!
//! Both are driven by a [`Countdown`] and fail explicitly on protocol
//! errors, channel loss, cancellation or timeout. Nothing is retried.
//!
//! ## Quick Start
//!
//! ```rust
//! use syncdb_engine::{Database, Migrations, Mode, Record, Schema, StoreDef};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> syncdb_engine::Result<()> {
//! let schema = Schema::new(1).with_store(StoreDef::new("notes").with_index("byTitle", "title"));
//! let db = Database::open("app", schema, Migrations::new()).await?;
//!
//! let key = db
//!     .transaction(&["notes"], Mode::ReadWrite, |tx| {
//!         tx.store("notes")?.put(Record::from_value(json!({"title": "hello"}))?)
//!     })
//!     .await?;
//!
//! let note = db.store("notes").get(&key).await?.unwrap();
//! assert!(note.changed_since_sync);
//! # Ok(())
//! # }
//! ```

pub mod barrier;
pub mod change;
pub mod config;
pub mod database;
pub mod diff;
pub mod error;
pub mod identity;
pub mod index;
pub mod record;
pub mod schema;
pub mod snapshot;
mod store;
pub mod sync;
pub mod transaction;
pub mod watermark;

// Re-export main types at crate root
pub use barrier::Countdown;
pub use change::{Change, ChangeKind, WriteMode};
pub use config::{ConfigError, SyncConfig};
pub use database::{Database, StoreRef};
pub use diff::Diff;
pub use error::{Error, Result};
pub use identity::ClientIdentity;
pub use index::{IndexKey, KeyRange};
pub use record::Record;
pub use schema::{IndexDef, Migrations, Schema, StoreDef, CHANGED_SINCE_SYNC_INDEX};
pub use snapshot::{DatabaseSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use sync::{
    memory_channel, CancelToken, Channel, ChannelEvent, Connector, MemoryChannel,
    MemoryConnector, MemoryListener, MemoryPeer, Message, PullReport, PushReport,
    SessionOptions, WsChannel, WsConnector,
};
pub use transaction::{IndexHandle, Mode, StoreHandle, Transaction};
pub use watermark::NEVER_SYNCED;

/// Type aliases for clarity
pub type StoreName = String;
pub type RecordKey = String;
pub type Version = u64;
pub type SchemaVersion = u32;
pub type ClientId = String;
/// Server-issued sync position; [`NEVER_SYNCED`] before the first pull.
pub type Cursor = i64;

/// Name of the reserved store holding the client identity and watermarks.
pub const META_STORE: &str = "sdbMetaData";
