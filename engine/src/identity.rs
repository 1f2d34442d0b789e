//! Client identity.
//!
//! Every local database gets one random client id, stored in the `meta`
//! record of the meta store and sent with each `create` and `get-changes`
//! so the server can tell clients apart. The id is created at most once:
//! concurrent first callers wait on the same initialization.

use crate::{
    change::WriteMode, error::Result, record::Record, ClientId, Database, Mode, Transaction,
    META_STORE,
};
use serde_json::Value;
use tokio::sync::OnceCell;

/// Key of the meta record holding the client id.
pub(crate) const META_KEY: &str = "meta";
const CLIENT_ID_FIELD: &str = "clientId";

/// Lazily created, process-cached client id.
#[derive(Debug, Default)]
pub struct ClientIdentity {
    cell: OnceCell<ClientId>,
}

impl ClientIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id, if it has been resolved in this process.
    pub fn cached(&self) -> Option<&ClientId> {
        self.cell.get()
    }

    /// Resolve the id, reading it from `db` or assigning a new one.
    pub async fn get_or_create(&self, db: &Database) -> Result<ClientId> {
        self.cell
            .get_or_try_init(|| async {
                db.transaction(&[META_STORE], Mode::ReadWrite, load_or_assign)
                    .await
            })
            .await
            .cloned()
    }
}

/// Meta record written when the database is first created.
pub(crate) fn initial_record() -> Record {
    Record::new().with_key(META_KEY)
}

fn load_or_assign(tx: &mut Transaction<'_>) -> Result<ClientId> {
    let mut meta = tx
        .store(META_STORE)?
        .get(META_KEY)?
        .unwrap_or_else(initial_record);

    if let Some(id) = meta.get(CLIENT_ID_FIELD).and_then(Value::as_str) {
        return Ok(id.to_string());
    }

    let id = uuid::Uuid::new_v4().to_string();
    meta.set(CLIENT_ID_FIELD, id.clone());
    tx.store(META_STORE)?.write(meta, WriteMode::Silent)?;

    tracing::info!(client_id = %id, "client identity assigned");
    Ok(id)
}
