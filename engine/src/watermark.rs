//! Per-store sync watermarks.
//!
//! Each store has a meta record `<store>Meta` in the meta store holding
//! `syncedTo`, the server cursor of the last change applied locally. The
//! cursor only moves forward and is written in the same transaction as the
//! change it accompanies.

use crate::{
    change::WriteMode, error::Result, record::Record, Cursor, Transaction, META_STORE,
};
use serde_json::Value;

/// Cursor of a store that has never pulled.
pub const NEVER_SYNCED: Cursor = -1;

const SYNCED_TO_FIELD: &str = "syncedTo";

pub(crate) fn meta_key(store: &str) -> String {
    format!("{store}Meta")
}

/// Meta record written when a store is created.
pub(crate) fn initial_record(store: &str) -> Record {
    Record::new()
        .with_key(meta_key(store))
        .with(SYNCED_TO_FIELD, NEVER_SYNCED)
}

/// Current watermark of `store`. The transaction must cover the meta store.
pub fn synced_to(tx: &mut Transaction<'_>, store: &str) -> Result<Cursor> {
    let meta = tx.store(META_STORE)?.get(&meta_key(store))?;
    Ok(meta
        .as_ref()
        .and_then(|r| r.get(SYNCED_TO_FIELD))
        .and_then(Value::as_i64)
        .unwrap_or(NEVER_SYNCED))
}

/// Move the watermark of `store` to `cursor` and return the stored value.
///
/// A cursor at or below the current one leaves the watermark unchanged.
pub fn advance(tx: &mut Transaction<'_>, store: &str, cursor: Cursor) -> Result<Cursor> {
    let current = synced_to(tx, store)?;
    if cursor < current {
        tracing::warn!(store, cursor, current, "ignoring watermark below the stored one");
        return Ok(current);
    }
    if cursor == current {
        return Ok(current);
    }

    let mut meta = tx
        .store(META_STORE)?
        .get(&meta_key(store))?
        .unwrap_or_else(|| initial_record(store));
    meta.set(SYNCED_TO_FIELD, cursor);
    tx.store(META_STORE)?.write(meta, WriteMode::Silent)?;

    tracing::trace!(store, cursor, "watermark advanced");
    Ok(cursor)
}
