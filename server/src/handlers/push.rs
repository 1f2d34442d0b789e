//! Push handler - accepts a client `create`.

use syncdb_engine::{Message, Record};

use crate::error::Result;
use crate::store::RemoteStore;

/// Store the record and build the `ok` acknowledgement.
pub async fn handle_create(
    store: &RemoteStore,
    store_name: String,
    client_id: Option<&str>,
    record: Record,
) -> Result<Message> {
    let key = record.key.clone().unwrap_or_default();
    let new_version = store.accept(&store_name, client_id, record).await?;

    Ok(Message::Ok {
        store_name,
        key,
        new_version,
    })
}
