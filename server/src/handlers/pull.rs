//! Pull handler - answers `get-changes`.

use syncdb_engine::{Cursor, Message};

use crate::store::RemoteStore;

/// The announcement followed by every change to send, in order.
pub async fn handle_get_changes(
    store: &RemoteStore,
    store_name: &str,
    client_id: &str,
    since: Cursor,
) -> Vec<Message> {
    let changes = store.changes_since(store_name, client_id, since).await;

    tracing::debug!(
        store = store_name,
        client_id,
        since,
        changes = changes.len(),
        "answering get-changes"
    );

    let mut replies = Vec::with_capacity(changes.len() + 1);
    replies.push(Message::SendingChanges {
        nr_of_records_to_sync: changes.len() as u64,
    });
    replies.extend(changes);
    replies
}
