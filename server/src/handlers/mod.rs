//! Request handlers for sync operations.

mod pull;
mod push;
mod websocket;

pub use pull::*;
pub use push::*;
pub use websocket::*;

use syncdb_engine::Message;

use crate::error::{AppError, Result};
use crate::AppState;

/// Dispatch one client message and return the replies in send order.
pub async fn process_message(state: &AppState, message: Message) -> Result<Vec<Message>> {
    match message {
        Message::Create {
            store_name,
            client_id,
            record,
            ..
        } => {
            let ack = handle_create(&state.store, store_name, client_id.as_deref(), record).await?;
            Ok(vec![ack])
        }

        Message::GetChanges {
            store_name,
            client_id,
            since,
        } => {
            Ok(handle_get_changes(&state.store, &store_name, &client_id, since).await)
        }

        other => Err(AppError::BadRequest(format!(
            "'{}' is not a client message",
            other.kind()
        ))),
    }
}
