//! WebSocket connection manager.
//!
//! Tracks active WebSocket connections and the outbound queue of each.

use std::sync::Arc;

use dashmap::DashMap;
use syncdb_engine::Message;
use tokio::sync::mpsc;

/// Sender for outgoing protocol messages.
pub type MessageSender = mpsc::UnboundedSender<Message>;

/// A single WebSocket connection.
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: String,
    /// Channel to send messages to this connection
    pub sender: MessageSender,
}

/// Manages active WebSocket connections.
///
/// Thread-safe and can be shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: DashMap<String, Connection>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a new connection and return its id.
    pub fn register(&self, sender: MessageSender) -> String {
        let conn_id = uuid::Uuid::new_v4().to_string();

        self.connections.insert(
            conn_id.clone(),
            Connection {
                id: conn_id.clone(),
                sender,
            },
        );

        tracing::info!(conn_id = %conn_id, "WebSocket connection registered");
        conn_id
    }

    /// Unregister a connection, dropping its sender.
    pub fn unregister(&self, conn_id: &str) {
        if let Some((_, conn)) = self.connections.remove(conn_id) {
            tracing::info!(conn_id = %conn.id, "WebSocket connection unregistered");
        }
    }

    /// Queue a message for one connection. Returns false if it is gone.
    pub fn send_to(&self, conn_id: &str, message: Message) -> bool {
        match self.connections.get(conn_id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Get the number of active connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> Message {
        Message::Ok {
            store_name: "notes".into(),
            key: "a".into(),
            new_version: 1,
        }
    }

    #[test]
    fn test_register_unregister() {
        let manager = ConnectionManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let conn_id = manager.register(tx);
        assert_eq!(manager.connection_count(), 1);

        manager.unregister(&conn_id);
        assert_eq!(manager.connection_count(), 0);
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_send_to() {
        let manager = ConnectionManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn_id = manager.register(tx);

        assert!(manager.send_to(&conn_id, ok()));
        assert_eq!(rx.try_recv().unwrap(), ok());

        assert!(!manager.send_to("missing", ok()));
        drop(rx);
        assert!(!manager.send_to(&conn_id, ok()));
    }
}
