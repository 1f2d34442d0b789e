//! WebSocket transport.

use super::{
    channel::{Channel, ChannelEvent, Connector},
    protocol::Message,
};
use crate::{error::Result, Error};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message as Frame},
    MaybeTlsStream, WebSocketStream,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens a WebSocket per session.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// `url` may omit the scheme, in which case `ws://` is assumed.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let url = if url.contains("://") {
            url
        } else {
            format!("ws://{url}")
        };
        Self { url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Channel>> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::Channel(format!("connect to {}: {e}", self.url)))?;
        tracing::debug!(url = %self.url, "websocket connected");
        Ok(Box::new(WsChannel::new(socket)))
    }
}

/// A sync channel over a client WebSocket.
pub struct WsChannel {
    socket: Socket,
    closed: bool,
}

impl WsChannel {
    pub fn new(socket: Socket) -> Self {
        Self {
            socket,
            closed: false,
        }
    }
}

#[async_trait]
impl Channel for WsChannel {
    async fn send(&mut self, message: &Message) -> Result<()> {
        if self.closed {
            return Err(Error::ChannelClosed);
        }
        let text = message.encode()?;
        self.socket
            .send(Frame::Text(text))
            .await
            .map_err(|e| match e {
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                    Error::ChannelClosed
                }
                other => Error::Channel(other.to_string()),
            })
    }

    async fn next_event(&mut self) -> ChannelEvent {
        loop {
            if self.closed {
                return ChannelEvent::Closed;
            }
            let frame = match self.socket.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(tungstenite::Error::ConnectionClosed)) | None => {
                    self.closed = true;
                    return ChannelEvent::Closed;
                }
                Some(Err(e)) => return ChannelEvent::Error(e.to_string()),
            };

            let decoded = match frame {
                Frame::Text(text) => Message::decode(&text),
                Frame::Binary(bytes) => Message::decode_bytes(&bytes),
                Frame::Close(_) => {
                    self.closed = true;
                    return ChannelEvent::Closed;
                }
                // Ping/pong are answered by tungstenite itself.
                _ => continue,
            };

            return match decoded {
                Ok(message) => ChannelEvent::Message(message),
                Err(e) => ChannelEvent::Invalid(e.to_string()),
            };
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.socket.close(None).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(Error::Channel(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_defaults_to_ws() {
        assert_eq!(WsConnector::new("localhost:3000/sync").url(), "ws://localhost:3000/sync");
        assert_eq!(WsConnector::new("wss://example.com").url(), "wss://example.com");
    }

    #[tokio::test]
    async fn connect_failure_is_a_channel_error() {
        let connector = WsConnector::new("127.0.0.1:1");
        assert!(matches!(connector.connect().await, Err(Error::Channel(_))));
    }
}
