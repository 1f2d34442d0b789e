//! Transport seam for sync sessions.
//!
//! A [`Connector`] opens one fresh [`Channel`] per session. A channel sends
//! protocol messages and yields [`ChannelEvent`]s; sessions treat anything
//! but a decoded message as fatal.

use super::protocol::Message;
use crate::{error::Result, Error};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Something a channel observed.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A decoded message
    Message(Message),
    /// A frame that did not decode, with the decoder's complaint
    Invalid(String),
    /// A transport failure
    Error(String),
    /// The peer closed the channel
    Closed,
}

/// A bidirectional message transport.
#[async_trait]
pub trait Channel: Send {
    /// Send one message.
    async fn send(&mut self, message: &Message) -> Result<()>;

    /// Wait for the next event. Once `Closed` has been returned every later
    /// call returns `Closed` too.
    async fn next_event(&mut self) -> ChannelEvent;

    /// Close the channel.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens channels to a remote.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Channel>>;
}

// ============================================================================
// In-memory transport
// ============================================================================

/// What the remote end of a memory channel pushes to the session side.
#[derive(Debug)]
enum Frame {
    Message(Message),
    Text(String),
    Error(String),
}

/// Session side of an in-memory channel.
#[derive(Debug)]
pub struct MemoryChannel {
    outbound: Option<mpsc::UnboundedSender<Message>>,
    inbound: mpsc::UnboundedReceiver<Frame>,
}

/// Remote side of an in-memory channel, used to script a server.
#[derive(Debug)]
pub struct MemoryPeer {
    outbound: Option<mpsc::UnboundedSender<Frame>>,
    inbound: mpsc::UnboundedReceiver<Message>,
}

/// Create a connected channel/peer pair.
pub fn memory_channel() -> (MemoryChannel, MemoryPeer) {
    let (to_peer, from_session) = mpsc::unbounded_channel();
    let (to_session, from_peer) = mpsc::unbounded_channel();
    (
        MemoryChannel {
            outbound: Some(to_peer),
            inbound: from_peer,
        },
        MemoryPeer {
            outbound: Some(to_session),
            inbound: from_session,
        },
    )
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send(&mut self, message: &Message) -> Result<()> {
        let sender = self.outbound.as_ref().ok_or(Error::ChannelClosed)?;
        sender
            .send(message.clone())
            .map_err(|_| Error::ChannelClosed)
    }

    async fn next_event(&mut self) -> ChannelEvent {
        match self.inbound.recv().await {
            Some(Frame::Message(message)) => ChannelEvent::Message(message),
            Some(Frame::Text(text)) => match Message::decode(&text) {
                Ok(message) => ChannelEvent::Message(message),
                Err(e) => ChannelEvent::Invalid(e.to_string()),
            },
            Some(Frame::Error(e)) => ChannelEvent::Error(e),
            None => ChannelEvent::Closed,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.outbound = None;
        self.inbound.close();
        Ok(())
    }
}

impl MemoryPeer {
    /// Deliver a message to the session side.
    pub fn send(&self, message: Message) -> Result<()> {
        self.push(Frame::Message(message))
    }

    /// Deliver a raw text frame, decoded on the session side.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.push(Frame::Text(text.into()))
    }

    /// Report a transport error to the session side.
    pub fn error(&self, reason: impl Into<String>) -> Result<()> {
        self.push(Frame::Error(reason.into()))
    }

    /// Close the channel from the remote end.
    pub fn close(&mut self) {
        self.outbound = None;
    }

    /// Next message sent by the session, or `None` once it closed.
    pub async fn recv(&mut self) -> Option<Message> {
        self.inbound.recv().await
    }

    fn push(&self, frame: Frame) -> Result<()> {
        let sender = self.outbound.as_ref().ok_or(Error::ChannelClosed)?;
        sender.send(frame).map_err(|_| Error::ChannelClosed)
    }
}

/// Connector handing out in-memory channels; the matching peers come out of
/// the paired [`MemoryListener`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

/// Receives the remote side of each channel a [`MemoryConnector`] opens.
#[derive(Debug)]
pub struct MemoryListener {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { peers: tx }, MemoryListener { peers: rx })
    }
}

impl MemoryListener {
    /// Wait for the next connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn Channel>> {
        let (channel, peer) = memory_channel();
        self.peers
            .send(peer)
            .map_err(|_| Error::Channel("memory listener dropped".into()))?;
        Ok(Box::new(channel))
    }
}
