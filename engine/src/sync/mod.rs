//! Replication sessions against a remote.
//!
//! - [`protocol`]: the JSON message envelope
//! - [`channel`]: the transport seam plus an in-memory implementation
//! - [`ws`]: WebSocket transport
//! - [`session`]: cancellation, timeouts and the event loop shared by
//!   push and pull
//! - `push` / `pull`: the two session kinds

pub mod channel;
pub mod protocol;
pub(crate) mod pull;
pub(crate) mod push;
pub mod session;
pub mod ws;

pub use channel::{
    memory_channel, Channel, ChannelEvent, Connector, MemoryChannel, MemoryConnector,
    MemoryListener, MemoryPeer,
};
pub use protocol::Message;
pub use pull::PullReport;
pub use push::PushReport;
pub use session::{CancelToken, SessionOptions};
pub use ws::{WsChannel, WsConnector};

use crate::error::Result;

/// Close the session channel and log how the session ended.
pub(crate) async fn finish<T: std::fmt::Debug>(
    channel: &mut dyn Channel,
    kind: &'static str,
    result: &Result<T>,
) {
    match result {
        Ok(report) => tracing::info!(session = kind, ?report, "sync session completed"),
        Err(e) => tracing::warn!(session = kind, error = %e, "sync session failed"),
    }
    if let Err(e) = channel.close().await {
        tracing::debug!(session = kind, error = %e, "closing channel failed");
    }
}
