//! WebSocket connection tracking.
//!
//! Every sync client holds one WebSocket to `/sync`; the manager keeps the
//! per-connection outbound queues the handlers reply through.

mod manager;

pub use manager::{Connection, ConnectionManager, MessageSender};
