//! Session plumbing shared by push and pull.
//!
//! A session sends its requests, then consumes channel events one at a time
//! until its [`Countdown`] returns to zero. It fails on the first protocol or
//! channel error, on cancellation and when its deadline passes.

use super::{
    channel::{Channel, ChannelEvent},
    protocol::Message,
};
use crate::{barrier::Countdown, error::Result, Error};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};

/// Cancels every session it is attached to.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
        }
    }

    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.flag.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-session options.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Fail the session if it has not completed after this long
    pub timeout: Option<Duration>,
    /// Fail the session when this token is cancelled
    pub cancel: Option<CancelToken>,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Applies the messages of one session kind.
#[async_trait]
pub(crate) trait SessionHandler: Send {
    async fn handle(&mut self, message: Message, countdown: &Countdown) -> Result<()>;
}

/// Run `work` under the cancel token and deadline of `options`.
pub(crate) async fn guarded<T>(
    options: &SessionOptions,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    let cancelled = async {
        match &options.cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };
    let deadline = async {
        match options.timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancelled => Err(Error::Cancelled),
        _ = deadline => Err(Error::Timeout(options.timeout.unwrap_or_default())),
        result = work => result,
    }
}

/// Consume channel events until the countdown fires.
pub(crate) async fn drive(
    channel: &mut dyn Channel,
    countdown: &Countdown,
    mut done: oneshot::Receiver<()>,
    handler: &mut dyn SessionHandler,
) -> Result<()> {
    loop {
        let event = tokio::select! {
            biased;
            _ = &mut done => return Ok(()),
            event = channel.next_event() => event,
        };

        match event {
            ChannelEvent::Message(message) => {
                tracing::trace!(kind = message.kind(), "message received");
                handler.handle(message, countdown).await?;
            }
            ChannelEvent::Invalid(reason) => {
                return Err(Error::Protocol(format!("malformed message: {reason}")));
            }
            ChannelEvent::Error(reason) => return Err(Error::Channel(reason)),
            ChannelEvent::Closed => return Err(Error::ChannelClosed),
        }
    }
}
