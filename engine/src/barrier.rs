//! Completion barrier for fan-in over asynchronous steps.
//!
//! A [`Countdown`] holds a signed counter. Every [`Countdown::add`] that
//! leaves the counter at exactly zero fires the registered callback once.
//! Sync sessions add one per outstanding message and subtract one per
//! applied acknowledgement or change.

use parking_lot::Mutex;
use std::fmt;
use tokio::sync::oneshot;

type ZeroCallback = Box<dyn FnMut() + Send>;

struct State {
    value: i64,
    on_zero: Option<ZeroCallback>,
}

/// A counter that signals whenever it returns to zero.
pub struct Countdown {
    state: Mutex<State>,
}

impl Countdown {
    /// Create a countdown starting at `initial`.
    pub fn new(initial: i64) -> Self {
        Self {
            state: Mutex::new(State {
                value: initial,
                on_zero: None,
            }),
        }
    }

    /// Register the zero callback, replacing any previous one.
    ///
    /// Registering does not fire the callback even if the counter is
    /// already zero; only a later `add` landing on zero does.
    pub fn on_zero(&self, callback: impl FnMut() + Send + 'static) {
        self.state.lock().on_zero = Some(Box::new(callback));
    }

    /// Register a callback that completes the returned receiver the first
    /// time the counter lands on zero.
    pub fn zero_signal(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        self.on_zero(move || {
            if let Some(tx) = tx.take() {
                let _ = tx.send(());
            }
        });
        rx
    }

    /// Adjust the counter by `n` and return the new value.
    ///
    /// The callback runs outside the lock, so it may call back into this
    /// countdown.
    pub fn add(&self, n: i64) -> i64 {
        let mut callback = {
            let mut state = self.state.lock();
            state.value += n;
            if state.value != 0 {
                return state.value;
            }
            match state.on_zero.take() {
                Some(callback) => callback,
                None => return 0,
            }
        };

        callback();

        let mut state = self.state.lock();
        if state.on_zero.is_none() {
            state.on_zero = Some(callback);
        }
        state.value
    }

    /// Current counter value.
    pub fn value(&self) -> i64 {
        self.state.lock().value
    }

    /// Whether the counter is at zero.
    pub fn is_zero(&self) -> bool {
        self.value() == 0
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Countdown")
            .field("value", &state.value)
            .field("has_callback", &state.on_zero.is_some())
            .finish()
    }
}
