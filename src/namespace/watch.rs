//! Command watchers
//!
//! Backs WAIT: a session registers interest in a command name and blocks
//! on a channel until another session executes that command in the same
//! namespace. No namespace lock is held while waiting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

/// Command name matching every command
pub const ANY_COMMAND: &str = "*";

struct Waiter {
    id: u64,
    command: String,
    tx: Sender<String>,
}

/// Registered WAIT callers of one namespace
#[derive(Default)]
pub struct Watchers {
    waiters: Mutex<Vec<Waiter>>,
    next_id: AtomicU64,
}

/// Pending registration returned by [`Watchers::subscribe`]
pub struct Subscription {
    id: u64,
    rx: Receiver<String>,
}

impl Watchers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `command` (case-insensitive, `*` for any)
    pub fn subscribe(&self, command: &str) -> Subscription {
        let (tx, rx) = channel::bounded(1);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.waiters.lock().push(Waiter {
            id,
            command: command.to_ascii_uppercase(),
            tx,
        });

        Subscription { id, rx }
    }

    /// Block until the subscription fires or `timeout` elapses
    ///
    /// Returns the name of the command that fired it.
    pub fn wait(&self, subscription: Subscription, timeout: Duration) -> Option<String> {
        match subscription.rx.recv_timeout(timeout) {
            Ok(command) => Some(command),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                self.waiters.lock().retain(|w| w.id != subscription.id);
                None
            }
        }
    }

    /// Wake every waiter interested in `command`
    pub fn notify(&self, command: &str) {
        let command = command.to_ascii_uppercase();
        let mut waiters = self.waiters.lock();

        waiters.retain(|w| {
            if w.command == command || w.command == ANY_COMMAND {
                // Receiver may have timed out already
                let _ = w.tx.try_send(command.clone());
                false
            } else {
                true
            }
        });
    }

    /// Number of sessions currently waiting
    pub fn waiting(&self) -> usize {
        self.waiters.lock().len()
    }
}
