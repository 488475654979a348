//! Observable connection lifecycle.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Lifecycle state of a [`RealtimeClient`](crate::RealtimeClient).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// A connection attempt is in flight.
    Connecting,
    /// The socket is open; sends are transmitted and heartbeats run.
    Open,
    /// No socket. Initial state, and the state after a loss or shutdown.
    #[default]
    Closed,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
    /// Reconnection gave up. Terminal.
    Exhausted,
}

impl ConnectionState {
    /// Whether outbound messages are transmitted in this state.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether the client will never connect again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Exhausted)
    }

    /// Wire and log name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Reconnecting => "reconnecting",
            Self::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared between the client handle and its driver task.
///
/// Only the driver writes; handles read.
#[derive(Debug)]
pub(crate) struct SharedState {
    state: watch::Sender<ConnectionState>,
    attempts: AtomicU32,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        Self {
            state,
            attempts: AtomicU32::new(0),
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn set(&self, next: ConnectionState) {
        let _ = self.state.send_replace(next);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    pub(crate) fn set_attempts(&self, attempts: u32) {
        self.attempts.store(attempts, Ordering::Release);
    }
}
