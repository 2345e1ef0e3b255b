// crates/core/src/connection.rs
//! Connection state and the reconnect-forever retry machine.
//!
//! The machine holds no timers. The stream task drives it: report each
//! handshake result and each termination, sleep for the delay it returns,
//! then ask it to retry.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Fixed delay between a closure and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        })
    }
}

/// What the stream task publishes: the state, and how many handshakes have
/// succeeded so far. A watcher that misses intermediate states still sees a
/// new connection as a generation change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub generation: u64,
}

/// Connecting → Open → Closed → (delay) → Connecting, forever.
///
/// A failed handshake goes Connecting → Closed. There is no terminal state
/// and no growth in the delay.
#[derive(Debug, Clone)]
pub struct ReconnectMachine {
    state: ConnectionState,
    delay: Duration,
    /// Attempts since the last successful handshake, counting the current one.
    attempt: u32,
    /// Successful handshakes over the machine's lifetime.
    opened: u64,
}

impl ReconnectMachine {
    pub fn new(delay: Duration) -> Self {
        Self {
            state: ConnectionState::Connecting,
            delay,
            attempt: 1,
            opened: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn opened_count(&self) -> u64 {
        self.opened
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            generation: self.opened,
        }
    }

    /// Handshake succeeded. Returns false if the machine was not connecting.
    pub fn on_open(&mut self) -> bool {
        if self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Open;
        self.attempt = 0;
        self.opened += 1;
        true
    }

    /// The channel terminated, or the handshake failed. Returns the delay to
    /// wait before calling [`retry`](Self::retry).
    pub fn on_close(&mut self) -> Duration {
        self.state = ConnectionState::Closed;
        self.delay
    }

    /// Delay elapsed: start the next attempt. Returns false if the machine
    /// was not closed.
    pub fn retry(&mut self) -> bool {
        if self.state != ConnectionState::Closed {
            return false;
        }
        self.state = ConnectionState::Connecting;
        self.attempt = self.attempt.saturating_add(1);
        true
    }
}

impl Default for ReconnectMachine {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}
