//! Connection state machine.
//!
//! ```text
//!            forced connect / reset (from any state)
//!   ┌──────────────────────────────────────────────────┐
//!   ▼                                                  │
//! Idle ──▶ Connecting ──▶ Connected                    │
//!              │  ▲           │                        │
//!              ▼  │           ▼                        │
//!          Reconnecting ◀─────┘                        │
//!              │                                       │
//!              ▼                                       │
//!           Aborted ───────────────────────────────────┘
//! ```
//!
//! `Connecting` and `Connected` may also go straight to `Aborted` on a fatal
//! error or when the peer closes the session.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Idle = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
    Aborted = 4,
}

impl ConnectionState {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        if self == next || next == Idle {
            return true;
        }
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Connected)
                | (Connecting, Reconnecting)
                | (Connecting, Aborted)
                | (Connected, Reconnecting)
                | (Connected, Aborted)
                | (Reconnecting, Connecting)
                | (Reconnecting, Aborted)
        )
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            4 => ConnectionState::Aborted,
            _ => ConnectionState::Idle,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Lock-free holder of the current [`ConnectionState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ConnectionState::Idle as u8))
    }

    pub(crate) fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `next` if the transition is legal. Returns whether it happened.
    pub(crate) fn transition(&self, next: ConnectionState) -> bool {
        self.update(next, |current| current.can_transition_to(next))
    }

    /// Like [`transition`](Self::transition), but fails when already in
    /// `next`, so exactly one caller wins.
    pub(crate) fn enter(&self, next: ConnectionState) -> bool {
        self.update(next, |current| {
            current != next && current.can_transition_to(next)
        })
    }

    fn update(&self, next: ConnectionState, allowed: impl Fn(ConnectionState) -> bool) -> bool {
        let result = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                allowed(ConnectionState::from_u8(raw)).then_some(next as u8)
            });
        match result {
            Ok(previous) => {
                let previous = ConnectionState::from_u8(previous);
                if previous != next {
                    debug!(from = %previous, to = %next, "Connection state changed");
                }
                true
            }
            Err(current) => {
                debug!(from = %ConnectionState::from_u8(current), to = %next, "Rejected state transition");
                false
            }
        }
    }
}
