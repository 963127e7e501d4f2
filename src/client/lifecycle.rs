//! Collaborators of the client that live outside the transport core.

use std::sync::atomic::{AtomicBool, Ordering};

use std::fmt;

/// Why the client gave up on the match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Every automatic reconnect attempt failed.
    ReconnectExhausted { attempts: u32 },
    /// The server closed the stream (zero-length read).
    PeerClosed,
    /// An unexpected failure; carries the diagnostic.
    Fatal(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::ReconnectExhausted { attempts } => {
                write!(f, "all {attempts} reconnect attempts failed")
            }
            AbortReason::PeerClosed => f.write_str("socket closed by the server before game over"),
            AbortReason::Fatal(diagnostic) => write!(f, "fatal error: {diagnostic}"),
        }
    }
}

/// Receives connection lifecycle notifications.
///
/// Callbacks run on background tasks. Implementations should only record the
/// event and let the consumer act on it from its own tick.
pub trait MatchLifecycle: Send + Sync + 'static {
    /// The application handshake was sent; the session is live.
    fn connected(&self) {}

    /// Automatic reconnect attempt `attempt` is about to start.
    fn reconnecting(&self, _attempt: u32) {}

    /// The match cannot continue. Always the last notification of a session.
    fn aborted(&self, _reason: &AbortReason) {}
}

/// Lifecycle sink that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLifecycle;

impl MatchLifecycle for NoopLifecycle {}

/// Match-wide flags shared between the client and its consumer.
#[derive(Debug, Default)]
pub struct SessionContext {
    game_over: AtomicBool,
    app_paused: AtomicBool,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over.load(Ordering::Acquire)
    }

    pub fn set_game_over(&self, game_over: bool) {
        self.game_over.store(game_over, Ordering::Release);
    }

    /// Whether the application is in the background.
    pub fn is_app_paused(&self) -> bool {
        self.app_paused.load(Ordering::Acquire)
    }

    pub fn set_app_paused(&self, paused: bool) {
        self.app_paused.store(paused, Ordering::Release);
    }
}
