//! Reconnect state machine.
//!
//! A reconnect request tears the link down and starts one background loop.
//! Each iteration counts an attempt, waits the configured delay and runs a
//! connection sequence. The loop ends on success, on a non-transient
//! failure, when the match ends, or by moving to `Aborted` once the attempt
//! budget is spent.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{AbortReason, ConnectionState, Shared};
use crate::error::FailureKind;

impl Shared {
    /// Start the reconnect loop unless one is running or the match is over.
    pub(super) fn request_reconnect(self: &Arc<Self>) -> bool {
        if self
            .reconnecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Reconnect already in progress");
            return false;
        }
        if self.context.is_game_over() {
            debug!("Skipping reconnect, match is over");
            self.release_link();
            self.state.transition(ConnectionState::Idle);
            self.reconnecting.store(false, Ordering::Release);
            return false;
        }
        if !self.state.transition(ConnectionState::Reconnecting) {
            self.reconnecting.store(false, Ordering::Release);
            return false;
        }

        self.release_link();
        self.clear_queues();

        let session = self.session_token();
        self.runtime.spawn(Arc::clone(self).reconnect_loop(session));
        true
    }

    async fn reconnect_loop(self: Arc<Self>, session: CancellationToken) {
        loop {
            if session.is_cancelled() {
                return;
            }

            let attempt = self.attempts.load(Ordering::Acquire);
            if attempt >= self.settings.max_reconnect_attempts {
                error!(attempts = attempt, "All connect attempts failed");
                self.abort(AbortReason::ReconnectExhausted { attempts: attempt });
                return;
            }

            let attempt = attempt + 1;
            self.attempts.store(attempt, Ordering::Release);
            self.metrics.reconnect_attempt();
            self.lifecycle.reconnecting(attempt);
            self.set_read_timeout(self.settings.read_timeout);

            info!(
                attempt,
                delay = ?self.settings.reconnect_delay,
                "Waiting before reconnect attempt"
            );
            tokio::select! {
                _ = session.cancelled() => return,
                _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
            }

            if self.context.is_game_over() {
                debug!("Match ended while waiting to reconnect");
                self.state.transition(ConnectionState::Idle);
                self.reconnecting.store(false, Ordering::Release);
                return;
            }
            if self
                .connecting
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                debug!("Another connection sequence is running");
                self.reconnecting.store(false, Ordering::Release);
                return;
            }

            let result = self.establish(&session).await;
            if session.is_cancelled() {
                return;
            }
            if !matches!(result, Ok(true)) {
                self.connecting.store(false, Ordering::Release);
            }

            match result {
                Ok(true) => {
                    info!(attempt, "Reconnected");
                    return;
                }
                Ok(false) => {
                    self.reconnecting.store(false, Ordering::Release);
                    return;
                }
                Err(e) => match e.failure_kind() {
                    FailureKind::Transient => {
                        warn!(attempt, error = %e, "Reconnect attempt failed");
                        self.state.transition(ConnectionState::Reconnecting);
                    }
                    FailureKind::PeerClosed => {
                        self.abort(AbortReason::PeerClosed);
                        return;
                    }
                    FailureKind::Fatal => {
                        self.abort(AbortReason::Fatal(e.to_string()));
                        return;
                    }
                },
            }
        }
    }
}
