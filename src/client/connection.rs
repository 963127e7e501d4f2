//! Connection sequence and teardown.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::{AbortReason, ConnectionState, Link, Shared};
use crate::core::message::Message;
use crate::error::{constants, FailureKind, ProtocolError, Result};
use crate::transport::BoxedStream;
use crate::utils::metrics::Timer;
use crate::utils::timeout::with_timeout;

impl Shared {
    pub(super) fn attempt_connect(self: &Arc<Self>, force: bool) -> bool {
        if self.is_connected() || self.connecting.load(Ordering::Acquire) {
            debug!("Already connecting or connected");
            return false;
        }

        let session = if force {
            self.attempts.store(0, Ordering::Release);
            self.reconnecting.store(false, Ordering::Release);
            self.state.transition(ConnectionState::Idle);
            self.renew_session()
        } else if self.context.is_game_over() {
            debug!("Skipping connect, match is over");
            return false;
        } else {
            self.session_token()
        };

        if self
            .connecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Already connecting");
            return false;
        }

        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            let result = shared.establish(&session).await;
            if session.is_cancelled() {
                debug!("Connection attempt superseded");
                return;
            }
            match result {
                Ok(true) => {}
                Ok(false) => shared.connecting.store(false, Ordering::Release),
                Err(e) => {
                    shared.connecting.store(false, Ordering::Release);
                    shared.handle_failure(e);
                }
            }
        });
        true
    }

    /// Run one connection sequence: transport, TLS with the pinned key, then
    /// the application handshake.
    ///
    /// Returns `Ok(false)` when `session` was cancelled while connecting; the
    /// fresh stream is dropped in that case.
    #[instrument(skip_all)]
    pub(super) async fn establish(self: &Arc<Self>, session: &CancellationToken) -> Result<bool> {
        let _timer = Timer::start("connect");
        self.metrics.connect_attempt();

        let config = self
            .config()
            .clone()
            .filter(|config| !config.is_disposed())
            .ok_or_else(|| ProtocolError::ConfigError(constants::ERR_MISSING_CONNECTION_INFO.into()))?;

        if !self.state.transition(ConnectionState::Connecting) {
            return Ok(false);
        }
        self.clear_queues();
        self.release_link();

        let handshake = self
            .codec
            .encode(&Message::Connect {
                user_id: config.user_id,
                match_id: config.match_id.clone(),
                match_token: config.match_token.clone(),
            })
            .map_err(|e| ProtocolError::HandshakeError(e.to_string()))?;

        info!(address = %config.address(), "Connecting to match server");
        let stream = with_timeout(self.settings.connect_timeout, async {
            let mut stream = self.connector.connect(&config).await?;
            stream.write_all(&handshake).await?;
            stream.flush().await?;
            Ok::<_, ProtocolError>(stream)
        })
        .await?;

        if !self.install_link(stream, session) {
            debug!("Connection superseded, dropping stream");
            return Ok(false);
        }

        self.metrics.connection_established();
        self.metrics.message_sent(handshake.len() as u64);
        info!("Connected to match server");
        self.lifecycle.connected();
        Ok(true)
    }

    /// Split `stream`, publish it as the current link and start reading.
    fn install_link(self: &Arc<Self>, stream: BoxedStream, session: &CancellationToken) -> bool {
        let (read_half, write_half) = tokio::io::split(stream);

        let mut link = self.link();
        if session.is_cancelled() || !self.state.transition(ConnectionState::Connected) {
            return false;
        }

        let epoch = self.link_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let cancel = session.child_token();
        self.connecting.store(false, Ordering::Release);
        self.attempts.store(0, Ordering::Release);
        self.reconnecting.store(false, Ordering::Release);
        self.write_in_flight.store(false, Ordering::Release);

        let reader = self.runtime.spawn(Arc::clone(self).read_loop(
            epoch,
            read_half,
            cancel.clone(),
        ));
        *link = Some(Link {
            epoch,
            cancel,
            writer: Arc::new(tokio::sync::Mutex::new(write_half)),
            reader: Some(reader),
        });
        true
    }

    /// Close the current stream, if any, and stop both watchdogs.
    ///
    /// Pending reads and writes of the released link complete as no-ops.
    pub(super) fn release_link(&self) {
        self.link_epoch.fetch_add(1, Ordering::AcqRel);
        if let Some(link) = self.link().take() {
            debug!(epoch = link.epoch, "Releasing stream");
            link.cancel.cancel();
            if let Some(reader) = link.reader {
                reader.abort();
            }
        }
        self.read_watchdog.disarm();
        self.write_watchdog.disarm();
        self.write_in_flight.store(false, Ordering::Release);
    }

    pub(super) fn disconnect(&self, delete_connection_info: bool) {
        info!("Disconnecting");
        self.renew_session();
        self.release_link();
        self.connecting.store(false, Ordering::Release);
        self.reconnecting.store(false, Ordering::Release);
        self.clear_queues();

        if delete_connection_info {
            if let Some(config) = self.config().as_mut() {
                config.dispose();
            }
        }

        if self.state.get() != ConnectionState::Aborted {
            self.state.transition(ConnectionState::Idle);
        }
    }

    pub(super) fn reset(&self) {
        self.disconnect(true);
        *self.config() = None;
        self.attempts.store(0, Ordering::Release);
        self.timed_out.store(false, Ordering::Release);
        self.socket_force_closed.store(false, Ordering::Release);
        self.set_read_timeout(self.settings.read_timeout);
        self.state.transition(ConnectionState::Idle);
    }

    /// Route a failure from the connection sequence or a live link.
    pub(super) fn handle_failure(self: &Arc<Self>, e: ProtocolError) {
        match e.failure_kind() {
            FailureKind::Transient => {
                warn!(error = %e, "Connection failed");
                self.request_reconnect();
            }
            FailureKind::PeerClosed => self.abort(AbortReason::PeerClosed),
            FailureKind::Fatal => self.abort(AbortReason::Fatal(e.to_string())),
        }
    }

    /// Give up on the match. Only the first call per session has an effect.
    pub(super) fn abort(&self, reason: AbortReason) {
        if !self.state.enter(ConnectionState::Aborted) {
            debug!(%reason, "Abort ignored");
            return;
        }

        error!(%reason, "Aborting match");
        self.release_link();
        self.connecting.store(false, Ordering::Release);
        self.reconnecting.store(false, Ordering::Release);
        self.metrics.abort();
        self.lifecycle.aborted(&reason);
    }
}
