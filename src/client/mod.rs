//! # Match Sync Client
//!
//! Connection manager for one match session. It owns the encrypted stream,
//! runs the read and write pipelines, and drives the reconnect state
//! machine.
//!
//! ## Threading
//! Public operations never block: connecting, reconnecting, reading and
//! writing happen on tasks spawned onto the runtime that built the client.
//! The consumer polls [`SyncClient::try_receive`] from its own loop.
//!
//! Shared state is either a [`SafeQueue`] or an atomic flag. The only locks
//! are short critical sections around the stored configuration and the
//! current link, and the async writer lock that serializes bytes on the
//! wire.
//!
//! ## Example
//! ```rust,no_run
//! use match_sync::client::SyncClient;
//! use match_sync::config::ConnectionConfig;
//!
//! # async fn run() -> match_sync::error::Result<()> {
//! let client = SyncClient::builder().build()?;
//! client.connect(ConnectionConfig::new(
//!     "match.example.com",
//!     7777,
//!     "match-1",
//!     "token",
//!     42,
//!     vec![0x04; 65],
//! ))?;
//!
//! while let Some(packet) = client.try_receive() {
//!     println!("received {} bytes", packet.len());
//! }
//! # Ok(())
//! # }
//! ```

mod connection;
pub mod lifecycle;
mod reader;
mod reconnect;
pub mod state;
mod writer;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::WriteHalf;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ClientConfig, ConnectionConfig, SyncConfig, TlsSettings};
use crate::core::codec::{BincodeCodec, PacketCodec};
use crate::core::message::Message;
use crate::error::{ProtocolError, Result};
use crate::transport::tls::TlsTransport;
use crate::transport::{BoxedStream, Connector};
use crate::utils::metrics::Metrics;
use crate::utils::{SafeQueue, Watchdog};

pub use lifecycle::{AbortReason, MatchLifecycle, NoopLifecycle, SessionContext};
pub use state::ConnectionState;

/// Handle to one match connection. Cheap to clone.
///
/// Dropping the last handle disconnects, which stops the background tasks
/// and closes the stream.
#[derive(Clone)]
pub struct SyncClient {
    shared: Arc<Shared>,
    _teardown: Arc<Teardown>,
}

/// Disconnects when the last [`SyncClient`] handle goes away. Background
/// tasks hold their own `Arc<Shared>`, so `Shared` alone never drops while a
/// link is up.
struct Teardown(Arc<Shared>);

impl Drop for Teardown {
    fn drop(&mut self) {
        debug!("Last client handle dropped");
        self.0.disconnect(false);
    }
}

/// The live stream of one successful connection sequence.
struct Link {
    epoch: u64,
    cancel: CancellationToken,
    writer: Arc<tokio::sync::Mutex<WriteHalf<BoxedStream>>>,
    reader: Option<JoinHandle<()>>,
}

pub(crate) struct Shared {
    settings: ClientConfig,
    runtime: Handle,
    connector: Arc<dyn Connector>,
    codec: Arc<dyn PacketCodec>,
    context: Arc<SessionContext>,
    lifecycle: Arc<dyn MatchLifecycle>,
    metrics: Metrics,

    state: state::StateCell,
    connecting: AtomicBool,
    reconnecting: AtomicBool,
    write_in_flight: AtomicBool,
    timed_out: AtomicBool,
    socket_force_closed: AtomicBool,
    attempts: AtomicU32,
    read_timeout_ms: AtomicU64,
    link_epoch: AtomicU64,

    config: Mutex<Option<ConnectionConfig>>,
    link: Mutex<Option<Link>>,
    /// Cancelled whenever the consumer takes over (forced connect, disconnect, reset).
    session: Mutex<CancellationToken>,

    inbound: SafeQueue<Bytes>,
    outbound: SafeQueue<Bytes>,
    read_watchdog: Watchdog,
    write_watchdog: Watchdog,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn config(&self) -> MutexGuard<'_, Option<ConnectionConfig>> {
        lock(&self.config)
    }

    fn link(&self) -> MutexGuard<'_, Option<Link>> {
        lock(&self.link)
    }

    fn session_token(&self) -> CancellationToken {
        lock(&self.session).clone()
    }

    /// Cancel background work started for the previous session and return
    /// the token for the next one.
    fn renew_session(&self) -> CancellationToken {
        let mut session = lock(&self.session);
        session.cancel();
        *session = CancellationToken::new();
        session.clone()
    }

    fn is_connected(&self) -> bool {
        self.state.get() == ConnectionState::Connected
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.link_epoch.load(Ordering::Acquire) == epoch
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.load(Ordering::Relaxed))
    }

    fn set_read_timeout(&self, timeout: Duration) {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.read_timeout_ms.store(millis, Ordering::Relaxed);
    }

    fn arm_read_watchdog(&self) {
        self.read_watchdog.arm(self.read_timeout());
    }

    fn clear_queues(&self) {
        self.inbound.clear();
        self.outbound.clear();
    }

    fn on_read_timeout(self: &Arc<Self>) {
        if self.context.is_game_over() || self.context.is_app_paused() {
            debug!("Read timeout suppressed");
            return;
        }

        error!("Read timeout occurred");
        self.metrics.read_timeout();
        self.timed_out.store(true, Ordering::Release);
        self.connecting.store(false, Ordering::Release);
        self.request_reconnect();
    }

    fn on_write_timeout(self: &Arc<Self>) {
        error!("Write timeout occurred");
        self.metrics.write_timeout();
        self.write_in_flight.store(false, Ordering::Release);
        self.drain();
    }
}

impl SyncClient {
    pub fn builder() -> SyncClientBuilder {
        SyncClientBuilder::default()
    }

    /// Start a forced connection to `config`.
    ///
    /// Returns `Ok(false)` without doing anything when a connection is
    /// already being established or is live.
    pub fn connect(&self, config: ConnectionConfig) -> Result<bool> {
        let problems = config.validate();
        if !problems.is_empty() {
            return Err(ProtocolError::ConfigError(problems.join("; ")));
        }

        let shared = &self.shared;
        if shared.connecting.load(Ordering::Acquire) || shared.is_connected() {
            info!("Connect ignored, already connecting or connected");
            return Ok(false);
        }

        shared.clear_queues();
        *shared.config() = Some(config);
        shared.timed_out.store(false, Ordering::Release);
        shared.socket_force_closed.store(false, Ordering::Release);

        Ok(shared.attempt_connect(true))
    }

    /// Launch a connection sequence with the stored configuration.
    ///
    /// A forced attempt resets the attempt counter, cancels a pending
    /// reconnect and leaves `Aborted`. An unforced attempt is skipped once
    /// the match is over.
    pub fn attempt_connect(&self, force: bool) -> bool {
        self.shared.attempt_connect(force)
    }

    /// Close the stream and stop both watchdogs. Safe to call at any time.
    pub fn disconnect(&self, delete_connection_info: bool) {
        self.shared.disconnect(delete_connection_info);
    }

    /// Full teardown between matches.
    pub fn reset(&self) {
        self.shared.reset();
    }

    /// Pop the oldest inbound buffer, if any. Never blocks.
    pub fn try_receive(&self) -> Option<Bytes> {
        self.shared.inbound.try_dequeue()
    }

    /// Queue raw bytes for the write pipeline.
    pub fn send_core(&self, bytes: Bytes) -> Result<()> {
        if self.shared.send_core(bytes) {
            Ok(())
        } else {
            Err(ProtocolError::NotConnected)
        }
    }

    pub fn send_keep_alive(&self) -> Result<()> {
        self.send_live(Message::KeepAlive)
    }

    pub fn send_player_input(&self, new_score: i32) -> Result<()> {
        self.send_live(Message::PlayerInput { new_score })
    }

    pub fn send_chat(&self, chat_id: i16) -> Result<()> {
        self.send_live(Message::Chat { chat_id })
    }

    pub fn send_app_paused(&self) -> Result<()> {
        self.send_message(&Message::AppPaused)
    }

    pub fn send_app_resumed(&self) -> Result<()> {
        self.send_message(&Message::AppResumed)
    }

    pub fn send_forfeit(&self) -> Result<()> {
        self.send_message(&Message::Forfeit)
    }

    fn send_live(&self, message: Message) -> Result<()> {
        if self.shared.connecting.load(Ordering::Acquire) || !self.shared.is_connected() {
            return Err(ProtocolError::NotConnected);
        }
        self.send_message(&message)
    }

    /// Encode and queue any message the client may send.
    pub fn send(&self, message: &Message) -> Result<()> {
        self.send_message(message)
    }

    /// Encode and queue `message`, retrying a failed encode at most
    /// `send_retry_limit` times.
    fn send_message(&self, message: &Message) -> Result<()> {
        let opcode = message.opcode();
        if !opcode.is_client_bound() {
            return Err(ProtocolError::UnexpectedMessage(format!(
                "{opcode:?} is only sent by the server"
            )));
        }
        let mut retries = 0;
        loop {
            match self.shared.codec.encode(message) {
                Ok(bytes) => return self.send_core(bytes),
                Err(e) if retries < self.shared.settings.send_retry_limit => {
                    retries += 1;
                    warn!(error = %e, opcode = ?message.opcode(), retries, "Retrying send");
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    pub fn is_connecting(&self) -> bool {
        self.shared.connecting.load(Ordering::Acquire)
    }

    /// Reconnect attempts since the last forced connect or successful connection.
    pub fn attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::Acquire)
    }

    /// Whether the last recovery was triggered by the read watchdog.
    pub fn timed_out(&self) -> bool {
        self.shared.timed_out.load(Ordering::Acquire)
    }

    /// Whether the server closed the stream.
    pub fn socket_force_closed(&self) -> bool {
        self.shared.socket_force_closed.load(Ordering::Acquire)
    }

    pub fn connection_config(&self) -> Option<ConnectionConfig> {
        self.shared.config().clone()
    }

    pub fn read_timeout(&self) -> Duration {
        self.shared.read_timeout()
    }

    /// Change the read watchdog deadline, effective from the next arm.
    pub fn set_read_timeout(&self, timeout: Duration) {
        self.shared.set_read_timeout(timeout);
    }

    /// Restart the read watchdog with the current deadline.
    pub fn reset_read_watchdog(&self) {
        self.shared.read_watchdog.disarm();
        if self.shared.is_connected() {
            self.shared.arm_read_watchdog();
        }
    }

    pub fn stop_read_watchdog(&self) {
        self.shared.read_watchdog.disarm();
    }

    pub fn settings(&self) -> &ClientConfig {
        &self.shared.settings
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.shared.context
    }

    pub fn codec(&self) -> &Arc<dyn PacketCodec> {
        &self.shared.codec
    }

    pub fn metrics(&self) -> &Metrics {
        &self.shared.metrics
    }
}

/// Builder for [`SyncClient`].
#[derive(Default)]
pub struct SyncClientBuilder {
    settings: ClientConfig,
    tls: TlsSettings,
    connector: Option<Arc<dyn Connector>>,
    codec: Option<Arc<dyn PacketCodec>>,
    context: Option<Arc<SessionContext>>,
    lifecycle: Option<Arc<dyn MatchLifecycle>>,
    runtime: Option<Handle>,
}

impl SyncClientBuilder {
    /// Take client timings and TLS settings from a loaded configuration.
    pub fn config(mut self, config: &SyncConfig) -> Self {
        self.settings = config.client.clone();
        self.tls = config.tls.clone();
        self
    }

    pub fn settings(mut self, settings: ClientConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn tls(mut self, tls: TlsSettings) -> Self {
        self.tls = tls;
        self
    }

    /// Replace the TLS transport, e.g. with an in-memory stream for tests.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn codec(mut self, codec: Arc<dyn PacketCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn context(mut self, context: Arc<SessionContext>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn lifecycle(mut self, lifecycle: Arc<dyn MatchLifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Runtime for background tasks. Defaults to the current runtime.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<SyncClient> {
        let problems = self.settings.validate();
        if !problems.is_empty() {
            return Err(ProtocolError::ConfigError(problems.join("; ")));
        }

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| {
                ProtocolError::ConfigError(format!("SyncClient needs a Tokio runtime: {e}"))
            })?,
        };
        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(TlsTransport::new(self.tls)),
        };
        let codec: Arc<dyn PacketCodec> = match self.codec {
            Some(codec) => codec,
            None => Arc::new(BincodeCodec),
        };
        let lifecycle: Arc<dyn MatchLifecycle> = match self.lifecycle {
            Some(lifecycle) => lifecycle,
            None => Arc::new(NoopLifecycle),
        };
        let context = self.context.unwrap_or_default();
        let settings = self.settings;

        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let on_read = weak.clone();
            let read_watchdog = Watchdog::new("read", runtime.clone(), move || {
                if let Some(shared) = on_read.upgrade() {
                    shared.on_read_timeout();
                }
            });
            let on_write = weak.clone();
            let write_watchdog = Watchdog::new("write", runtime.clone(), move || {
                if let Some(shared) = on_write.upgrade() {
                    shared.on_write_timeout();
                }
            });

            let shared = Shared {
                runtime,
                connector,
                codec,
                context,
                lifecycle,
                metrics: Metrics::new(),
                state: state::StateCell::new(),
                connecting: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
                write_in_flight: AtomicBool::new(false),
                timed_out: AtomicBool::new(false),
                socket_force_closed: AtomicBool::new(false),
                attempts: AtomicU32::new(0),
                read_timeout_ms: AtomicU64::new(0),
                link_epoch: AtomicU64::new(0),
                config: Mutex::new(None),
                link: Mutex::new(None),
                session: Mutex::new(CancellationToken::new()),
                inbound: SafeQueue::new(),
                outbound: SafeQueue::new(),
                read_watchdog,
                write_watchdog,
                settings,
            };
            shared.set_read_timeout(shared.settings.read_timeout);
            shared
        });

        Ok(SyncClient {
            _teardown: Arc::new(Teardown(Arc::clone(&shared))),
            shared,
        })
    }
}
