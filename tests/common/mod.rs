//! Shared harness for integration tests: in-memory transports behind the
//! `Connector` seam and a lifecycle sink that records every notification.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use match_sync::client::{AbortReason, MatchLifecycle, SyncClient};
use match_sync::config::{ClientConfig, ConnectionConfig};
use match_sync::core::codec::FrameCodec;
use match_sync::core::message::Message;
use match_sync::core::packet::Packet;
use match_sync::error::{ProtocolError, Result};
use match_sync::transport::{BoxedStream, Connector};
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;

pub fn fast_settings() -> ClientConfig {
    ClientConfig {
        read_timeout: Duration::from_secs(2),
        match_read_timeout: Duration::from_secs(2),
        write_timeout: Duration::from_millis(300),
        connect_timeout: Duration::from_millis(300),
        keepalive_interval: Duration::from_millis(50),
        max_reconnect_attempts: 3,
        reconnect_delay: Duration::from_millis(30),
        send_retry_limit: 1,
    }
}

pub fn connection() -> ConnectionConfig {
    ConnectionConfig::new("localhost", 7777, "match-1", "token-1", 7, vec![0x04; 65])
}

/// Poll `condition` until it holds or `deadline` passes.
pub async fn wait_until<F: FnMut() -> bool>(deadline: Duration, mut condition: F) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Hands every client stream's peer end to the test.
pub struct DuplexConnector {
    servers: mpsc::UnboundedSender<DuplexStream>,
    capacity: usize,
    /// Calls that fail with a refused connection before streams are handed out.
    failures: AtomicUsize,
    pub calls: AtomicUsize,
}

impl DuplexConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
        Self::build(128 * 1024, 0)
    }

    /// Streams that buffer at most `capacity` bytes in each direction.
    pub fn with_capacity(capacity: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
        Self::build(capacity, 0)
    }

    /// Refuse the first `failures` calls.
    pub fn flaky(failures: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
        Self::build(128 * 1024, failures)
    }

    fn build(
        capacity: usize,
        failures: usize,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
        let (servers, accepted) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            servers,
            capacity,
            failures: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        });
        (connector, accepted)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Connector for DuplexConnector {
    fn connect<'a>(&'a self, _target: &'a ConnectionConfig) -> BoxFuture<'a, Result<BoxedStream>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let refused = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if refused {
                return Err(ProtocolError::Io(io::Error::from(io::ErrorKind::ConnectionRefused)));
            }
            let (client, server) = tokio::io::duplex(self.capacity);
            self.servers
                .send(server)
                .map_err(|_| ProtocolError::Io(io::Error::from(io::ErrorKind::ConnectionRefused)))?;
            let stream: BoxedStream = Box::new(client);
            Ok(stream)
        }
        .boxed()
    }
}

/// The first call waits until [`release`](Self::release) and is then
/// refused; every later call hands out a stream like [`DuplexConnector`].
pub struct StallingConnector {
    streams: Arc<DuplexConnector>,
    gate: tokio::sync::Notify,
    pub calls: AtomicUsize,
}

impl StallingConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
        let (streams, accepted) = DuplexConnector::new();
        let connector = Arc::new(Self {
            streams,
            gate: tokio::sync::Notify::new(),
            calls: AtomicUsize::new(0),
        });
        (connector, accepted)
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Connector for StallingConnector {
    fn connect<'a>(&'a self, target: &'a ConnectionConfig) -> BoxFuture<'a, Result<BoxedStream>> {
        async move {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.gate.notified().await;
                return Err(ProtocolError::Io(io::Error::from(io::ErrorKind::ConnectionRefused)));
            }
            self.streams.connect(target).await
        }
        .boxed()
    }
}

/// Refuses every connection.
#[derive(Default)]
pub struct RefusingConnector {
    pub calls: AtomicUsize,
}

impl RefusingConnector {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Connector for RefusingConnector {
    fn connect<'a>(&'a self, _target: &'a ConnectionConfig) -> BoxFuture<'a, Result<BoxedStream>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProtocolError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))
        }
        .boxed()
    }
}

#[derive(Default)]
pub struct RecordingLifecycle {
    pub connected: AtomicUsize,
    pub reconnecting: Mutex<Vec<u32>>,
    pub aborted: Mutex<Vec<AbortReason>>,
}

impl RecordingLifecycle {
    pub fn connected_count(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn reconnects(&self) -> Vec<u32> {
        self.reconnecting.lock().unwrap().clone()
    }

    pub fn aborts(&self) -> Vec<AbortReason> {
        self.aborted.lock().unwrap().clone()
    }
}

impl MatchLifecycle for RecordingLifecycle {
    fn connected(&self) {
        self.connected.fetch_add(1, Ordering::SeqCst);
    }

    fn reconnecting(&self, attempt: u32) {
        self.reconnecting.lock().unwrap().push(attempt);
    }

    fn aborted(&self, reason: &AbortReason) {
        self.aborted.lock().unwrap().push(reason.clone());
    }
}

/// Server end of one in-memory session.
pub struct ServerSide {
    pub frames: FramedRead<ReadHalf<DuplexStream>, FrameCodec>,
    pub writer: WriteHalf<DuplexStream>,
}

impl ServerSide {
    /// Accept the next client stream and consume its handshake.
    pub async fn accept(accepted: &mut mpsc::UnboundedReceiver<DuplexStream>) -> (Self, Message) {
        let stream = tokio::time::timeout(Duration::from_secs(2), accepted.recv())
            .await
            .expect("client connects")
            .expect("connector alive");
        let (read, writer) = tokio::io::split(stream);
        let mut server = Self {
            frames: FramedRead::new(read, FrameCodec),
            writer,
        };
        let handshake = server.next_message().await;
        (server, handshake)
    }

    pub async fn next_packet(&mut self) -> Packet {
        tokio::time::timeout(Duration::from_secs(2), self.frames.next())
            .await
            .expect("frame arrives")
            .expect("stream open")
            .expect("valid frame")
    }

    pub async fn next_message(&mut self) -> Message {
        Message::from_packet(&self.next_packet().await).expect("known message")
    }

    pub async fn send(&mut self, message: &Message) {
        use tokio::io::AsyncWriteExt;
        let bytes = message.to_packet().unwrap().to_bytes().unwrap();
        self.writer.write_all(&bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }
}

pub fn client_with(
    connector: Arc<dyn Connector>,
    lifecycle: Arc<RecordingLifecycle>,
    settings: ClientConfig,
) -> SyncClient {
    SyncClient::builder()
        .settings(settings)
        .connector(connector)
        .lifecycle(lifecycle)
        .build()
        .expect("client builds")
}
