//! Write pipeline.
//!
//! At most one message is in flight. The writer lock keeps bytes of
//! different messages from interleaving even after a write watchdog expiry
//! has released the in-flight flag early.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::Shared;
use crate::error::ProtocolError;
use crate::transport::BoxedStream;

type Writer = Arc<tokio::sync::Mutex<WriteHalf<BoxedStream>>>;

impl Shared {
    /// Queue `bytes` and kick the drain. Returns `false` when disconnected.
    pub(super) fn send_core(self: &Arc<Self>, bytes: Bytes) -> bool {
        if !self.is_connected() {
            warn!("Not sending data, no connection to the game server");
            return false;
        }
        self.outbound.enqueue(bytes);
        self.drain();
        true
    }

    /// Start writing the next queued message unless one is in flight.
    pub(super) fn drain(self: &Arc<Self>) {
        loop {
            if self
                .write_in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }

            let Some(bytes) = self.outbound.try_dequeue() else {
                self.write_in_flight.store(false, Ordering::Release);
                // A send may have raced past the in-flight check above.
                if self.outbound.is_empty() {
                    return;
                }
                continue;
            };

            let Some((epoch, writer, cancel)) = self.current_writer() else {
                debug!("Dropping outbound message, link released");
                self.write_in_flight.store(false, Ordering::Release);
                return;
            };

            self.write_watchdog.arm(self.settings.write_timeout);
            let shared = Arc::clone(self);
            self.runtime
                .spawn(async move { shared.write_one(epoch, writer, cancel, bytes).await });
            return;
        }
    }

    fn current_writer(&self) -> Option<(u64, Writer, CancellationToken)> {
        self.link()
            .as_ref()
            .map(|link| (link.epoch, Arc::clone(&link.writer), link.cancel.clone()))
    }

    async fn write_one(
        self: Arc<Self>,
        epoch: u64,
        writer: Writer,
        cancel: CancellationToken,
        bytes: Bytes,
    ) {
        let write = async {
            let mut stream = writer.lock().await;
            stream.write_all(&bytes).await?;
            stream.flush().await
        };
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = write => result,
        };
        if !self.is_current(epoch) {
            trace!(epoch, "Write completed on a released link");
            return;
        }

        match result {
            Ok(()) => {
                trace!(bytes = bytes.len(), "Write completed");
                self.metrics.message_sent(bytes.len() as u64);
                self.write_watchdog.disarm();
                self.write_in_flight.store(false, Ordering::Release);
                self.drain();
            }
            Err(e) => {
                self.write_in_flight.store(false, Ordering::Release);
                self.handle_failure(ProtocolError::Io(e));
            }
        }
    }
}
