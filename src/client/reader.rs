//! Read pipeline.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, ReadHalf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use super::{AbortReason, Shared};
use crate::config::MAX_MESSAGE_BYTES;
use crate::error::ProtocolError;
use crate::transport::BoxedStream;

impl Shared {
    /// Deliver every completed read to the inbound queue until the link is
    /// released, the peer closes, or the stream fails.
    ///
    /// One read becomes one inbound buffer; the stream is not reframed.
    pub(super) async fn read_loop(
        self: Arc<Self>,
        epoch: u64,
        mut stream: ReadHalf<BoxedStream>,
        cancel: CancellationToken,
    ) {
        let mut buffer = vec![0u8; MAX_MESSAGE_BYTES];
        self.arm_read_watchdog();

        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => return,
                read = stream.read(&mut buffer) => read,
            };
            if !self.is_current(epoch) {
                trace!(epoch, "Read completed on a released link");
                return;
            }

            match read {
                Ok(0) => {
                    self.socket_force_closed.store(true, Ordering::Release);
                    if self.context.is_game_over() {
                        debug!("Server closed the stream after game over");
                    } else {
                        error!("Socket closed before game over");
                    }
                    self.abort(AbortReason::PeerClosed);
                    return;
                }
                Ok(n) => {
                    trace!(bytes = n, "Read completed");
                    self.inbound.enqueue(Bytes::copy_from_slice(&buffer[..n]));
                    self.metrics.message_received(n as u64);
                    self.read_watchdog.disarm();
                    self.arm_read_watchdog();
                }
                Err(e) => {
                    self.handle_failure(ProtocolError::Io(e));
                    return;
                }
            }
        }
    }
}
