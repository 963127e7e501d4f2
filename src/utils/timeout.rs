//! Default timing values and an async timeout wrapper.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Read watchdog deadline before a match starts.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5000);

/// Read watchdog deadline once the server has confirmed the match.
pub const MATCH_READ_TIMEOUT: Duration = Duration::from_millis(2000);

/// Write watchdog deadline for one outbound message.
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Deadline for TCP connect plus TLS handshake plus application handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Interval at which callers are expected to send keep-alives.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(1000);

/// Fixed delay before each automatic reconnect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Run `fut`, failing with [`ProtocolError::Timeout`] once `duration` elapses.
pub async fn with_timeout<F, T>(duration: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}
