//! # Error Types
//!
//! Comprehensive error handling for the match synchronization client.
//!
//! This module defines all error variants that can occur while connecting to,
//! talking to, or recovering from a match server, from low-level I/O errors
//! to pinned-key rejections and codec violations.
//!
//! ## Error Categories
//! - **I/O Errors**: socket connect/read/write failures
//! - **TLS Errors**: handshake failures and pinned-key mismatches
//! - **Protocol Errors**: invalid opcodes, truncated or oversized packets
//! - **Lifecycle Errors**: peer closed the session, sends while disconnected
//! - **Configuration Errors**: invalid or missing settings
//!
//! Every error can be classified with [`ProtocolError::failure_kind`], which is
//! what the reconnect state machine uses to decide between retrying and
//! aborting the match.
//!
//! ## Example Usage
//! ```rust
//! use match_sync::error::{FailureKind, ProtocolError};
//!
//! let err = ProtocolError::Timeout;
//! assert_eq!(err.failure_kind(), FailureKind::Transient);
//!
//! let err = ProtocolError::ConnectionClosed;
//! assert_eq!(err.failure_kind(), FailureKind::PeerClosed);
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Configuration errors
    pub const ERR_MISSING_CONNECTION_INFO: &str = "No connection info stored";
    pub const ERR_INVALID_SERVER_NAME: &str = "Invalid TLS server name";

    /// TLS errors
    pub const ERR_PIN_MISMATCH: &str = "The server does not have the expected public key";
    pub const ERR_CERT_PARSE: &str = "Failed to parse server certificate";
}

/// ProtocolError is the primary error type for all client operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("The server does not have the expected public key")]
    PinMismatch,

    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Not connected to the match server")]
    NotConnected,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Invalid opcode: {0}")]
    InvalidOpcode(i16),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Truncated packet: {0} bytes")]
    TruncatedPacket(usize),

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// How the reconnect state machine treats a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retry through the reconnect path (bounded attempts with backoff).
    Transient,
    /// The server ended the session; abort the match without retrying.
    PeerClosed,
    /// Unexpected failure; abort the match with a diagnostic.
    Fatal,
}

impl ProtocolError {
    /// Classify this error for the reconnect state machine.
    ///
    /// Socket-level I/O failures, timeouts and TLS rejections (including a
    /// pinned-key mismatch) are transient. A peer-initiated close is
    /// terminal. Everything else is fatal.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ProtocolError::Io(e) => {
                if is_socket_error(e) {
                    FailureKind::Transient
                } else {
                    FailureKind::Fatal
                }
            }
            ProtocolError::Timeout | ProtocolError::TlsError(_) | ProtocolError::PinMismatch => {
                FailureKind::Transient
            }
            ProtocolError::ConnectionClosed => FailureKind::PeerClosed,
            _ => FailureKind::Fatal,
        }
    }

    /// Shorthand for `failure_kind() == FailureKind::Transient`.
    pub fn is_transient(&self) -> bool {
        self.failure_kind() == FailureKind::Transient
    }
}

/// Socket-level error kinds. TLS failures arrive as `InvalidData` and are
/// mapped by the transport before they get here.
fn is_socket_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrInUse
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotFound
    )
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
