//! # Transport Layer
//!
//! The seam between the connection manager and the network.
//!
//! A [`Connector`] turns a [`ConnectionConfig`] into an authenticated,
//! encrypted byte stream. The production implementation is
//! [`tls::TlsTransport`] (TCP with Nagle disabled, then TLS with a pinned
//! server key); tests plug in in-memory streams through the same trait.

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::ConnectionConfig;
use crate::error::Result;

pub mod tls;

/// Byte stream the client pipelines can read from and write to.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Owned, type-erased stream handed to the connection manager.
pub type BoxedStream = Box<dyn AsyncStream>;

/// Opens the encrypted stream for one connection attempt.
pub trait Connector: Send + Sync + 'static {
    /// Open the socket, run the TLS handshake and validate the server identity.
    ///
    /// Dropping the returned stream closes the connection.
    fn connect<'a>(&'a self, target: &'a ConnectionConfig) -> BoxFuture<'a, Result<BoxedStream>>;
}
