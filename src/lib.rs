//! # match-sync
//!
//! Resilient TLS client for real-time two-player match synchronization
//! servers.
//!
//! A [`client::SyncClient`] keeps one encrypted session to a match server
//! alive for the duration of a match. The server is authenticated by a
//! pinned public key, every outbound message goes through a single-flight
//! write pipeline, and inbound reads are handed to a polling consumer
//! through a thread-safe queue. Stalled reads, socket failures and handshake
//! rejections are retried a bounded number of times before the match is
//! aborted.
//!
//! ## Modules
//! - [`core`]: opcodes, packets, messages and the codec boundary
//! - [`transport`]: the `Connector` seam and the pinned-key TLS transport
//! - [`client`]: connection manager, reconnect state machine, read/write pipelines
//! - [`game`]: reference polling consumer and its view model
//! - [`config`]: TOML/env configuration
//! - [`utils`]: queue, watchdog, timeouts, logging and metrics

pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod game;
pub mod transport;
pub mod utils;

pub use client::{AbortReason, ConnectionState, MatchLifecycle, SessionContext, SyncClient};
pub use config::{ConnectionConfig, SyncConfig};
pub use error::{ProtocolError, Result};
