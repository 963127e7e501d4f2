//! # Utility Modules
//!
//! Supporting building blocks shared by the client pipelines.
//!
//! ## Components
//! - **Queue**: mutex-guarded FIFO for inbound and outbound packets
//! - **Watchdog**: restartable one-shot timer with at-most-once firing
//! - **Timeout**: default deadlines and an async timeout wrapper
//! - **Logging**: structured logging configuration
//! - **Metrics**: per-client observability counters

pub mod logging;
pub mod metrics;
pub mod queue;
pub mod timeout;
pub mod watchdog;

pub use queue::SafeQueue;
pub use watchdog::Watchdog;
