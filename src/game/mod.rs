//! Reference consumer: a game loop driving one match over a [`SyncClient`].
//!
//! [`SyncClient`]: crate::client::SyncClient

pub mod controller;
pub mod info;

pub use controller::MatchController;
pub use info::{ChatEntry, MatchInfo};
