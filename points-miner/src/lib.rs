//! Headless Twitch channel-points miner.
//!
//! Authenticates as a single user, tracks a configured set of
//! broadcasters, simulates viewer presence on up to two of them at a time,
//! and reacts to the real-time feed (bonus claims, raids, predictions,
//! community goals, drops).

pub mod analytics;
pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod drops;
pub mod error;
pub mod logging;
pub mod miner;
pub mod pubsub;
pub mod streamer;
pub mod watcher;

pub use error::{Error, Result};
