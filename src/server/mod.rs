//! TCP listener for subscriber connections
//!
//! Handles the accept loop and hands every connection to the broker as a
//! new subscriber. Not part of the core: everything interesting about a
//! subscriber's lifetime happens in [`crate::broker`].

pub mod config;
pub mod listener;

pub use config::{ServerConfig, DEFAULT_LISTEN_ADDR};
pub use listener::RelayServer;
