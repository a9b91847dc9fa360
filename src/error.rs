//! Crate-level error types

use crate::wire::WireError;

/// Convenience result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error (socket, stdin, bind)
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire-format error from the pcap codec
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The broker control loop has shut down and no longer accepts requests
    #[error("broker closed")]
    BrokerClosed,
}
