//! Error types for the table server.

use std::net::SocketAddr;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while starting the server.
///
/// Failures of individual connections never surface here.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        source: std::io::Error,
    },

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// `start` was called on a running server.
    #[error("server already running")]
    AlreadyRunning,
}
