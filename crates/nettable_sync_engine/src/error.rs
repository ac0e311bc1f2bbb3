//! Error types for the sync engine.

use crate::state::SessionState;
use nettable_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that end a connection.
///
/// None of these reach table accessors; the connection manager logs them and
/// reconnects.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Malformed or illegal message from the peer.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer closed the connection or went silent.
    #[error("connection lost")]
    ConnectionLost,

    /// The server does not speak the requested revision.
    #[error("server rejected protocol revision, it supports 0x{server_revision:04x}")]
    HandshakeRejected {
        /// Highest revision tag the server speaks.
        server_revision: u16,
    },

    /// A message arrived that is not valid in the current state.
    #[error("unexpected {message} while {state}")]
    UnexpectedMessage {
        /// Session state when it arrived.
        state: SessionState,
        /// Message name.
        message: &'static str,
    },

    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connect attempt timed out.
    #[error("operation timed out")]
    Timeout,

    /// Shutdown was requested.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Returns true if reconnecting may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ConnectionLost
            | SyncError::Io(_)
            | SyncError::Timeout
            | SyncError::HandshakeRejected { .. }
            | SyncError::Protocol(_)
            | SyncError::UnexpectedMessage { .. } => true,
            SyncError::Cancelled => false,
        }
    }
}
