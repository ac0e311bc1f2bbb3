//! Error types for the instance facade.

use nettable_sync_server::ServerError;
use thiserror::Error;

/// Result type for instance operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while starting networking.
///
/// Table accessors report [`CoreError`](nettable_core::CoreError) instead;
/// connection failures are never returned, only logged.
#[derive(Error, Debug)]
pub enum Error {
    /// The server could not start.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// The async runtime could not be created.
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}
