//! # nettable sync server
//!
//! The server role of nettable.
//!
//! This crate provides:
//! - The TCP accept loop
//! - One protocol worker per client
//! - Server configuration
//!
//! # Architecture
//!
//! The server owns the authoritative entry store and assigns entry ids.
//! Every change applied from one client is rebroadcast to all others; a
//! newly created entry is also echoed to its creator so it learns the id.
//! Clients of different revisions can be connected at the same time, each
//! served at the revision it negotiated.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::SyncServer;
