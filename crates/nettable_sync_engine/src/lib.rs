//! # nettable sync engine
//!
//! Connection handling for nettable.
//!
//! This crate provides:
//! - The protocol state machine ([`Session`]), free of I/O
//! - The per-connection worker that drives a session over a socket
//! - The connection registry that fans store changes out to connections
//! - The client connection manager with reconnect and backoff
//!
//! ## Architecture
//!
//! ```text
//! EntryStore ──(ChangeSink)──▶ ConnectionRegistry ──▶ one queue per connection
//!                                                         │
//!                                   run_connection ◀──────┘
//!                                     │  Session::outgoing_for / handle
//!                                     ▼
//!                                   socket
//! ```
//!
//! ## Key Invariants
//!
//! - A session only exchanges entry changes once it is `Active`
//! - Ids are per connection; a client forgets them on disconnect
//! - A protocol error closes only the connection it occurred on
//! - Local writes stay pending until written on an active connection

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod connection;
mod error;
mod registry;
mod session;
mod state;

pub use client::ClientManager;
pub use config::{ConnectionTiming, RetryConfig, SyncConfig, DEFAULT_PORT};
pub use connection::{run_connection, ConnectionEnd};
pub use error::{SyncError, SyncResult};
pub use registry::{ConnectionEvent, ConnectionInfo, ConnectionRegistry};
pub use session::{Role, Session};
pub use state::SessionState;
