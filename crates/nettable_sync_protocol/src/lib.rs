//! # nettable Sync Protocol
//!
//! Message kinds and wire layouts of the table synchronization protocol.
//!
//! This crate provides:
//! - `Message`, covering the handshake and entry messages of revisions 2.0
//!   and 3.0
//! - `Capabilities`, the feature set of a negotiated revision
//! - `FrameDecoder`, incremental decoding over a byte stream
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod capabilities;
mod error;
mod frame;
mod messages;

pub use capabilities::Capabilities;
pub use error::{ProtocolError, ProtocolResult};
pub use frame::FrameDecoder;
pub use messages::{
    code, EntryTypes, Message, CLEAR_ALL_MAGIC, SERVER_HELLO_CLIENT_SEEN, UNASSIGNED_ID,
};

pub use nettable_codec::ProtocolRevision;
