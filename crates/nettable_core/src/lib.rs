//! # nettable Core
//!
//! The replicated table as seen by one process.
//!
//! This crate provides:
//! - `EntryStore`, the authoritative local copy of all entries
//! - `ChangeDispatcher` and `ChangeEvent` for observing mutations
//! - `Table`, a key-prefix view with typed accessors
//!
//! Networking lives in `nettable_sync_engine`; this crate never performs I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod entry;
mod error;
mod store;
mod table;
mod types;

pub use change_feed::{ChangeDispatcher, ChangeEvent, ChangeKind, ChangeSink};
pub use entry::{ApplyOutcome, ApplyPolicy, Entry, RemoteEntry};
pub use error::{CoreError, CoreResult};
pub use store::EntryStore;
pub use table::{Table, PATH_SEPARATOR};
pub use types::{ConnectionId, Origin, StoreMode};

pub use nettable_codec::{EntryFlags, EntryType, EntryValue, ProtocolRevision, SequenceNumber};
