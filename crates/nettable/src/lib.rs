//! # nettable
//!
//! Replicated typed key-value tables.
//!
//! One process runs a server; any number of clients connect to it over TCP.
//! Every participant holds a full copy of all entries. Writes are applied
//! locally at once and propagated in the background, newest sequence
//! number winning. Both wire revisions 2.0 and 3.0 are spoken, and a
//! server serves clients of either revision at the same time.
//!
//! ## Usage
//!
//! ```no_run
//! use nettable::{NetworkTables, SyncConfig};
//!
//! # fn main() -> nettable::Result<()> {
//! let nt = NetworkTables::client(SyncConfig::new("10.0.0.2:1735").with_identity("dashboard"))?;
//! nt.start()?;
//!
//! let table = nt.get_table("SmartDashboard");
//! table.put_boolean("enabled", true);
//! let speed = table.get_number_or("speed", 0.0);
//!
//! for event in table.subscribe() {
//!     println!("{} changed: {:?}", event.key, event.value);
//! }
//! # let _ = speed;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod instance;

pub use error::{Error, Result};
pub use instance::NetworkTables;

pub use nettable_core::{
    ChangeEvent, ChangeKind, CoreError, CoreResult, EntryFlags, EntryType, EntryValue, Origin,
    ProtocolRevision, SequenceNumber, Table,
};
pub use nettable_sync_engine::{
    ConnectionEvent, ConnectionInfo, ConnectionTiming, RetryConfig, SyncConfig, DEFAULT_PORT,
};
pub use nettable_sync_server::{ServerConfig, ServerError};
