//! Core type definitions for nettable.

use std::fmt;

/// Identifier of one live connection within a process.
///
/// Connection IDs are assigned by the engine and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Creates a new connection ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Where a store mutation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Written by application code in this process.
    Local,
    /// Applied from a message received on a connection.
    Remote(ConnectionId),
}

impl Origin {
    /// Returns true for locally originated mutations.
    pub fn is_local(&self) -> bool {
        matches!(self, Origin::Local)
    }
}

/// Whether the store allocates entry ids.
///
/// Only the server role assigns ids; clients learn them per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Allocates an id for every entry on creation.
    Server,
    /// Leaves ids unassigned.
    Client,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_display() {
        assert_eq!(format!("{}", ConnectionId::new(7)), "conn:7");
    }

    #[test]
    fn origin_is_local() {
        assert!(Origin::Local.is_local());
        assert!(!Origin::Remote(ConnectionId::new(1)).is_local());
    }
}
