//! Entry records stored by the [`EntryStore`](crate::EntryStore).

use nettable_codec::{EntryFlags, EntryType, EntryValue, SequenceNumber};

/// A named, typed value with its replication metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Full key.
    pub key: String,
    /// Current value. For a tombstone this is the last value written.
    pub value: EntryValue,
    /// Revision counter; wraps at 2^16.
    pub sequence: SequenceNumber,
    /// Entry flags.
    pub flags: EntryFlags,
    /// Server-assigned id, present in server-mode stores.
    pub id: Option<u16>,
    /// True once deleted. Tombstones keep their id and sequence.
    pub deleted: bool,
    /// True while a local write has not been sent on an active connection.
    pub pending: bool,
}

impl Entry {
    pub(crate) fn new(key: String, value: EntryValue, id: Option<u16>) -> Self {
        Self {
            key,
            value,
            sequence: SequenceNumber::new(1),
            flags: EntryFlags::NONE,
            id,
            deleted: false,
            pending: false,
        }
    }

    /// Returns the type of the current value.
    pub fn entry_type(&self) -> EntryType {
        self.value.entry_type()
    }

    /// Returns true if the entry is visible to readers.
    pub fn is_live(&self) -> bool {
        !self.deleted
    }
}

/// An entry state received from a peer.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    /// Full key.
    pub key: String,
    /// Received value.
    pub value: EntryValue,
    /// Sender's sequence number.
    pub sequence: SequenceNumber,
    /// Sender's flags. `None` on revisions that do not carry flags.
    pub flags: Option<EntryFlags>,
}

impl RemoteEntry {
    /// Creates a remote entry without flags.
    pub fn new(key: impl Into<String>, value: EntryValue, sequence: SequenceNumber) -> Self {
        Self {
            key: key.into(),
            value,
            sequence,
            flags: None,
        }
    }

    /// Attaches flags.
    #[must_use]
    pub fn with_flags(mut self, flags: EntryFlags) -> Self {
        self.flags = Some(flags);
        self
    }
}

/// How a remote entry is checked against the local copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyPolicy {
    /// Apply only strictly newer sequence numbers.
    #[default]
    Steady,
    /// Also apply an equal sequence whose content differs. Used by a client
    /// while receiving the server's initial assignments.
    InitialSync,
}

/// Result of applying a remote entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The store changed and dispatched an event of this kind.
    Applied(crate::ChangeKind),
    /// The local copy was at least as new; nothing changed.
    Stale,
}

impl ApplyOutcome {
    /// Returns true if the store changed.
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied(_))
    }
}
