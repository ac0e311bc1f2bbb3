//! Scalar wire types shared by every layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A negotiated wire-format revision.
///
/// Ordering follows the revision number, so `min` of two revisions is the
/// revision both endpoints understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProtocolRevision {
    /// Revision 2.0 (`0x0200`): no deletes, flags or raw values.
    Nt2,
    /// Revision 3.0 (`0x0300`).
    Nt3,
}

impl ProtocolRevision {
    /// Every revision this implementation speaks, newest first.
    pub const ALL: [ProtocolRevision; 2] = [ProtocolRevision::Nt3, ProtocolRevision::Nt2];

    /// Returns the 2-byte version tag sent in hello messages.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            ProtocolRevision::Nt2 => 0x0200,
            ProtocolRevision::Nt3 => 0x0300,
        }
    }

    /// Parses a version tag.
    #[must_use]
    pub const fn from_u16(tag: u16) -> Option<Self> {
        match tag {
            0x0200 => Some(ProtocolRevision::Nt2),
            0x0300 => Some(ProtocolRevision::Nt3),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolRevision::Nt2 => f.write_str("2.0"),
            ProtocolRevision::Nt3 => f.write_str("3.0"),
        }
    }
}

/// Per-key revision counter.
///
/// Sequence numbers are 16 bits and wrap. Comparison uses serial-number
/// arithmetic, so `is_newer_than` is not a total order and `Ord` is
/// deliberately not implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SequenceNumber(pub u16);

impl SequenceNumber {
    const HALF: u16 = 1 << 15;

    /// Creates a new sequence number.
    #[must_use]
    pub const fn new(seq: u16) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns the next sequence number, wrapping at `u16::MAX`.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Returns true if `self` was issued after `other`.
    #[must_use]
    pub fn is_newer_than(self, other: SequenceNumber) -> bool {
        let (a, b) = (self.0, other.0);
        (a > b && a - b < Self::HALF) || (a < b && b - a > Self::HALF)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// Entry flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EntryFlags(pub u8);

impl EntryFlags {
    /// No flags set.
    pub const NONE: EntryFlags = EntryFlags(0);
    /// The entry survives "clear all entries".
    pub const PERSISTENT: EntryFlags = EntryFlags(0x01);

    /// Returns the raw flag byte.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: EntryFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the flags with `other` set.
    #[must_use]
    pub const fn with(self, other: EntryFlags) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns the flags with `other` cleared.
    #[must_use]
    pub const fn without(self, other: EntryFlags) -> Self {
        Self(self.0 & !other.0)
    }

    /// Shorthand for `contains(EntryFlags::PERSISTENT)`.
    #[must_use]
    pub const fn is_persistent(self) -> bool {
        self.contains(Self::PERSISTENT)
    }
}
