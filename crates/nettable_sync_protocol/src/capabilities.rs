//! What each protocol revision can express.

use nettable_codec::ProtocolRevision;

/// Feature set of a negotiated revision.
///
/// Derived once per connection and consulted at every revision-dependent
/// decision instead of comparing revision numbers inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `EntryDelete` exists.
    pub supports_deletes: bool,
    /// `FlagsUpdate`, `ClearAll` and the flags field of assignments exist.
    pub supports_flags: bool,
    /// Raw byte values can be transmitted.
    pub supports_raw: bool,
    /// `ServerHello` and `ClientHelloComplete` are part of the handshake.
    pub has_hello_handshake: bool,
}

impl Capabilities {
    /// Returns the capabilities of `revision`.
    pub const fn for_revision(revision: ProtocolRevision) -> Self {
        match revision {
            ProtocolRevision::Nt2 => Self {
                supports_deletes: false,
                supports_flags: false,
                supports_raw: false,
                has_hello_handshake: false,
            },
            ProtocolRevision::Nt3 => Self {
                supports_deletes: true,
                supports_flags: true,
                supports_raw: true,
                has_hello_handshake: true,
            },
        }
    }
}
