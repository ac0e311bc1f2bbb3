//! Protocol error types.

use nettable_codec::{CodecError, ProtocolRevision};
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding messages.
///
/// Every variant is fatal to the connection it occurred on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The message code is unknown or not valid on the revision.
    #[error("unknown message 0x{code:02x} on revision {revision}")]
    UnknownMessage {
        /// Message code.
        code: u8,
        /// Revision in use.
        revision: ProtocolRevision,
    },

    /// An update referenced an id that was never assigned.
    #[error("unknown entry id {id}")]
    UnknownEntryId {
        /// The unresolved id.
        id: u16,
    },

    /// A clear-all message carried the wrong magic value.
    #[error("bad clear-all magic 0x{magic:08x}")]
    BadClearMagic {
        /// The received value.
        magic: u32,
    },

    /// A field failed to encode or decode.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl ProtocolError {
    /// Returns true if more input may complete the message.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ProtocolError::Codec(e) if e.is_incomplete())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::UnknownMessage {
            code: 0x13,
            revision: ProtocolRevision::Nt2,
        };
        assert_eq!(err.to_string(), "unknown message 0x13 on revision 2.0");
        assert_eq!(
            ProtocolError::BadClearMagic { magic: 1 }.to_string(),
            "bad clear-all magic 0x00000001"
        );
    }

    #[test]
    fn incomplete_only_for_eof() {
        assert!(ProtocolError::Codec(CodecError::UnexpectedEof).is_incomplete());
        assert!(!ProtocolError::Codec(CodecError::InvalidUtf8).is_incomplete());
        assert!(!ProtocolError::UnknownEntryId { id: 3 }.is_incomplete());
    }
}
