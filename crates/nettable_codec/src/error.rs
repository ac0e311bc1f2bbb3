//! Error types for the codec crate.

use crate::types::ProtocolRevision;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Unexpected end of input.
    ///
    /// On a stream this means the frame is not complete yet.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Unknown entry type code.
    #[error("unknown entry type code: {code:#04x}")]
    UnknownType {
        /// The type byte read from the wire.
        code: u8,
    },

    /// Entry type cannot be represented on this protocol revision.
    #[error("type {type_name} is not supported on protocol revision {revision}")]
    UnsupportedType {
        /// Name of the unsupported type.
        type_name: &'static str,
        /// The revision in use.
        revision: ProtocolRevision,
    },

    /// Array has more elements than the one-byte count allows.
    #[error("array too long: {len} elements (max 255)")]
    ArrayTooLong {
        /// Number of elements in the array.
        len: usize,
    },

    /// String or byte payload exceeds what the length prefix can express.
    #[error("payload too long: {len} bytes (max {max})")]
    StringTooLong {
        /// Payload length.
        len: usize,
        /// Maximum for the encoding in use.
        max: usize,
    },

    /// LEB128 value does not fit in 64 bits.
    #[error("LEB128 value overflows 64 bits")]
    Leb128Overflow,
}

impl CodecError {
    /// Returns true if more input could turn this error into a success.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, CodecError::UnexpectedEof)
    }
}
