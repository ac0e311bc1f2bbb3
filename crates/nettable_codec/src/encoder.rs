//! Wire encoder.

use crate::error::{CodecError, CodecResult};
use crate::types::ProtocolRevision;
use crate::value::EntryValue;
use bytes::BufMut;

/// Largest array the one-byte element count can describe.
pub const MAX_ARRAY_LEN: usize = u8::MAX as usize;

/// Longest string or raw payload either side accepts on revision 3.0.
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Writes wire primitives for one protocol revision.
///
/// All multi-byte integers and doubles are big-endian. Strings use a `u16`
/// length prefix on revision 2.0 and an unsigned LEB128 prefix on 3.0.
pub struct WireEncoder {
    buffer: Vec<u8>,
    revision: ProtocolRevision,
}

impl WireEncoder {
    /// Create a new encoder.
    pub fn new(revision: ProtocolRevision) -> Self {
        Self {
            buffer: Vec::new(),
            revision,
        }
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(revision: ProtocolRevision, capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            revision,
        }
    }

    /// Returns the revision this encoder writes.
    pub fn revision(&self) -> ProtocolRevision {
        self.revision
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Writes one byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.put_u8(value);
    }

    /// Writes a big-endian `u16`.
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.put_u16(value);
    }

    /// Writes a big-endian `u32`.
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.put_u32(value);
    }

    /// Writes an IEEE-754 double.
    pub fn write_f64(&mut self, value: f64) {
        self.buffer.put_f64(value);
    }

    /// Appends bytes verbatim, without a length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.put_slice(bytes);
    }

    /// Writes a boolean as a single `0`/`1` byte.
    pub fn write_bool(&mut self, value: bool) {
        self.buffer.put_u8(u8::from(value));
    }

    /// Writes an unsigned LEB128 integer.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_leb128(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buffer.put_u8(byte);
                return;
            }
            self.buffer.put_u8(byte | 0x80);
        }
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> CodecResult<()> {
        self.write_len_prefixed(value.as_bytes())
    }

    /// Writes length-prefixed opaque bytes (revision 3.0 only).
    pub fn write_raw(&mut self, value: &[u8]) -> CodecResult<()> {
        self.require_raw()?;
        self.write_len_prefixed(value)
    }

    /// Writes the value payload (without its type byte).
    pub fn write_value(&mut self, value: &EntryValue) -> CodecResult<()> {
        match value {
            EntryValue::Boolean(b) => self.write_bool(*b),
            EntryValue::Number(n) => self.write_f64(*n),
            EntryValue::String(s) => self.write_string(s)?,
            EntryValue::Raw(bytes) => self.write_raw(bytes)?,
            EntryValue::BooleanArray(items) => {
                self.write_array_len(items.len())?;
                for item in items {
                    self.write_bool(*item);
                }
            }
            EntryValue::NumberArray(items) => {
                self.write_array_len(items.len())?;
                for item in items {
                    self.write_f64(*item);
                }
            }
            EntryValue::StringArray(items) => {
                self.write_array_len(items.len())?;
                for item in items {
                    self.write_string(item)?;
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_array_len(&mut self, len: usize) -> CodecResult<()> {
        if len > MAX_ARRAY_LEN {
            return Err(CodecError::ArrayTooLong { len });
        }
        self.buffer.put_u8(len as u8);
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_len_prefixed(&mut self, bytes: &[u8]) -> CodecResult<()> {
        match self.revision {
            ProtocolRevision::Nt2 => {
                let max = usize::from(u16::MAX);
                if bytes.len() > max {
                    return Err(CodecError::StringTooLong {
                        len: bytes.len(),
                        max,
                    });
                }
                self.buffer.put_u16(bytes.len() as u16);
            }
            ProtocolRevision::Nt3 => {
                if bytes.len() > MAX_PAYLOAD_LEN {
                    return Err(CodecError::StringTooLong {
                        len: bytes.len(),
                        max: MAX_PAYLOAD_LEN,
                    });
                }
                self.write_leb128(bytes.len() as u64);
            }
        }
        self.buffer.put_slice(bytes);
        Ok(())
    }

    fn require_raw(&self) -> CodecResult<()> {
        if self.revision < ProtocolRevision::Nt3 {
            return Err(CodecError::UnsupportedType {
                type_name: "raw",
                revision: self.revision,
            });
        }
        Ok(())
    }
}
