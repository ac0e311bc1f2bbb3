//! Wire decoder.

use crate::encoder::MAX_PAYLOAD_LEN;
use crate::error::{CodecError, CodecResult};
use crate::types::ProtocolRevision;
use crate::value::{EntryType, EntryValue};

/// Maximum allowed string/raw length.
/// This prevents allocation-based DoS from untrusted input.
const MAX_BYTES_LENGTH: u64 = MAX_PAYLOAD_LEN as u64;

/// Reads wire primitives for one protocol revision from a byte slice.
///
/// Running out of input yields [`CodecError::UnexpectedEof`]; callers reading
/// from a stream treat that as "wait for more bytes" and retry from the
/// start of the frame.
pub struct WireDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    revision: ProtocolRevision,
}

impl<'a> WireDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8], revision: ProtocolRevision) -> Self {
        Self {
            data,
            pos: 0,
            revision,
        }
    }

    /// Returns the revision this decoder reads.
    pub fn revision(&self) -> ProtocolRevision {
        self.revision
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    /// Reads one byte.
    #[inline]
    pub fn read_u8(&mut self) -> CodecResult<u8> {
        if self.pos >= self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16(&mut self) -> CodecResult<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32(&mut self) -> CodecResult<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads an IEEE-754 double.
    pub fn read_f64(&mut self) -> CodecResult<f64> {
        let bytes = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(f64::from_be_bytes(buf))
    }

    /// Reads a boolean; any non-zero byte is `true`.
    pub fn read_bool(&mut self) -> CodecResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads an unsigned LEB128 integer.
    pub fn read_leb128(&mut self) -> CodecResult<u64> {
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift >= 64 || (shift == 63 && byte & 0x7e != 0) {
                return Err(CodecError::Leb128Overflow);
            }
            result |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> CodecResult<String> {
        let bytes = self.read_len_prefixed()?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    /// Reads length-prefixed opaque bytes (revision 3.0 only).
    pub fn read_raw(&mut self) -> CodecResult<Vec<u8>> {
        if self.revision < ProtocolRevision::Nt3 {
            return Err(CodecError::UnsupportedType {
                type_name: "raw",
                revision: self.revision,
            });
        }
        Ok(self.read_len_prefixed()?.to_vec())
    }

    /// Reads a type byte.
    pub fn read_type(&mut self) -> CodecResult<EntryType> {
        let code = self.read_u8()?;
        let ty = EntryType::from_code(code).ok_or(CodecError::UnknownType { code })?;
        if ty == EntryType::Raw && self.revision < ProtocolRevision::Nt3 {
            return Err(CodecError::UnknownType { code });
        }
        Ok(ty)
    }

    /// Reads a value payload of the given type.
    pub fn read_value(&mut self, ty: EntryType) -> CodecResult<EntryValue> {
        let value = match ty {
            EntryType::Boolean => EntryValue::Boolean(self.read_bool()?),
            EntryType::Number => EntryValue::Number(self.read_f64()?),
            EntryType::String => EntryValue::String(self.read_string()?),
            EntryType::Raw => EntryValue::Raw(self.read_raw()?),
            EntryType::BooleanArray => {
                let len = self.read_u8()?;
                let mut items = Vec::with_capacity(usize::from(len));
                for _ in 0..len {
                    items.push(self.read_bool()?);
                }
                EntryValue::BooleanArray(items)
            }
            EntryType::NumberArray => {
                let len = self.read_u8()?;
                let mut items = Vec::with_capacity(usize::from(len));
                for _ in 0..len {
                    items.push(self.read_f64()?);
                }
                EntryValue::NumberArray(items)
            }
            EntryType::StringArray => {
                let len = self.read_u8()?;
                let mut items = Vec::with_capacity(usize::from(len));
                for _ in 0..len {
                    items.push(self.read_string()?);
                }
                EntryValue::StringArray(items)
            }
        };
        Ok(value)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if self.pos + len > self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_len_prefixed(&mut self) -> CodecResult<&'a [u8]> {
        let len = match self.revision {
            ProtocolRevision::Nt2 => u64::from(self.read_u16()?),
            ProtocolRevision::Nt3 => self.read_leb128()?,
        };
        if len > MAX_BYTES_LENGTH {
            return Err(CodecError::StringTooLong {
                len: usize::try_from(len).unwrap_or(usize::MAX),
                max: MAX_PAYLOAD_LEN,
            });
        }
        #[allow(clippy::cast_possible_truncation)]
        self.read_bytes(len as usize)
    }
}
