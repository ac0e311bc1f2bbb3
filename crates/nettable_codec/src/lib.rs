//! # nettable Codec
//!
//! Wire primitives and typed entry values for nettable.
//!
//! This crate provides:
//! - `EntryValue` / `EntryType`, the tagged value model
//! - `SequenceNumber` with wrapping serial-number comparison
//! - `EntryFlags` and `ProtocolRevision`
//! - `WireEncoder` / `WireDecoder` for revision-dependent field encodings
//!
//! ## Field encodings
//!
//! - Integers and doubles are big-endian
//! - Booleans are one byte
//! - Strings are UTF-8 with a `u16` length (2.0) or LEB128 length (3.0)
//! - Arrays carry a one-byte element count
//! - Raw bytes exist only on 3.0
//!
//! ## Usage
//!
//! ```
//! use nettable_codec::{EntryValue, ProtocolRevision, WireDecoder, WireEncoder};
//!
//! let value = EntryValue::from("hello");
//! let mut encoder = WireEncoder::new(ProtocolRevision::Nt3);
//! encoder.write_value(&value).unwrap();
//! let bytes = encoder.into_bytes();
//!
//! let mut decoder = WireDecoder::new(&bytes, ProtocolRevision::Nt3);
//! assert_eq!(decoder.read_value(value.entry_type()).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod types;
mod value;

pub use decoder::WireDecoder;
pub use encoder::{WireEncoder, MAX_ARRAY_LEN, MAX_PAYLOAD_LEN};
pub use error::{CodecError, CodecResult};
pub use types::{EntryFlags, ProtocolRevision, SequenceNumber};
pub use value::{EntryType, EntryValue};
