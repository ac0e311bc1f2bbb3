//! Protocol messages and their per-revision wire layouts.

use crate::capabilities::Capabilities;
use crate::error::{ProtocolError, ProtocolResult};
use nettable_codec::{
    EntryFlags, EntryType, EntryValue, ProtocolRevision, SequenceNumber, WireDecoder,
    WireEncoder,
};
use std::collections::HashMap;

/// Id a client uses when announcing an entry the server has not numbered yet.
pub const UNASSIGNED_ID: u16 = 0xFFFF;

/// Magic value that must accompany a clear-all message.
pub const CLEAR_ALL_MAGIC: u32 = 0xD06C_B27A;

/// Server hello flag: the server has seen this client identity before.
pub const SERVER_HELLO_CLIENT_SEEN: u8 = 0x01;

/// Message type codes.
pub mod code {
    /// Keep-alive.
    pub const KEEP_ALIVE: u8 = 0x00;
    /// Client hello.
    pub const CLIENT_HELLO: u8 = 0x01;
    /// Protocol version unsupported.
    pub const PROTO_UNSUPPORTED: u8 = 0x02;
    /// Server hello complete.
    pub const SERVER_HELLO_COMPLETE: u8 = 0x03;
    /// Server hello.
    pub const SERVER_HELLO: u8 = 0x04;
    /// Client hello complete.
    pub const CLIENT_HELLO_COMPLETE: u8 = 0x05;
    /// Entry assignment.
    pub const ENTRY_ASSIGNMENT: u8 = 0x10;
    /// Entry update.
    pub const ENTRY_UPDATE: u8 = 0x11;
    /// Entry flags update.
    pub const FLAGS_UPDATE: u8 = 0x12;
    /// Entry delete.
    pub const ENTRY_DELETE: u8 = 0x13;
    /// Clear all entries.
    pub const CLEAR_ALL: u8 = 0x14;
}

/// Resolves the type of an entry by id.
///
/// Revision 2.0 updates carry no type byte, so the decoder needs the type
/// recorded by the earlier assignment.
pub trait EntryTypes {
    /// Returns the type of the entry with `id`, if known.
    fn entry_type(&self, id: u16) -> Option<EntryType>;
}

impl EntryTypes for HashMap<u16, EntryType> {
    fn entry_type(&self, id: u16) -> Option<EntryType> {
        self.get(&id).copied()
    }
}

/// A protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Keeps an idle connection alive.
    KeepAlive,
    /// First message of a client.
    ClientHello {
        /// Requested revision tag; may be one this side does not speak.
        revision: u16,
        /// Client identity (revision 3.0 and later).
        identity: String,
    },
    /// Server rejects the requested revision.
    ProtoUnsupported {
        /// Highest revision tag the server speaks.
        revision: u16,
    },
    /// End of the server's initial assignments.
    ServerHelloComplete,
    /// Server accepts the client (revision 3.0).
    ServerHello {
        /// Hello flags.
        flags: u8,
        /// Server identity.
        identity: String,
    },
    /// End of the client's initial assignments (revision 3.0).
    ClientHelloComplete,
    /// Announces an entry with its id.
    EntryAssignment {
        /// Full key.
        key: String,
        /// Entry id, or [`UNASSIGNED_ID`] from a client.
        id: u16,
        /// Sequence number.
        sequence: SequenceNumber,
        /// Flags; always empty on revision 2.0.
        flags: EntryFlags,
        /// Value.
        value: EntryValue,
    },
    /// Changes the value of a known entry.
    EntryUpdate {
        /// Entry id.
        id: u16,
        /// Sequence number.
        sequence: SequenceNumber,
        /// Value.
        value: EntryValue,
    },
    /// Changes the flags of a known entry (revision 3.0).
    FlagsUpdate {
        /// Entry id.
        id: u16,
        /// New flags.
        flags: EntryFlags,
    },
    /// Deletes a known entry (revision 3.0).
    EntryDelete {
        /// Entry id.
        id: u16,
    },
    /// Deletes every non-persistent entry (revision 3.0).
    ClearAll,
}

impl Message {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            Message::KeepAlive => code::KEEP_ALIVE,
            Message::ClientHello { .. } => code::CLIENT_HELLO,
            Message::ProtoUnsupported { .. } => code::PROTO_UNSUPPORTED,
            Message::ServerHelloComplete => code::SERVER_HELLO_COMPLETE,
            Message::ServerHello { .. } => code::SERVER_HELLO,
            Message::ClientHelloComplete => code::CLIENT_HELLO_COMPLETE,
            Message::EntryAssignment { .. } => code::ENTRY_ASSIGNMENT,
            Message::EntryUpdate { .. } => code::ENTRY_UPDATE,
            Message::FlagsUpdate { .. } => code::FLAGS_UPDATE,
            Message::EntryDelete { .. } => code::ENTRY_DELETE,
            Message::ClearAll => code::CLEAR_ALL,
        }
    }

    /// Returns a short name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Message::KeepAlive => "KeepAlive",
            Message::ClientHello { .. } => "ClientHello",
            Message::ProtoUnsupported { .. } => "ProtoUnsupported",
            Message::ServerHelloComplete => "ServerHelloComplete",
            Message::ServerHello { .. } => "ServerHello",
            Message::ClientHelloComplete => "ClientHelloComplete",
            Message::EntryAssignment { .. } => "EntryAssignment",
            Message::EntryUpdate { .. } => "EntryUpdate",
            Message::FlagsUpdate { .. } => "FlagsUpdate",
            Message::EntryDelete { .. } => "EntryDelete",
            Message::ClearAll => "ClearAll",
        }
    }

    /// Returns a client hello for `revision`.
    pub fn client_hello(revision: ProtocolRevision, identity: impl Into<String>) -> Self {
        Message::ClientHello {
            revision: revision.as_u16(),
            identity: identity.into(),
        }
    }

    /// Encodes the message for `revision`.
    ///
    /// # Errors
    ///
    /// Fails if the message kind or its value type does not exist on the
    /// revision, or a field is too long for its length prefix.
    pub fn encode(&self, revision: ProtocolRevision) -> ProtocolResult<Vec<u8>> {
        if !is_legal(self.type_code(), revision) {
            return Err(ProtocolError::UnknownMessage {
                code: self.type_code(),
                revision,
            });
        }

        let mut encoder = WireEncoder::new(revision);
        encoder.write_u8(self.type_code());
        match self {
            Message::KeepAlive
            | Message::ServerHelloComplete
            | Message::ClientHelloComplete => {}
            Message::ClientHello {
                revision: requested,
                identity,
            } => {
                encoder.write_u16(*requested);
                if *requested >= ProtocolRevision::Nt3.as_u16() {
                    let mut nt3 = WireEncoder::new(ProtocolRevision::Nt3);
                    nt3.write_string(identity)?;
                    encoder.write_bytes(nt3.as_bytes());
                }
            }
            Message::ProtoUnsupported { revision } => encoder.write_u16(*revision),
            Message::ServerHello { flags, identity } => {
                encoder.write_u8(*flags);
                encoder.write_string(identity)?;
            }
            Message::EntryAssignment {
                key,
                id,
                sequence,
                flags,
                value,
            } => {
                encoder.write_string(key)?;
                encoder.write_u8(value.entry_type().code());
                encoder.write_u16(*id);
                encoder.write_u16(sequence.as_u16());
                if Capabilities::for_revision(revision).supports_flags {
                    encoder.write_u8(flags.bits());
                }
                encoder.write_value(value)?;
            }
            Message::EntryUpdate {
                id,
                sequence,
                value,
            } => {
                encoder.write_u16(*id);
                encoder.write_u16(sequence.as_u16());
                if revision >= ProtocolRevision::Nt3 {
                    encoder.write_u8(value.entry_type().code());
                }
                encoder.write_value(value)?;
            }
            Message::FlagsUpdate { id, flags } => {
                encoder.write_u16(*id);
                encoder.write_u8(flags.bits());
            }
            Message::EntryDelete { id } => encoder.write_u16(*id),
            Message::ClearAll => encoder.write_u32(CLEAR_ALL_MAGIC),
        }
        Ok(encoder.into_bytes())
    }

    /// Decodes one message from the front of `bytes`.
    ///
    /// Returns the message and the number of bytes it occupied, or `None` if
    /// `bytes` holds only part of a message.
    ///
    /// # Errors
    ///
    /// Fails on an unknown or illegal message code, an unknown type, invalid
    /// UTF-8, a bad clear-all magic, or a revision 2.0 update whose id has
    /// no known type.
    pub fn decode(
        bytes: &[u8],
        revision: ProtocolRevision,
        types: &dyn EntryTypes,
    ) -> ProtocolResult<Option<(Message, usize)>> {
        match Self::decode_inner(bytes, revision, types) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(e) if e.is_incomplete() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn decode_inner(
        bytes: &[u8],
        revision: ProtocolRevision,
        types: &dyn EntryTypes,
    ) -> ProtocolResult<(Message, usize)> {
        let mut d = WireDecoder::new(bytes, revision);
        let code = d.read_u8()?;
        if !is_legal(code, revision) {
            return Err(ProtocolError::UnknownMessage { code, revision });
        }

        let message = match code {
            code::KEEP_ALIVE => Message::KeepAlive,
            code::CLIENT_HELLO => {
                let requested = d.read_u16()?;
                if requested < ProtocolRevision::Nt3.as_u16() {
                    Message::ClientHello {
                        revision: requested,
                        identity: String::new(),
                    }
                } else {
                    // The identity uses the announced revision's string
                    // encoding, not ours.
                    let mut nt3 = WireDecoder::new(d.remaining(), ProtocolRevision::Nt3);
                    let identity = nt3.read_string()?;
                    let used = d.position() + nt3.position();
                    return Ok((
                        Message::ClientHello {
                            revision: requested,
                            identity,
                        },
                        used,
                    ));
                }
            }
            code::PROTO_UNSUPPORTED => Message::ProtoUnsupported {
                revision: d.read_u16()?,
            },
            code::SERVER_HELLO_COMPLETE => Message::ServerHelloComplete,
            code::SERVER_HELLO => Message::ServerHello {
                flags: d.read_u8()?,
                identity: d.read_string()?,
            },
            code::CLIENT_HELLO_COMPLETE => Message::ClientHelloComplete,
            code::ENTRY_ASSIGNMENT => {
                let key = d.read_string()?;
                let ty = d.read_type()?;
                let id = d.read_u16()?;
                let sequence = SequenceNumber::new(d.read_u16()?);
                let flags = if Capabilities::for_revision(revision).supports_flags {
                    EntryFlags(d.read_u8()?)
                } else {
                    EntryFlags::NONE
                };
                let value = d.read_value(ty)?;
                Message::EntryAssignment {
                    key,
                    id,
                    sequence,
                    flags,
                    value,
                }
            }
            code::ENTRY_UPDATE => {
                let id = d.read_u16()?;
                let sequence = SequenceNumber::new(d.read_u16()?);
                let ty = match revision {
                    ProtocolRevision::Nt2 => types
                        .entry_type(id)
                        .ok_or(ProtocolError::UnknownEntryId { id })?,
                    ProtocolRevision::Nt3 => d.read_type()?,
                };
                let value = d.read_value(ty)?;
                Message::EntryUpdate {
                    id,
                    sequence,
                    value,
                }
            }
            code::FLAGS_UPDATE => Message::FlagsUpdate {
                id: d.read_u16()?,
                flags: EntryFlags(d.read_u8()?),
            },
            code::ENTRY_DELETE => Message::EntryDelete { id: d.read_u16()? },
            code::CLEAR_ALL => {
                let magic = d.read_u32()?;
                if magic != CLEAR_ALL_MAGIC {
                    return Err(ProtocolError::BadClearMagic { magic });
                }
                Message::ClearAll
            }
            _ => return Err(ProtocolError::UnknownMessage { code, revision }),
        };
        Ok((message, d.position()))
    }
}

fn is_legal(code: u8, revision: ProtocolRevision) -> bool {
    match code {
        code::KEEP_ALIVE
        | code::CLIENT_HELLO
        | code::PROTO_UNSUPPORTED
        | code::SERVER_HELLO_COMPLETE
        | code::ENTRY_ASSIGNMENT
        | code::ENTRY_UPDATE => true,
        code::SERVER_HELLO | code::CLIENT_HELLO_COMPLETE => {
            Capabilities::for_revision(revision).has_hello_handshake
        }
        code::FLAGS_UPDATE | code::CLEAR_ALL => Capabilities::for_revision(revision).supports_flags,
        code::ENTRY_DELETE => Capabilities::for_revision(revision).supports_deletes,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nettable_codec::CodecError;
    use proptest::prelude::*;

    fn no_types() -> HashMap<u16, EntryType> {
        HashMap::new()
    }

    fn roundtrip(message: &Message, revision: ProtocolRevision) -> Message {
        let bytes = message.encode(revision).unwrap();
        let (decoded, used) = Message::decode(&bytes, revision, &no_types())
            .unwrap()
            .unwrap();
        assert_eq!(used, bytes.len());
        decoded
    }

    #[test]
    fn keep_alive_is_one_byte() {
        assert_eq!(Message::KeepAlive.encode(ProtocolRevision::Nt2).unwrap(), [0x00]);
    }

    #[test]
    fn nt2_assignment_layout() {
        let message = Message::EntryAssignment {
            key: "/a".into(),
            id: 0x0102,
            sequence: SequenceNumber::new(0x0304),
            flags: EntryFlags::NONE,
            value: EntryValue::Boolean(true),
        };
        let bytes = message.encode(ProtocolRevision::Nt2).unwrap();
        assert_eq!(
            bytes,
            [0x10, 0x00, 0x02, b'/', b'a', 0x00, 0x01, 0x02, 0x03, 0x04, 0x01]
        );
        assert_eq!(roundtrip(&message, ProtocolRevision::Nt2), message);
    }

    #[test]
    fn nt3_assignment_layout() {
        let message = Message::EntryAssignment {
            key: "/a".into(),
            id: UNASSIGNED_ID,
            sequence: SequenceNumber::new(1),
            flags: EntryFlags::PERSISTENT,
            value: EntryValue::String("x".into()),
        };
        let bytes = message.encode(ProtocolRevision::Nt3).unwrap();
        assert_eq!(
            bytes,
            [0x10, 0x02, b'/', b'a', 0x02, 0xff, 0xff, 0x00, 0x01, 0x01, 0x01, b'x']
        );
        assert_eq!(roundtrip(&message, ProtocolRevision::Nt3), message);
    }

    #[test]
    fn nt2_update_needs_type_lookup() {
        let message = Message::EntryUpdate {
            id: 7,
            sequence: SequenceNumber::new(2),
            value: EntryValue::Number(1.5),
        };
        let bytes = message.encode(ProtocolRevision::Nt2).unwrap();
        assert_eq!(bytes.len(), 1 + 2 + 2 + 8);

        assert_eq!(
            Message::decode(&bytes, ProtocolRevision::Nt2, &no_types()),
            Err(ProtocolError::UnknownEntryId { id: 7 })
        );

        let mut types = HashMap::new();
        types.insert(7, EntryType::Number);
        let (decoded, _) = Message::decode(&bytes, ProtocolRevision::Nt2, &types)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn nt3_update_carries_type() {
        let message = Message::EntryUpdate {
            id: 7,
            sequence: SequenceNumber::new(2),
            value: EntryValue::BooleanArray(vec![true, false]),
        };
        assert_eq!(roundtrip(&message, ProtocolRevision::Nt3), message);
    }

    #[test]
    fn client_hello_follows_announced_revision() {
        let nt2 = Message::client_hello(ProtocolRevision::Nt2, "");
        let bytes = nt2.encode(ProtocolRevision::Nt2).unwrap();
        assert_eq!(bytes, [0x01, 0x02, 0x00]);

        // A 3.0 hello decodes on a 2.0 server, which then rejects it.
        let nt3 = Message::client_hello(ProtocolRevision::Nt3, "robot");
        let bytes = nt3.encode(ProtocolRevision::Nt3).unwrap();
        let (decoded, used) = Message::decode(&bytes, ProtocolRevision::Nt2, &no_types())
            .unwrap()
            .unwrap();
        assert_eq!(decoded, nt3);
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn nt3_only_messages_rejected_on_nt2() {
        for message in [
            Message::EntryDelete { id: 1 },
            Message::ClearAll,
            Message::ClientHelloComplete,
            Message::FlagsUpdate {
                id: 1,
                flags: EntryFlags::NONE,
            },
        ] {
            let code = message.type_code();
            assert_eq!(
                message.encode(ProtocolRevision::Nt2),
                Err(ProtocolError::UnknownMessage {
                    code,
                    revision: ProtocolRevision::Nt2
                })
            );
            let bytes = message.encode(ProtocolRevision::Nt3).unwrap();
            assert!(Message::decode(&bytes, ProtocolRevision::Nt2, &no_types()).is_err());
            assert_eq!(roundtrip(&message, ProtocolRevision::Nt3), message);
        }
    }

    #[test]
    fn unknown_code_is_an_error() {
        assert_eq!(
            Message::decode(&[0x20, 0x00], ProtocolRevision::Nt3, &no_types()),
            Err(ProtocolError::UnknownMessage {
                code: 0x20,
                revision: ProtocolRevision::Nt3
            })
        );
    }

    #[test]
    fn clear_all_magic_is_checked() {
        let bytes = [0x14, 0xd0, 0x6c, 0xb2, 0x7a];
        let (decoded, _) = Message::decode(&bytes, ProtocolRevision::Nt3, &no_types())
            .unwrap()
            .unwrap();
        assert_eq!(decoded, Message::ClearAll);

        assert_eq!(
            Message::decode(&[0x14, 0, 0, 0, 1], ProtocolRevision::Nt3, &no_types()),
            Err(ProtocolError::BadClearMagic { magic: 1 })
        );
    }

    #[test]
    fn partial_input_needs_more() {
        let message = Message::ServerHello {
            flags: 0,
            identity: "server".into(),
        };
        let bytes = message.encode(ProtocolRevision::Nt3).unwrap();
        for len in 0..bytes.len() {
            assert_eq!(
                Message::decode(&bytes[..len], ProtocolRevision::Nt3, &no_types()),
                Ok(None)
            );
        }
    }

    #[test]
    fn raw_value_not_encodable_on_nt2() {
        let message = Message::EntryAssignment {
            key: "/r".into(),
            id: 1,
            sequence: SequenceNumber::new(1),
            flags: EntryFlags::NONE,
            value: EntryValue::Raw(vec![1]),
        };
        assert!(matches!(
            message.encode(ProtocolRevision::Nt2),
            Err(ProtocolError::Codec(CodecError::UnsupportedType { .. }))
        ));
        assert_eq!(roundtrip(&message, ProtocolRevision::Nt3), message);
    }

    #[test]
    fn invalid_utf8_key_is_fatal() {
        let bytes = [0x10, 0x01, 0xff, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01];
        assert_eq!(
            Message::decode(&bytes, ProtocolRevision::Nt3, &no_types()),
            Err(ProtocolError::Codec(CodecError::InvalidUtf8))
        );
    }

    proptest! {
        #[test]
        fn arbitrary_input_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            for revision in ProtocolRevision::ALL {
                if let Ok(Some((_, used))) = Message::decode(&bytes, revision, &no_types()) {
                    prop_assert!(used <= bytes.len());
                }
            }
        }
    }
}
