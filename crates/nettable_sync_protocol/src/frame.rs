//! Incremental message decoding over a byte stream.

use crate::error::ProtocolResult;
use crate::messages::{EntryTypes, Message};
use bytes::{Buf, BytesMut};
use nettable_codec::ProtocolRevision;

/// Buffers stream input and yields complete messages.
///
/// Messages are decoded one at a time so the caller can apply each before
/// the next is decoded; revision 2.0 updates depend on earlier assignments.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    revision: ProtocolRevision,
}

impl FrameDecoder {
    /// Creates a decoder for `revision`.
    pub fn new(revision: ProtocolRevision) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            revision,
        }
    }

    /// Returns the revision messages are decoded with.
    pub fn revision(&self) -> ProtocolRevision {
        self.revision
    }

    /// Switches the revision, e.g. once the handshake settles it.
    pub fn set_revision(&mut self, revision: ProtocolRevision) {
        self.revision = revision;
    }

    /// Appends received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Returns the buffer to read into directly.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Returns the number of buffered, undecoded bytes.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Decodes the next complete message, if one is buffered.
    ///
    /// # Errors
    ///
    /// Any decode failure other than incomplete input. The stream cannot be
    /// resynchronized afterwards.
    pub fn next_message(&mut self, types: &dyn EntryTypes) -> ProtocolResult<Option<Message>> {
        match Message::decode(&self.buffer, self.revision, types)? {
            Some((message, used)) => {
                self.buffer.advance(used);
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }
}
