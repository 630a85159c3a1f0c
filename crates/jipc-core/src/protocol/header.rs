//! The fixed 16-byte message header.
//!
//! Wire format:
//! ```text
//! [encoding:1][kind:1][reserved:6][body_len:8]
//! ```
//! `body_len` is a little-endian `u64`. Total message size is
//! `HEADER_SIZE + body_len`.

use crate::protocol::codec::ProtocolError;
use crate::protocol::value::tags;

/// Size of the message header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Encoding flag for an uncompressed little-endian body; the only value this
/// client ever sends.
pub const ENCODING_LITTLE_ENDIAN: u8 = 0x01;

/// Offset of the body length field within the header.
const BODY_LENGTH_OFFSET: usize = 8;

/// Canned reply to a peer-initiated sync request: a response message whose
/// body is the boolean `true`.
pub const ACK_MESSAGE: [u8; 24] = [
    ENCODING_LITTLE_ENDIAN,
    MessageKind::Response as u8,
    0,
    0,
    0,
    0,
    0,
    0,
    8,
    0,
    0,
    0,
    0,
    0,
    0,
    0,
    tags::BOOL,
    0,
    0,
    0,
    1,
    0,
    0,
    0,
];

/// The kind byte: what the receiver is expected to do with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Fire-and-forget; no response follows.
    Async = 0x00,
    /// Request that expects exactly one [`MessageKind::Response`].
    Sync = 0x01,
    /// Reply to the oldest outstanding sync request.
    Response = 0x02,
}

impl TryFrom<u8> for MessageKind {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(MessageKind::Async),
            0x01 => Ok(MessageKind::Sync),
            0x02 => Ok(MessageKind::Response),
            other => Err(ProtocolError::UnknownMessageKind(other)),
        }
    }
}

/// Decoded message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Encoding/compression flag (byte 0).
    pub encoding: u8,
    pub kind: MessageKind,
    /// Declared body length in bytes, excluding the header.
    pub body_length: u64,
}

impl MessageHeader {
    /// Creates an uncompressed little-endian header.
    pub fn new(kind: MessageKind, body_length: u64) -> Self {
        Self {
            encoding: ENCODING_LITTLE_ENDIAN,
            kind,
            body_length,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.encoding;
        buf[1] = self.kind as u8;
        buf[BODY_LENGTH_OFFSET..].copy_from_slice(&self.body_length.to_le_bytes());
        buf
    }

    /// Decodes the header at the start of `buf`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::InsufficientData`] if fewer than 16 bytes are given,
    /// [`ProtocolError::UnknownMessageKind`] for a kind byte other than 0, 1, 2.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let body_length = peek_body_length(buf).ok_or(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: buf.len(),
        })?;
        Ok(Self {
            encoding: buf[0],
            kind: MessageKind::try_from(buf[1])?,
            body_length,
        })
    }

    /// Total message length (header + body), or `None` on overflow.
    pub fn message_length(&self) -> Option<u64> {
        self.body_length.checked_add(HEADER_SIZE as u64)
    }
}

/// Reads the declared body length without validating the other header bytes.
///
/// Returns `None` if `buf` is shorter than [`HEADER_SIZE`].
pub fn peek_body_length(buf: &[u8]) -> Option<u64> {
    let field = buf.get(BODY_LENGTH_OFFSET..HEADER_SIZE)?;
    Some(u64::from_le_bytes(field.try_into().ok()?))
}
