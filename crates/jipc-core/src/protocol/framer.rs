//! Reassembles complete messages from an arbitrarily chunked byte stream.
//!
//! TCP delivers bytes with no regard for message boundaries: one read may
//! hold half a header, several whole messages, or one message plus the start
//! of the next. [`Framer`] buffers the stream in a single `BytesMut` and
//! splits off each message (header included) once its declared length has
//! arrived:
//!
//! - `AwaitingHeader`: fewer than 16 bytes of the next message are buffered.
//! - `AwaitingBody`: the header has been read; waiting for `total` bytes.
//!
//! ```rust
//! use jipc_core::{encode_message, Framer, MessageKind, Value};
//!
//! let bytes = encode_message(MessageKind::Async, &Value::from("tick")).unwrap();
//! let mut framer = Framer::new();
//!
//! assert!(framer.push(&bytes[..5]).unwrap().is_empty());
//! let messages = framer.push(&bytes[5..]).unwrap();
//! assert_eq!(messages.len(), 1);
//! assert_eq!(&messages[0][..], &bytes[..]);
//! ```

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::protocol::codec::ProtocolError;
use crate::protocol::header::{peek_body_length, HEADER_SIZE};

/// Default upper bound on a single message, header included (1 GiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u64 = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingHeader,
    AwaitingBody { total: usize },
}

/// Stream reassembler that emits whole messages as zero-copy [`Bytes`].
#[derive(Debug)]
pub struct Framer {
    buffer: BytesMut,
    state: State,
    max_message_size: u64,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Creates a framer that rejects any message whose header declares more
    /// than `max_message_size` bytes in total.
    pub fn with_max_message_size(max_message_size: u64) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::AwaitingHeader,
            max_message_size,
        }
    }

    /// Appends `chunk` and returns every message it completed, in arrival
    /// order. Leftover bytes stay buffered for the next call.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::MessageTooLarge`] if a header declares a message over
    /// the limit. The stream cannot be resynchronised after that; the caller
    /// should drop the connection.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, ProtocolError> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(message) = self.try_extract_one()? {
            messages.push(message);
        }
        Ok(messages)
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        if let State::AwaitingHeader = self.state {
            let Some(body_length) = peek_body_length(&self.buffer) else {
                return Ok(None);
            };
            let total = self.checked_total(body_length)?;
            self.state = State::AwaitingBody { total };
        }

        let State::AwaitingBody { total } = self.state else {
            return Ok(None);
        };
        if self.buffer.len() < total {
            return Ok(None);
        }

        let message = self.buffer.split_to(total).freeze();
        self.state = State::AwaitingHeader;
        trace!(length = total, buffered = self.buffer.len(), "framed message");
        Ok(Some(message))
    }

    fn checked_total(&self, body_length: u64) -> Result<usize, ProtocolError> {
        let too_large = ProtocolError::MessageTooLarge {
            declared: body_length.saturating_add(HEADER_SIZE as u64),
            max: self.max_message_size,
        };
        let total = body_length
            .checked_add(HEADER_SIZE as u64)
            .filter(|&n| n <= self.max_message_size)
            .ok_or_else(|| too_large.clone())?;
        usize::try_from(total).map_err(|_| too_large)
    }

    /// Number of bytes buffered but not yet emitted.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// `true` while a message has been started but not completed.
    pub fn is_partial(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Discards buffered bytes, e.g. before reusing the framer on a new
    /// connection.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::AwaitingHeader;
    }
}
