//! # jipc-core
//!
//! Protocol layer for the jipc binary IPC protocol: the self-describing value
//! codec, the 16-byte message header, and the stream framer that reassembles
//! complete messages from arbitrarily chunked socket reads.
//!
//! This crate has no dependency on sockets or an async runtime; the
//! `jipc-client` crate drives it from a tokio connection.
//!
//! # Architecture overview
//!
//! - **`protocol::value`** – [`Value`], the sum type for everything that can
//!   travel on the wire, plus the insertion-ordered [`Dict`].
//! - **`protocol::header`** – [`MessageHeader`] and [`MessageKind`]: the fixed
//!   16-byte prefix of every message (encoding flag, kind, body length).
//! - **`protocol::codec`** – recursive encode/decode between [`Value`] and the
//!   tagged binary body format.
//! - **`protocol::framer`** – [`Framer`], which turns a byte stream into a
//!   sequence of complete messages.
//!
//! ```text
//! ┌────────────── 16-byte header ──────────────┐┌──── body ────┐
//! │ enc │ kind │ reserved (6) │ body_len (u64 LE) ││ one Value    │
//! └────────────────────────────────────────────┘└──────────────┘
//! ```

pub mod protocol;

pub use bytes::Bytes;
pub use chrono;

pub use protocol::codec::{
    decode_body, decode_message, decode_value, encode_message, encode_value, DecodeOptions,
    LongMode, Message, ProtocolError,
};
pub use protocol::framer::Framer;
pub use protocol::header::{MessageHeader, MessageKind, ACK_MESSAGE, HEADER_SIZE};
pub use protocol::value::{Dict, Value};
