//! Protocol module containing wire values, the message header, the codec and
//! the stream framer.

pub mod codec;
pub mod framer;
pub mod header;
pub mod temporal;
pub mod value;

pub use codec::{decode_message, encode_message, DecodeOptions, ProtocolError};
pub use framer::Framer;
pub use header::{MessageHeader, MessageKind};
pub use value::{tags, Dict, Value};
