//! Binary codec between [`Value`] and the tagged wire format.
//!
//! Every encoded value opens with a one-byte type tag. All integers are
//! little-endian. Layouts:
//!
//! ```text
//! 4-byte atoms   [tag][0;3][value:4]                                   8 bytes
//! 8-byte atoms   [tag][0;7][value:8]                                  16 bytes
//! null           [0x00][0;7]                                           8 bytes
//! text           [tag][0;3][len:u32][utf8 bytes][0-pad to 8]
//! list           [0x5A][0;3][count:u32][payload_len:u64][items...]
//! dict           [0x5B][0;3][count:u32][rest_len:u64][keys_len:u64]
//!                [end_offset:u32 * count][key bytes][0-pad to 8]
//!                [values_len:u64][values...]
//! empty dict     [0x5B][0;3][0:u32]
//! table          [0x5C][0;7 (u64 at offset 8 = blob_len)][blob]
//! ```
//!
//! # Encoding policy
//!
//! The encoder only produces a subset of the tags it can decode. Integral
//! numbers always become the 64-bit integer tag and non-integral numbers the
//! 64-bit float tag; narrow integers, dates, times, durations and timestamps
//! are decode-only.

use bytes::Bytes;
use thiserror::Error;
use tracing::trace;

use crate::protocol::header::{MessageHeader, MessageKind, HEADER_SIZE};
use crate::protocol::temporal;
use crate::protocol::value::{tags, Dict, Value};

/// Maximum nesting depth accepted when decoding untrusted input.
pub const MAX_DEPTH: usize = 256;

/// 2^63 as an `f64`; integral floats in `[-2^63, 2^63)` fit in an `i64`.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Errors that can occur during value or message encoding and decoding.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the layout requires.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// A value opened with a type tag this codec does not know.
    #[error("unsupported type tag: 0x{0:02X}")]
    UnsupportedType(u8),

    /// The kind byte in the header is not async, sync or response.
    #[error("unknown message kind: 0x{0:02X}")]
    UnknownMessageKind(u8),

    /// The header's declared body length disagrees with the encoded value.
    #[error("body length mismatch: header declares {declared} bytes, value spans {actual}")]
    LengthMismatch { declared: u64, actual: u64 },

    /// A header declared a message larger than the configured limit.
    #[error("message of {declared} bytes exceeds the {max} byte limit")]
    MessageTooLarge { declared: u64, max: u64 },

    /// The payload could not be parsed (bad offsets, out-of-range date, ...).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// How 64-bit integers are surfaced when decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LongMode {
    /// As [`Value::Long`].
    #[default]
    Native,
    /// Converted to [`Value::Float`], losing precision above 2^53.
    Float,
}

/// Options that change how certain tags are decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    pub long_mode: LongMode,
    /// Render timestamps as ISO-8601 text with nanoseconds instead of a
    /// millisecond [`Value::DateTime`].
    pub include_nanosecond: bool,
}

/// A complete decoded message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: MessageHeader,
    pub body: Value,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes `value` as a complete message (16-byte header + body).
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] if a string, list or dictionary
/// is too large for its 32-bit length field.
///
/// # Examples
///
/// ```rust
/// use jipc_core::{encode_message, decode_message, DecodeOptions, MessageKind, Value};
///
/// let bytes = encode_message(MessageKind::Sync, &Value::from("sum til 10")).unwrap();
/// let (msg, consumed) = decode_message(&bytes, DecodeOptions::default()).unwrap();
/// assert_eq!(msg.header.kind, MessageKind::Sync);
/// assert_eq!(msg.body, Value::from("sum til 10"));
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(kind: MessageKind, value: &Value) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + 64);
    buf.extend_from_slice(&[0u8; HEADER_SIZE]);
    encode_value(value, &mut buf)?;

    let body_length = (buf.len() - HEADER_SIZE) as u64;
    buf[..HEADER_SIZE].copy_from_slice(&MessageHeader::new(kind, body_length).encode());
    trace!(kind = ?kind, body_length, value_type = value.type_name(), "encoded message");
    Ok(buf)
}

/// Appends the encoding of `value` to `buf`.
///
/// # Errors
///
/// See [`encode_message`].
pub fn encode_value(value: &Value, buf: &mut Vec<u8>) -> Result<(), ProtocolError> {
    match value {
        Value::Null => buf.extend_from_slice(&[tags::NULL; 8]),
        Value::Bool(b) => write_atom4(buf, tags::BOOL, [u8::from(*b), 0, 0, 0]),
        Value::Byte(v) => write_long(buf, i64::from(*v)),
        Value::Short(v) => write_long(buf, i64::from(*v)),
        Value::Int(v) => write_long(buf, i64::from(*v)),
        Value::Long(v) => write_long(buf, *v),
        Value::Real(v) => write_number(buf, f64::from(*v)),
        Value::Float(v) => write_number(buf, *v),
        Value::String(s) | Value::Symbol(s) => write_text(buf, tags::STRING, s)?,
        Value::Error(s) => write_text(buf, tags::ERROR, s)?,
        Value::Date(d) => write_atom8(buf, tags::DATETIME, temporal::date_to_millis(*d).to_le_bytes()),
        Value::DateTime(dt) => write_atom8(buf, tags::DATETIME, dt.timestamp_millis().to_le_bytes()),
        Value::List(items) => encode_list(buf, items)?,
        Value::Dict(dict) => encode_dict(buf, dict)?,
        Value::Table(blob) => {
            write_atom8(buf, tags::TABLE, (blob.len() as u64).to_le_bytes());
            buf.extend_from_slice(blob);
        }
    }
    Ok(())
}

/// Decodes one value from the start of `bytes`.
///
/// Returns the value and the number of bytes it spanned.
///
/// # Errors
///
/// [`ProtocolError::UnsupportedType`] for an unknown tag,
/// [`ProtocolError::InsufficientData`] if `bytes` ends mid-value, and
/// [`ProtocolError::MalformedPayload`] for structurally invalid input.
pub fn decode_value(bytes: &[u8], options: DecodeOptions) -> Result<(Value, usize), ProtocolError> {
    let mut reader = Reader::new(bytes);
    let value = read_value(&mut reader, options, 0)?;
    Ok((value, reader.pos))
}

/// Decodes the body of a message whose header has already been parsed.
///
/// `body` must hold at least `header.body_length` bytes; the value must span
/// exactly that many.
///
/// # Errors
///
/// [`ProtocolError::LengthMismatch`] if the value is shorter or longer than
/// the declared length, plus any error from [`decode_value`].
pub fn decode_body(
    header: &MessageHeader,
    body: &[u8],
    options: DecodeOptions,
) -> Result<Value, ProtocolError> {
    let declared = usize::try_from(header.body_length).map_err(|_| ProtocolError::LengthMismatch {
        declared: header.body_length,
        actual: body.len() as u64,
    })?;
    let body = body.get(..declared).ok_or(ProtocolError::InsufficientData {
        needed: declared,
        available: body.len(),
    })?;

    let (value, consumed) = decode_value(body, options).map_err(|e| match e {
        ProtocolError::InsufficientData { needed, .. } => ProtocolError::LengthMismatch {
            declared: header.body_length,
            actual: needed as u64,
        },
        other => other,
    })?;

    if consumed != declared {
        return Err(ProtocolError::LengthMismatch {
            declared: header.body_length,
            actual: consumed as u64,
        });
    }
    Ok(value)
}

/// Decodes one complete message from the beginning of `bytes`.
///
/// Returns the message and the total number of bytes consumed (header +
/// body), so the caller can advance its read cursor.
///
/// # Errors
///
/// [`ProtocolError::InsufficientData`] if `bytes` does not yet hold the whole
/// message, plus any error from [`MessageHeader::decode`] or [`decode_body`].
pub fn decode_message(
    bytes: &[u8],
    options: DecodeOptions,
) -> Result<(Message, usize), ProtocolError> {
    let header = MessageHeader::decode(bytes)?;
    let total = header
        .message_length()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or(ProtocolError::MessageTooLarge {
            declared: header.body_length,
            max: usize::MAX as u64,
        })?;
    if bytes.len() < total {
        return Err(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    let body = decode_body(&header, &bytes[HEADER_SIZE..total], options)?;
    Ok((Message { header, body }, total))
}

// ── Encoding helpers ──────────────────────────────────────────────────────────

fn write_atom4(buf: &mut Vec<u8>, tag: u8, value: [u8; 4]) {
    buf.extend_from_slice(&[tag, 0, 0, 0]);
    buf.extend_from_slice(&value);
}

/// 8-byte values sit behind an 8-byte header so they stay 8-byte aligned.
fn write_atom8(buf: &mut Vec<u8>, tag: u8, value: [u8; 8]) {
    buf.extend_from_slice(&[tag, 0, 0, 0, 0, 0, 0, 0]);
    buf.extend_from_slice(&value);
}

fn write_long(buf: &mut Vec<u8>, v: i64) {
    write_atom8(buf, tags::LONG, v.to_le_bytes());
}

fn write_number(buf: &mut Vec<u8>, v: f64) {
    // NaN and the infinities have a NaN fractional part and stay floats.
    if v.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&v) {
        write_long(buf, v as i64);
    } else {
        write_atom8(buf, tags::FLOAT, v.to_le_bytes());
    }
}

fn write_text(buf: &mut Vec<u8>, tag: u8, text: &str) -> Result<(), ProtocolError> {
    let bytes = text.as_bytes();
    let len = length_u32(bytes.len(), "string")?;
    buf.extend_from_slice(&[tag, 0, 0, 0]);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    pad_to_eight(buf, bytes.len());
    Ok(())
}

fn encode_list(buf: &mut Vec<u8>, items: &[Value]) -> Result<(), ProtocolError> {
    let count = length_u32(items.len(), "list")?;
    buf.extend_from_slice(&[tags::LIST, 0, 0, 0]);
    buf.extend_from_slice(&count.to_le_bytes());
    let payload_len_at = reserve_u64(buf);

    let start = buf.len();
    for item in items {
        encode_value(item, buf)?;
    }
    let payload_len = (buf.len() - start) as u64;
    patch_u64(buf, payload_len_at, payload_len);
    Ok(())
}

fn encode_dict(buf: &mut Vec<u8>, dict: &Dict) -> Result<(), ProtocolError> {
    let count = length_u32(dict.len(), "dictionary")?;
    buf.extend_from_slice(&[tags::DICT, 0, 0, 0]);
    buf.extend_from_slice(&count.to_le_bytes());
    if count == 0 {
        return Ok(());
    }

    let rest_len_at = reserve_u64(buf);
    let keys_len_at = reserve_u64(buf);

    // Key section: cumulative end offsets, then the concatenated key bytes.
    let keys_start = buf.len();
    let mut end: u32 = 0;
    for key in dict.keys() {
        end = end
            .checked_add(length_u32(key.len(), "dictionary key")?)
            .ok_or_else(|| ProtocolError::MalformedPayload("dictionary keys exceed 4 GiB".into()))?;
        buf.extend_from_slice(&end.to_le_bytes());
    }
    for key in dict.keys() {
        buf.extend_from_slice(key.as_bytes());
    }
    let keys_written = buf.len() - keys_start;
    pad_to_eight(buf, keys_written);
    let keys_len = (buf.len() - keys_start) as u64;

    let values_len_at = reserve_u64(buf);
    let values_start = buf.len();
    for value in dict.values() {
        encode_value(value, buf)?;
    }
    let values_len = (buf.len() - values_start) as u64;

    patch_u64(buf, rest_len_at, keys_len + values_len);
    patch_u64(buf, keys_len_at, keys_len);
    patch_u64(buf, values_len_at, values_len);
    Ok(())
}

fn length_u32(len: usize, what: &str) -> Result<u32, ProtocolError> {
    u32::try_from(len)
        .map_err(|_| ProtocolError::MalformedPayload(format!("{what} length {len} exceeds u32")))
}

fn padding(len: usize) -> usize {
    (8 - len % 8) % 8
}

fn pad_to_eight(buf: &mut Vec<u8>, len: usize) {
    buf.resize(buf.len() + padding(len), 0);
}

/// Appends a zeroed u64 placeholder and returns its offset.
fn reserve_u64(buf: &mut Vec<u8>) -> usize {
    let at = buf.len();
    buf.extend_from_slice(&[0u8; 8]);
    at
}

fn patch_u64(buf: &mut [u8], at: usize, value: u64) {
    buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Bounds-checked cursor over untrusted input.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(ProtocolError::InsufficientData {
                needed: self.pos.saturating_add(n),
                available: self.buf.len(),
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.take(n).map(|_| ())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64_len(&mut self, what: &str) -> Result<usize, ProtocolError> {
        let raw = u64::from_le_bytes(self.array()?);
        usize::try_from(raw)
            .map_err(|_| ProtocolError::MalformedPayload(format!("{what} length {raw} exceeds usize")))
    }

    fn i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(i64::from_le_bytes(self.array()?))
    }
}

fn read_value(r: &mut Reader<'_>, options: DecodeOptions, depth: usize) -> Result<Value, ProtocolError> {
    if depth > MAX_DEPTH {
        return Err(ProtocolError::MalformedPayload(format!(
            "nesting deeper than {MAX_DEPTH} levels"
        )));
    }

    let [tag, ..] = r.array::<4>()?;
    match tag {
        tags::NULL => {
            r.skip(4)?;
            Ok(Value::Null)
        }
        tags::BOOL => Ok(Value::Bool(r.array::<4>()?[0] == 1)),
        tags::BYTE => Ok(Value::Byte(r.array::<4>()?[0])),
        tags::SHORT => {
            let [lo, hi, ..] = r.array::<4>()?;
            Ok(Value::Short(i16::from_le_bytes([lo, hi])))
        }
        tags::INT => Ok(Value::Int(i32::from_le_bytes(r.array()?))),
        tags::DATE => {
            let days = i32::from_le_bytes(r.array()?);
            temporal::date_from_days(days)
                .map(Value::Date)
                .ok_or_else(|| ProtocolError::MalformedPayload(format!("date {days} out of range")))
        }
        tags::REAL => Ok(Value::Real(f32::from_le_bytes(r.array()?))),
        tags::FLOAT => {
            r.skip(4)?;
            Ok(Value::Float(f64::from_le_bytes(r.array()?)))
        }
        tags::LONG | tags::TIME | tags::DATETIME | tags::TIMESTAMP | tags::DURATION => {
            r.skip(4)?;
            let raw = r.i64()?;
            decode_long_family(tag, raw, options)
        }
        tags::STRING | tags::FUNCTION => read_text(r).map(Value::String),
        tags::SYMBOL => read_text(r).map(Value::Symbol),
        tags::ERROR => read_text(r).map(Value::Error),
        tags::LIST => read_list(r, options, depth),
        tags::DICT => read_dict(r, options, depth),
        tags::TABLE | tags::COLUMN_FIRST..=tags::COLUMN_LAST => {
            r.skip(4)?;
            let len = r.u64_len("table")?;
            Ok(Value::Table(Bytes::copy_from_slice(r.take(len)?)))
        }
        other => Err(ProtocolError::UnsupportedType(other)),
    }
}

fn decode_long_family(tag: u8, raw: i64, options: DecodeOptions) -> Result<Value, ProtocolError> {
    let out_of_range = || ProtocolError::MalformedPayload(format!("tag 0x{tag:02X} value {raw} out of range"));
    match tag {
        tags::LONG => Ok(match options.long_mode {
            LongMode::Native => Value::Long(raw),
            LongMode::Float => Value::Float(raw as f64),
        }),
        tags::TIME => Ok(Value::String(temporal::format_time(raw))),
        tags::DATETIME => temporal::datetime_from_millis(raw)
            .map(Value::DateTime)
            .ok_or_else(out_of_range),
        tags::TIMESTAMP if options.include_nanosecond => {
            Ok(Value::String(temporal::format_timestamp_nanos(raw)))
        }
        tags::TIMESTAMP => temporal::timestamp_to_datetime(raw)
            .map(Value::DateTime)
            .ok_or_else(out_of_range),
        _ => Ok(Value::String(temporal::format_duration(raw))),
    }
}

fn read_text(r: &mut Reader<'_>) -> Result<String, ProtocolError> {
    let len = r.u32()? as usize;
    let bytes = r.take(len)?;
    r.skip(padding(len))?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn read_list(r: &mut Reader<'_>, options: DecodeOptions, depth: usize) -> Result<Value, ProtocolError> {
    let count = r.u32()? as usize;
    // Payload length only allows skipping ahead; items are walked instead.
    r.skip(8)?;

    // Every item is at least 8 bytes, which bounds a hostile count.
    let mut items = Vec::with_capacity(count.min(r.remaining() / 8));
    for _ in 0..count {
        items.push(read_value(r, options, depth + 1)?);
    }
    Ok(Value::List(items))
}

fn read_dict(r: &mut Reader<'_>, options: DecodeOptions, depth: usize) -> Result<Value, ProtocolError> {
    let count = r.u32()? as usize;
    if count == 0 {
        return Ok(Value::Dict(Dict::new()));
    }

    r.skip(8)?; // remaining length
    let keys_len = r.u64_len("dictionary key section")?;
    let key_section = r.take(keys_len)?;
    r.skip(padding(keys_len))?;
    r.skip(8)?; // values length

    let offsets_len = count
        .checked_mul(4)
        .filter(|&n| n <= key_section.len())
        .ok_or_else(|| {
            ProtocolError::MalformedPayload(format!(
                "dictionary of {count} keys does not fit a {keys_len} byte key section"
            ))
        })?;
    let (offsets, key_bytes) = key_section.split_at(offsets_len);

    let mut dict = Dict::with_capacity(count);
    let mut prev = 0usize;
    for chunk in offsets.chunks_exact(4) {
        let end = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as usize;
        let key = key_bytes.get(prev..end).ok_or_else(|| {
            ProtocolError::MalformedPayload(format!("dictionary key offsets {prev}..{end} out of bounds"))
        })?;
        prev = end;
        let key = String::from_utf8_lossy(key).into_owned();
        let value = read_value(r, options, depth + 1)?;
        dict.insert(key, value);
    }
    Ok(Value::Dict(dict))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn encode(value: &Value) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_value(value, &mut buf).expect("encode failed");
        buf
    }

    fn decode(bytes: &[u8]) -> Value {
        let (value, consumed) = decode_value(bytes, DecodeOptions::default()).expect("decode failed");
        assert_eq!(consumed, bytes.len(), "value must span the whole buffer");
        value
    }

    fn round_trip(value: &Value) -> Value {
        decode(&encode(value))
    }

    // ── Atoms ────────────────────────────────────────────────────────────────

    #[test]
    fn test_null_is_eight_zero_bytes() {
        assert_eq!(encode(&Value::Null), vec![0u8; 8]);
        assert_eq!(decode(&[0u8; 8]), Value::Null);
    }

    #[test]
    fn test_bool_layout() {
        assert_eq!(encode(&Value::Bool(true)), vec![0xFF, 0, 0, 0, 1, 0, 0, 0]);
        assert_eq!(encode(&Value::Bool(false)), vec![0xFF, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_integral_numbers_encode_as_long() {
        for value in [
            Value::Byte(1),
            Value::Short(-2),
            Value::Int(99),
            Value::Long(i64::MIN),
            Value::Float(99.0),
            Value::Real(-4.0),
        ] {
            let bytes = encode(&value);
            assert_eq!(bytes.len(), 16);
            assert_eq!(bytes[0], tags::LONG, "{value:?} must use the long tag");
        }
    }

    #[test]
    fn test_non_integral_numbers_encode_as_float() {
        for v in [3.14, f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1e19, -1e300] {
            let bytes = encode(&Value::Float(v));
            assert_eq!(bytes[0], tags::FLOAT, "{v} must use the float tag");
            assert_eq!(&bytes[8..], &v.to_le_bytes());
        }
    }

    #[test]
    fn test_float_decode_is_bit_exact() {
        for bits in [0x7FF8_0000_0000_0000u64, 0x7FF0_0000_0000_0000, 0xFFF0_0000_0000_0000] {
            let mut bytes = vec![tags::FLOAT, 0, 0, 0, 0, 0, 0, 0];
            bytes.extend_from_slice(&bits.to_le_bytes());
            match decode(&bytes) {
                Value::Float(f) => assert_eq!(f.to_bits(), bits),
                other => panic!("expected float, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_narrow_integers_decode() {
        assert_eq!(decode(&[0xFE, 0, 0, 0, 1, 0, 0, 0]), Value::Byte(1));
        assert_eq!(decode(&[0xFD, 0, 0, 0, 0xAA, 0, 0, 0]), Value::Short(170));
        assert_eq!(decode(&[0xFC, 0, 0, 0, 0x63, 0, 0, 0]), Value::Int(99));
    }

    #[test]
    fn test_long_mode_float_converts() {
        let bytes = encode(&Value::Long(99));
        let options = DecodeOptions {
            long_mode: LongMode::Float,
            ..DecodeOptions::default()
        };
        let (value, _) = decode_value(&bytes, options).unwrap();
        assert_eq!(value, Value::Float(99.0));
    }

    #[test]
    fn test_datetime_round_trip_millisecond_precision() {
        let dt = Utc.with_ymd_and_hms(1992, 10, 3, 14, 42, 56).unwrap()
            + chrono::TimeDelta::milliseconds(864);
        assert_eq!(round_trip(&Value::DateTime(dt)), Value::DateTime(dt));
    }

    #[test]
    fn test_date_encodes_as_datetime_midnight() {
        let date = chrono::NaiveDate::from_ymd_opt(2022, 10, 4).unwrap();
        let bytes = encode(&Value::Date(date));
        assert_eq!(bytes[0], tags::DATETIME);
        assert_eq!(
            decode(&bytes),
            Value::DateTime(Utc.with_ymd_and_hms(2022, 10, 4, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_timestamp_modes() {
        let mut bytes = vec![tags::TIMESTAMP, 0, 0, 0, 0, 0, 0, 0];
        bytes.extend_from_slice(&1i64.to_le_bytes());

        let (plain, _) = decode_value(&bytes, DecodeOptions::default()).unwrap();
        assert_eq!(plain, Value::DateTime(Utc.timestamp_millis_opt(0).unwrap()));

        let options = DecodeOptions {
            include_nanosecond: true,
            ..DecodeOptions::default()
        };
        let (nanos, _) = decode_value(&bytes, options).unwrap();
        assert_eq!(nanos, Value::from("1970-01-01T00:00:00.000000001"));
    }

    // ── Text ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_string_padding_keeps_eight_byte_alignment() {
        for len in 0..=17 {
            let s = "x".repeat(len);
            let bytes = encode(&Value::from(s.as_str()));
            assert_eq!(bytes.len() % 8, 0, "length {len}");
            assert_eq!(bytes.len(), 8 + len + padding(len));
            assert_eq!(decode(&bytes), Value::from(s));
        }
    }

    #[test]
    fn test_symbol_function_and_error_tags() {
        let mut symbol = vec![tags::SYMBOL, 0, 0, 0, 1, 0, 0, 0];
        symbol.extend_from_slice(b"a\0\0\0\0\0\0\0");
        assert_eq!(decode(&symbol), Value::Symbol("a".into()));

        let mut function = vec![tags::FUNCTION, 0, 0, 0, 10, 0, 0, 0];
        function.extend_from_slice(b"{[x;y]x+y}\0\0\0\0\0\0");
        assert_eq!(decode(&function), Value::from("{[x;y]x+y}"));

        let error = Value::Error("type".into());
        let bytes = encode(&error);
        assert_eq!(bytes[0], tags::ERROR);
        assert_eq!(decode(&bytes), error);
    }

    #[test]
    fn test_symbol_encodes_as_string_tag() {
        let bytes = encode(&Value::Symbol("sym".into()));
        assert_eq!(bytes[0], tags::STRING);
    }

    // ── Containers ───────────────────────────────────────────────────────────

    #[test]
    fn test_list_header_records_count_and_payload_length() {
        let list = Value::from(vec![true, false]);
        let bytes = encode(&list);

        assert_eq!(&bytes[..8], &[tags::LIST, 0, 0, 0, 2, 0, 0, 0]);
        assert_eq!(u64::from_le_bytes(bytes[8..16].try_into().unwrap()), 16);
        assert_eq!(decode(&bytes), list);
    }

    #[test]
    fn test_list_appended_after_existing_bytes_patches_its_own_length() {
        // Arrange
        let mut buf = vec![0xAA; 5];
        let list = Value::from(vec![1i64, 2]);

        // Act
        encode_value(&list, &mut buf).unwrap();

        // Assert
        assert_eq!(&buf[..5], &[0xAA; 5]);
        assert_eq!(u64::from_le_bytes(buf[13..21].try_into().unwrap()), 32);
        let (value, consumed) = decode_value(&buf[5..], DecodeOptions::default()).unwrap();
        assert_eq!(value, list);
        assert_eq!(consumed, buf.len() - 5);
    }

    #[test]
    fn test_real_widens_to_float_on_encode() {
        let bytes = encode(&Value::Real(1.5));
        assert_eq!(bytes[0], tags::FLOAT);
        assert_eq!(decode(&bytes), Value::Float(1.5));
    }

    #[test]
    fn test_nested_containers_round_trip() {
        let mut inner = Dict::new();
        inner.insert("qty", 100);
        inner.insert("tags", vec!["a", "b"]);
        let value = Value::from(vec![
            Value::from("upd"),
            Value::Dict(inner),
            Value::List(vec![]),
            Value::Null,
        ]);
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn test_empty_dict_is_degenerate_header() {
        let bytes = encode(&Value::Dict(Dict::new()));
        assert_eq!(bytes, vec![tags::DICT, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(decode(&bytes), Value::Dict(Dict::new()));
    }

    #[test]
    fn test_dict_key_section_is_padded() {
        // 1 offset (4 bytes) + "abc" (3 bytes) = 7, padded to 8.
        let dict: Dict = [("abc", Value::Long(1))].into_iter().collect();
        let bytes = encode(&Value::Dict(dict.clone()));

        assert_eq!(u64::from_le_bytes(bytes[16..24].try_into().unwrap()), 8);
        assert_eq!(&bytes[24..32], &[3, 0, 0, 0, b'a', b'b', b'c', 0]);
        assert_eq!(decode(&bytes), Value::Dict(dict));
    }

    #[test]
    fn test_dict_with_bad_offsets_is_malformed() {
        let dict: Dict = [("abc", Value::Long(1))].into_iter().collect();
        let mut bytes = encode(&Value::Dict(dict));
        bytes[24] = 9; // end offset past the key bytes

        let result = decode_value(&bytes, DecodeOptions::default());
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_table_blob_round_trip_and_column_tags() {
        let blob = Bytes::from_static(b"\xff\xff\xff\xffARROW");
        let bytes = encode(&Value::Table(blob.clone()));
        assert_eq!(bytes[0], tags::TABLE);
        assert_eq!(u64::from_le_bytes(bytes[8..16].try_into().unwrap()), 9);
        assert_eq!(decode(&bytes), Value::Table(blob.clone()));

        let mut column = bytes.clone();
        column[0] = 0x0B;
        assert_eq!(decode(&column), Value::Table(blob));
    }

    // ── Errors ───────────────────────────────────────────────────────────────

    #[test]
    fn test_unknown_tag_is_unsupported_type() {
        let result = decode_value(&[0x42, 0, 0, 0, 0, 0, 0, 0], DecodeOptions::default());
        assert_eq!(result, Err(ProtocolError::UnsupportedType(0x42)));
    }

    #[test]
    fn test_truncated_atom_is_insufficient_data() {
        let bytes = encode(&Value::Long(7));
        let result = decode_value(&bytes[..12], DecodeOptions::default());
        assert!(matches!(result, Err(ProtocolError::InsufficientData { .. })));
    }

    #[test]
    fn test_hostile_list_count_does_not_preallocate() {
        let mut bytes = vec![tags::LIST, 0, 0, 0];
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]);

        let result = decode_value(&bytes, DecodeOptions::default());
        assert!(matches!(result, Err(ProtocolError::InsufficientData { .. })));
    }

    #[test]
    fn test_excessive_nesting_is_rejected() {
        let mut bytes = Vec::new();
        for _ in 0..=MAX_DEPTH + 1 {
            bytes.extend_from_slice(&[tags::LIST, 0, 0, 0, 1, 0, 0, 0]);
            bytes.extend_from_slice(&[0u8; 8]);
        }
        bytes.extend_from_slice(&[0u8; 8]);

        let result = decode_value(&bytes, DecodeOptions::default());
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    // ── Messages ─────────────────────────────────────────────────────────────

    #[test]
    fn test_message_header_declares_body_length() {
        let bytes = encode_message(MessageKind::Sync, &Value::from("18")).unwrap();
        let header = MessageHeader::decode(&bytes).unwrap();

        assert_eq!(header.kind, MessageKind::Sync);
        assert_eq!(header.body_length as usize, bytes.len() - HEADER_SIZE);
    }

    #[test]
    fn test_body_shorter_than_declared_is_length_mismatch() {
        let mut bytes = encode_message(MessageKind::Response, &Value::Long(1)).unwrap();
        bytes[8] = 8; // declare 8 bytes for a 16-byte atom
        bytes.truncate(HEADER_SIZE + 8);

        let result = decode_message(&bytes, DecodeOptions::default());
        assert_eq!(
            result,
            Err(ProtocolError::LengthMismatch {
                declared: 8,
                actual: 16
            })
        );
    }

    #[test]
    fn test_body_longer_than_value_is_length_mismatch() {
        let mut bytes = encode_message(MessageKind::Response, &Value::Null).unwrap();
        bytes[8] = 16;
        bytes.extend_from_slice(&[0u8; 8]);

        let result = decode_message(&bytes, DecodeOptions::default());
        assert_eq!(
            result,
            Err(ProtocolError::LengthMismatch {
                declared: 16,
                actual: 8
            })
        );
    }

    #[test]
    fn test_decode_message_waits_for_full_body() {
        let bytes = encode_message(MessageKind::Async, &Value::from("partial")).unwrap();
        let result = decode_message(&bytes[..bytes.len() - 1], DecodeOptions::default());
        assert!(matches!(result, Err(ProtocolError::InsufficientData { .. })));
    }
}
