//! Wire value types.
//!
//! Every message body carries exactly one [`Value`]. Containers ([`Value::List`]
//! and [`Value::Dict`]) nest other values recursively; tables are carried as an
//! opaque Arrow-IPC stream blob whose contents this crate never inspects.
//!
//! # Decode-only variants
//!
//! Some variants exist only because the remote engine can send them:
//! [`Value::Byte`], [`Value::Short`], [`Value::Int`], [`Value::Real`],
//! [`Value::Symbol`] and [`Value::Date`]. The encoder never emits their narrow
//! wire tags; it widens them instead (see [`crate::protocol::codec`]).

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};

// ── Type tags ─────────────────────────────────────────────────────────────────

/// One-byte type tags that open every encoded value.
pub mod tags {
    pub const NULL: u8 = 0x00;
    pub const BOOL: u8 = 0xFF;
    pub const BYTE: u8 = 0xFE;
    pub const SHORT: u8 = 0xFD;
    pub const INT: u8 = 0xFC;
    pub const LONG: u8 = 0xFB;
    pub const DATE: u8 = 0xFA;
    pub const TIME: u8 = 0xF9;
    pub const DATETIME: u8 = 0xF8;
    pub const TIMESTAMP: u8 = 0xF7;
    pub const DURATION: u8 = 0xF6;
    pub const REAL: u8 = 0xF5;
    pub const FLOAT: u8 = 0xF4;
    pub const STRING: u8 = 0xF3;
    pub const SYMBOL: u8 = 0xF2;
    /// Function source text; decodes as a plain string.
    pub const FUNCTION: u8 = 0x9A;
    pub const ERROR: u8 = 0x80;
    pub const LIST: u8 = 0x5A;
    pub const DICT: u8 = 0x5B;
    pub const TABLE: u8 = 0x5C;
    /// First one-column table tag. Tags `0x01..=0x13` carry a single column.
    pub const COLUMN_FIRST: u8 = 0x01;
    /// Last one-column table tag.
    pub const COLUMN_LAST: u8 = 0x13;
}

/// First element of an async push that carries a table update.
pub const UPDATE_MARKER: &str = "upd";

// ── Value ─────────────────────────────────────────────────────────────────────

/// A single value as carried on the wire.
///
/// Equality is structural. Like `f64` itself, `Float(NAN) != Float(NAN)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    /// Unsigned 8-bit integer (decode-only).
    Byte(u8),
    /// Signed 16-bit integer (decode-only).
    Short(i16),
    /// Signed 32-bit integer (decode-only).
    Int(i32),
    Long(i64),
    /// 32-bit float (decode-only). Encodes widened to an `f64`, so it reads
    /// back as [`Value::Float`] (or [`Value::Long`] when integral).
    Real(f32),
    Float(f64),
    String(String),
    /// Symbol (decode-only tag, same text representation as a string).
    Symbol(String),
    /// Application error raised by the remote engine.
    Error(String),
    /// Calendar date (decode-only).
    Date(NaiveDate),
    /// Millisecond-precision point in time.
    DateTime(DateTime<Utc>),
    List(Vec<Value>),
    Dict(Dict),
    /// Arrow-IPC stream bytes, handed through unmodified.
    Table(Bytes),
}

impl Value {
    /// Short lowercase name of the variant, used in log fields and errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Byte(_) => "byte",
            Value::Short(_) => "short",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Real(_) => "real",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Error(_) => "error",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Table(_) => "table",
        }
    }

    /// `true` for values that a sync call treats as "nothing to send":
    /// null, an empty list, or an empty string.
    pub fn is_empty_request(&self) -> bool {
        match self {
            Value::Null => true,
            Value::List(items) => items.is_empty(),
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Returns the items of a table-update push, i.e. a list whose first
    /// element is the text [`UPDATE_MARKER`].
    pub fn as_update(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => match items.first() {
                Some(Value::String(s) | Value::Symbol(s)) if s == UPDATE_MARKER => Some(items),
                _ => None,
            },
            _ => None,
        }
    }

    /// Text of a string-like value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value of any integral variant.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Byte(v) => Some(i64::from(v)),
            Value::Short(v) => Some(i64::from(v)),
            Value::Int(v) => Some(i64::from(v)),
            Value::Long(v) => Some(v),
            _ => None,
        }
    }

    /// Floating-point value of any numeric variant.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Real(v) => Some(f64::from(v)),
            Value::Float(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Long(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl From<Dict> for Value {
    fn from(v: Dict) -> Self {
        Value::Dict(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Table(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ── Dict ──────────────────────────────────────────────────────────────────────

/// String-keyed dictionary that remembers insertion order.
///
/// Keys are unique. Inserting an existing key replaces its value in place, so
/// the key keeps its original position. Dictionaries on the wire are small,
/// so lookups are a linear scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict {
    entries: Vec<(String, Value)>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Inserts `value` under `key`, returning the previous value if the key
    /// was already present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Dict {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dict = Dict::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}

impl IntoIterator for Dict {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
