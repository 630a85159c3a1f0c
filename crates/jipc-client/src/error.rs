//! Error type for the client connection layer.

use jipc_core::ProtocolError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by [`crate::Connection`] operations.
///
/// Transport-level variants are terminal for the connection: every queued
/// request fails and writes are refused until [`crate::Connection::reconnect`].
/// [`ClientError::Protocol`] is local to a single message.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket-level failure (connect refused, reset, broken pipe, ...).
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// TLS configuration or negotiation failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The connection closed while a request was outstanding, or a write was
    /// attempted after it closed.
    #[error("lost connection")]
    LostConnection,

    /// The server closed the socket without answering the handshake.
    #[error("wrong credentials")]
    WrongCredentials,

    /// The server answered the handshake with a version below the minimum.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The server's handshake reply was not exactly one byte.
    #[error("invalid auth response: expected 1 byte, got {0}")]
    InvalidAuthResponse(usize),

    /// The user name or password cannot be sent in a handshake.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The TCP dial did not complete within the configured timeout.
    #[error("connect timed out after {0} ms")]
    ConnectTimeout(u64),

    /// The connection settings were rejected before dialing.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A message could not be encoded or a response could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// `true` for errors after which the connection can no longer be used.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClientError::Protocol(_))
    }
}
