//! TOML-backed connection settings.
//!
//! Every field has a default, so a config file only needs to name what
//! differs:
//!
//! ```toml
//! host = "ticks.internal"
//! port = 5010
//! user = "svc-feed"
//! password = "secret"
//! socket_timeout_ms = 30000
//!
//! [tls]
//! enabled = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use jipc_core::protocol::framer::DEFAULT_MAX_MESSAGE_SIZE;
use jipc_core::{DecodeOptions, LongMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for loading or validating a [`ConnectionConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds a value the client cannot use.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Config schema ─────────────────────────────────────────────────────────────

/// Settings for one [`crate::Connection`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login name. Empty means the `USER` environment variable.
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub tls: TlsConfig,
    /// Idle read timeout in milliseconds; 0 disables it.
    #[serde(default)]
    pub socket_timeout_ms: u64,
    /// TCP dial timeout in milliseconds; 0 disables it.
    #[serde(default)]
    pub connect_timeout_ms: u64,
    /// Set `TCP_NODELAY` on the socket.
    #[serde(default = "default_true")]
    pub no_delay: bool,
    /// Decode 64-bit integers as floats instead of native integers.
    #[serde(default)]
    pub long_as_float: bool,
    /// Decode timestamps as nanosecond ISO-8601 text.
    #[serde(default)]
    pub include_nanosecond: bool,
    /// Largest accepted inbound message, header included.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: u64,
    /// Buffer size of the event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

/// Transport security settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// SNI name to present; defaults to `host`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_true() -> bool {
    true
}
fn default_max_message_size() -> u64 {
    DEFAULT_MAX_MESSAGE_SIZE
}
fn default_event_capacity() -> usize {
    256
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: String::new(),
            password: String::new(),
            tls: TlsConfig::default(),
            socket_timeout_ms: 0,
            connect_timeout_ms: 0,
            no_delay: default_true(),
            long_as_float: false,
            include_nanosecond: false,
            max_message_size: default_max_message_size(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl ConnectionConfig {
    /// Config for `host:port` with every other field at its default.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed TOML, [`ConfigError::Invalid`] if
    /// [`ConnectionConfig::validate`] rejects the result.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the TOML file at `path`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`ConnectionConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Checks the fields that serde cannot.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be non-zero".into()));
        }
        if self.max_message_size < jipc_core::HEADER_SIZE as u64 {
            return Err(ConfigError::Invalid(format!(
                "max_message_size must be at least {} bytes",
                jipc_core::HEADER_SIZE
            )));
        }
        Ok(())
    }

    /// The login name to send: `user`, or `$USER` when `user` is empty.
    pub fn resolved_user(&self) -> String {
        if self.user.is_empty() {
            std::env::var("USER").unwrap_or_default()
        } else {
            self.user.clone()
        }
    }

    pub fn socket_timeout(&self) -> Option<Duration> {
        (self.socket_timeout_ms > 0).then(|| Duration::from_millis(self.socket_timeout_ms))
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }

    /// Name presented for TLS SNI.
    pub fn server_name(&self) -> &str {
        self.tls.server_name.as_deref().unwrap_or(&self.host)
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            long_mode: if self.long_as_float {
                LongMode::Float
            } else {
                LongMode::Native
            },
            include_nanosecond: self.include_nanosecond,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
