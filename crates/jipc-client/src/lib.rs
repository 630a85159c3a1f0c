//! # jipc-client
//!
//! Async client for the jipc binary IPC protocol, built on tokio.
//!
//! A [`Connection`] dials the engine over TCP or TLS, authenticates, and then
//! carries sync requests (answered strictly in order), fire-and-forget async
//! messages, and server-pushed table updates.
//!
//! # Architecture overview
//!
//! - **`config`** – [`ConnectionConfig`], loadable from TOML.
//! - **`error`** – [`ClientError`].
//! - **`connection::transport`** – TCP/TLS stream setup.
//! - **`connection::handshake`** – credential exchange and version check.
//! - **`connection::correlator`** – FIFO pending-request queue and inbound
//!   dispatch by message kind.
//! - **`connection`** – [`Connection`] itself: reader task, write path,
//!   events and state.
//!
//! ```no_run
//! use jipc_client::{Connection, ConnectionConfig, ConnectionEvent};
//! use jipc_core::Value;
//!
//! # async fn run() -> Result<(), jipc_client::ClientError> {
//! let mut conn = Connection::connect(ConnectionConfig::new("localhost", 5000)).await?;
//! let mut events = conn.subscribe();
//!
//! let sum = conn.sync(&Value::from("sum til 10")).await?;
//! assert_eq!(sum, Value::Long(45));
//!
//! conn.asyn(&Value::from(vec![".u.sub", "trade", ""])).await?;
//! while let Ok(ConnectionEvent::Update(update)) = events.recv().await {
//!     println!("{update:?}");
//! }
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;

pub use config::{ConfigError, ConnectionConfig, TlsConfig};
pub use connection::{Connection, ConnectionEvent, ConnectionState};
pub use error::ClientError;
