//! A single authenticated connection to the engine.
//!
//! Architecture:
//! - `transport::open` dials TCP (optionally TLS) and `handshake::authenticate`
//!   trades credentials for a protocol version.
//! - The stream is split. A spawned reader task owns the read half and a
//!   [`Framer`]; it dispatches every complete message through
//!   `correlator::classify`.
//! - The write half sits behind an async mutex shared by callers and the
//!   reader, which acknowledges peer sync requests from a spawned task so a
//!   stalled caller write never blocks reading.
//! - Sync waiters live in a FIFO `PendingQueue`. Responses resolve the oldest
//!   waiter; transport loss fails all of them with
//!   [`ClientError::LostConnection`].
//! - Update pushes and lifecycle notifications go out on a broadcast channel
//!   as [`ConnectionEvent`]s; the current [`ConnectionState`] is on a watch
//!   channel.

pub mod correlator;
pub mod handshake;
pub mod transport;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use jipc_core::{encode_message, DecodeOptions, Framer, MessageKind, Value, ACK_MESSAGE};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::error::ClientError;
use correlator::{classify, Inbound, PendingQueue};
use transport::{AsyncStream, BoxedStream};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Lifecycle of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    /// The transport closed cleanly (peer EOF, idle timeout or [`Connection::close`]).
    Closed,
    /// Dial, handshake or transport I/O failed.
    Errored,
}

/// Notifications published to [`Connection::subscribe`] receivers.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// An async push whose body is a list starting with `"upd"`.
    Update(Value),
    /// No bytes arrived within the configured socket timeout. The connection
    /// is torn down right after.
    Timeout,
    /// The peer closed its side of the stream.
    End,
    /// The transport failed; the connection is torn down right after.
    Error(String),
    /// Teardown finished. Every pending request has been failed.
    Closed,
}

/// State shared between the connection handle and its reader task for one
/// transport session.
struct Session {
    id: Uuid,
    writer: tokio::sync::Mutex<Option<WriteHalf<BoxedStream>>>,
    pending: Mutex<PendingQueue>,
}

impl Session {
    fn pending(&self) -> MutexGuard<'_, PendingQueue> {
        // The queue stays consistent even if a holder panicked.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes `bytes` in full, or fails with `LostConnection` once the
    /// writer has been taken by teardown.
    async fn write(&self, bytes: &[u8]) -> Result<(), ClientError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ClientError::LostConnection)?;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Half-closes the write side. Later writes fail with `LostConnection`.
    async fn shutdown_writer(&self) -> std::io::Result<()> {
        match self.writer.lock().await.take() {
            Some(mut writer) => writer.shutdown().await,
            None => Ok(()),
        }
    }
}

/// Why the reader loop stopped.
enum ReadOutcome {
    End,
    TimedOut,
    Failed(String),
}

/// Everything the reader task needs besides the session.
struct ReaderContext {
    events: broadcast::Sender<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
    options: DecodeOptions,
    idle_timeout: Option<Duration>,
    max_message_size: u64,
}

/// Client connection to one engine endpoint.
///
/// `sync` takes `&mut self`, so a connection has at most one sync request in
/// flight. Independent connections can be driven in parallel.
pub struct Connection {
    id: Uuid,
    config: ConnectionConfig,
    version: u8,
    session: Option<Arc<Session>>,
    reader: Option<JoinHandle<()>>,
    events: broadcast::Sender<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
}

impl Connection {
    fn new(config: ConnectionConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Self {
            id: Uuid::new_v4(),
            config,
            version: 0,
            session: None,
            reader: None,
            events,
            state,
        })
    }

    /// Dials the configured endpoint and authenticates.
    ///
    /// # Errors
    ///
    /// [`ClientError::Config`] for invalid settings, any transport error from
    /// the dial, and the handshake errors described on
    /// [`handshake::authenticate`].
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        let mut conn = Self::new(config)?;
        conn.establish().await?;
        Ok(conn)
    }

    /// Authenticates over an already-open stream instead of dialing.
    ///
    /// [`Connection::reconnect`] on the result dials the configured endpoint.
    ///
    /// # Errors
    ///
    /// As [`Connection::connect`], minus dial errors.
    pub async fn from_stream<S>(stream: S, config: ConnectionConfig) -> Result<Self, ClientError>
    where
        S: AsyncStream + 'static,
    {
        let mut conn = Self::new(config)?;
        conn.start(Box::new(stream)).await?;
        Ok(conn)
    }

    async fn establish(&mut self) -> Result<(), ClientError> {
        self.state.send_replace(ConnectionState::Connecting);
        match transport::open(&self.config).await {
            Ok(stream) => self.start(stream).await,
            Err(e) => {
                warn!(connection_id = %self.id, host = %self.config.host, port = self.config.port, "connect failed: {e}");
                self.state.send_replace(ConnectionState::Errored);
                Err(e)
            }
        }
    }

    async fn start(&mut self, mut stream: BoxedStream) -> Result<(), ClientError> {
        self.state.send_replace(ConnectionState::Authenticating);
        let user = self.config.resolved_user();
        let version =
            match handshake::authenticate(&mut stream, &user, &self.config.password).await {
                Ok(version) => version,
                Err(e) => {
                    warn!(connection_id = %self.id, user = %user, "handshake failed: {e}");
                    self.state.send_replace(ConnectionState::Errored);
                    return Err(e);
                }
            };

        let (read_half, write_half) = tokio::io::split(stream);
        let session = Arc::new(Session {
            id: self.id,
            writer: tokio::sync::Mutex::new(Some(write_half)),
            pending: Mutex::new(PendingQueue::new()),
        });
        let ctx = ReaderContext {
            events: self.events.clone(),
            state: self.state.clone(),
            options: self.config.decode_options(),
            idle_timeout: self.config.socket_timeout(),
            max_message_size: self.config.max_message_size,
        };

        self.version = version;
        self.state.send_replace(ConnectionState::Ready);
        self.reader = Some(tokio::spawn(read_loop(Arc::clone(&session), read_half, ctx)));
        self.session = Some(session);

        info!(connection_id = %self.id, host = %self.config.host, port = self.config.port, version, "connection ready");
        Ok(())
    }

    fn session(&self) -> Result<&Arc<Session>, ClientError> {
        self.session.as_ref().ok_or(ClientError::LostConnection)
    }

    /// Sends `value` as a sync request and waits for its response.
    ///
    /// An empty request (null, empty list, empty string) is not sent; the call
    /// waits for the next response already in flight.
    ///
    /// An application error raised by the engine is returned as
    /// `Ok(Value::Error(..))`.
    ///
    /// # Errors
    ///
    /// - [`ClientError::LostConnection`] if the connection closes before the
    ///   response arrives, or was already closed.
    /// - [`ClientError::Protocol`] if `value` cannot be encoded or the
    ///   response cannot be decoded. The connection stays usable.
    /// - [`ClientError::Transport`] if the write fails.
    pub async fn sync(&mut self, value: &Value) -> Result<Value, ClientError> {
        let session = Arc::clone(self.session()?);
        let request = if value.is_empty_request() {
            None
        } else {
            Some(encode_message(MessageKind::Sync, value)?)
        };

        let rx = session.pending().push()?;
        match request {
            Some(bytes) => {
                if let Err(e) = session.write(&bytes).await {
                    // Our waiter is the newest; teardown may already have failed it.
                    session.pending().rollback(ClientError::LostConnection);
                    return Err(e);
                }
                debug!(connection_id = %self.id, bytes = bytes.len(), "sync request sent");
            }
            None => {
                debug!(connection_id = %self.id, "empty sync, waiting for the in-flight response");
            }
        }

        rx.await.map_err(|_| ClientError::LostConnection)?
    }

    /// Sends `value` as an async message. Completes once the bytes are
    /// flushed to the socket; no response is expected.
    ///
    /// # Errors
    ///
    /// [`ClientError::LostConnection`] if the connection is closed, otherwise
    /// encode and transport errors.
    pub async fn asyn(&self, value: &Value) -> Result<(), ClientError> {
        let session = self.session()?;
        let bytes = encode_message(MessageKind::Async, value)?;
        session.write(&bytes).await?;
        debug!(connection_id = %self.id, bytes = bytes.len(), "async message sent");
        Ok(())
    }

    /// Half-closes the transport and waits until the peer closes its side
    /// and teardown has finished.
    ///
    /// # Errors
    ///
    /// [`ClientError::Transport`] if the shutdown write fails.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        let Some(session) = self.session.clone() else {
            return Ok(());
        };
        session.shutdown_writer().await?;
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
        info!(connection_id = %self.id, "connection closed by caller");
        Ok(())
    }

    /// Drops the current transport, if any, and runs connect and handshake
    /// again with the same settings.
    ///
    /// Requests still queued on the old transport are discarded.
    ///
    /// # Errors
    ///
    /// As [`Connection::connect`].
    pub async fn reconnect(&mut self) -> Result<(), ClientError> {
        if let Some(reader) = self.reader.take() {
            if !reader.is_finished() {
                reader.abort();
                let _ = reader.await;
                let _ = self.events.send(ConnectionEvent::Closed);
            }
        }
        if let Some(session) = self.session.take() {
            let _ = session.shutdown_writer().await;
            let discarded = session.pending().discard();
            debug!(connection_id = %self.id, discarded, "previous session dropped");
        }
        self.establish().await
    }

    /// Subscribes to update pushes and lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Protocol version the server accepted in the last handshake.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Id used in this connection's log fields.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Number of sync waiters not yet resolved.
    pub fn pending_requests(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.pending().len())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

// ── Reader task ───────────────────────────────────────────────────────────────

async fn read_loop(session: Arc<Session>, mut reader: ReadHalf<BoxedStream>, ctx: ReaderContext) {
    let mut framer = Framer::with_max_message_size(ctx.max_message_size);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let outcome = loop {
        let read = match ctx.idle_timeout {
            Some(limit) => match timeout(limit, reader.read(&mut buf)).await {
                Ok(read) => read,
                Err(_) => break ReadOutcome::TimedOut,
            },
            None => reader.read(&mut buf).await,
        };
        let n = match read {
            Ok(0) => break ReadOutcome::End,
            Ok(n) => n,
            Err(e) => break ReadOutcome::Failed(e.to_string()),
        };

        let messages = match framer.push(&buf[..n]) {
            Ok(messages) => messages,
            Err(e) => break ReadOutcome::Failed(e.to_string()),
        };
        for message in messages {
            dispatch(&session, &ctx, &message);
        }
    };

    teardown(&session, &ctx, outcome).await;
}

fn dispatch(session: &Arc<Session>, ctx: &ReaderContext, message: &[u8]) {
    match classify(message, ctx.options) {
        Ok(Inbound::Response(result)) => {
            let resolved = session.pending().resolve(result.map_err(ClientError::from));
            if !resolved {
                warn!(connection_id = %session.id, "response with no pending request dropped");
            }
        }
        Ok(Inbound::Update(value)) => {
            let _ = ctx.events.send(ConnectionEvent::Update(value));
        }
        Ok(Inbound::PeerSync) => acknowledge(session),
        Ok(Inbound::Ignored) => {}
        Err(e) => {
            warn!(connection_id = %session.id, bytes = message.len(), "dropping message with invalid header: {e}");
        }
    }
}

/// Writes the peer-sync acknowledgment from its own task, so the reader keeps
/// draining the socket while a caller's write holds the writer.
fn acknowledge(session: &Arc<Session>) {
    debug!(connection_id = %session.id, "acknowledging peer sync request");
    let session = Arc::clone(session);
    tokio::spawn(async move {
        if let Err(e) = session.write(&ACK_MESSAGE).await {
            warn!(connection_id = %session.id, "failed to acknowledge peer sync: {e}");
        }
    });
}

async fn teardown(session: &Session, ctx: &ReaderContext, outcome: ReadOutcome) {
    let _ = session.shutdown_writer().await;
    let failed = session.pending().fail_all();

    let final_state = match outcome {
        ReadOutcome::End => {
            let _ = ctx.events.send(ConnectionEvent::End);
            ConnectionState::Closed
        }
        ReadOutcome::TimedOut => {
            let _ = ctx.events.send(ConnectionEvent::Timeout);
            ConnectionState::Closed
        }
        ReadOutcome::Failed(reason) => {
            error!(connection_id = %session.id, "transport failed: {reason}");
            let _ = ctx.events.send(ConnectionEvent::Error(reason));
            ConnectionState::Errored
        }
    };

    ctx.state.send_replace(final_state);
    let _ = ctx.events.send(ConnectionEvent::Closed);
    info!(connection_id = %session.id, failed, state = ?final_state, "connection torn down");
}
