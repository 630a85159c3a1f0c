//! FIFO correlation of sync requests with their responses, and dispatch of
//! inbound messages by kind.
//!
//! The protocol has no request ids: the server answers sync requests strictly
//! in the order it received them, so the oldest waiter always owns the next
//! response.

use std::collections::VecDeque;

use jipc_core::{decode_body, DecodeOptions, MessageHeader, MessageKind, ProtocolError, Value, HEADER_SIZE};
use tokio::sync::oneshot;
use tracing::trace;

use crate::error::ClientError;

pub type SyncResult = Result<Value, ClientError>;

/// Outstanding sync waiters, oldest first.
///
/// Once [`PendingQueue::fail_all`] or [`PendingQueue::discard`] has run the
/// queue is closed and refuses new waiters.
#[derive(Debug, Default)]
pub struct PendingQueue {
    waiters: VecDeque<oneshot::Sender<SyncResult>>,
    closed: bool,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a waiter and returns the receiving end of its result.
    ///
    /// # Errors
    ///
    /// [`ClientError::LostConnection`] once the queue has been closed.
    pub fn push(&mut self) -> Result<oneshot::Receiver<SyncResult>, ClientError> {
        if self.closed {
            return Err(ClientError::LostConnection);
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.push_back(tx);
        Ok(rx)
    }

    /// Completes the oldest waiter with `result`.
    ///
    /// Returns `false` if no waiter was queued. A waiter whose caller has
    /// gone away is still consumed, keeping later responses aligned.
    pub fn resolve(&mut self, result: SyncResult) -> bool {
        match self.waiters.pop_front() {
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Removes the most recently pushed waiter and fails it with `err`.
    ///
    /// Used when the request that waiter was pushed for could not be written.
    pub fn rollback(&mut self, err: ClientError) {
        if let Some(tx) = self.waiters.pop_back() {
            let _ = tx.send(Err(err));
        }
    }

    /// Fails every waiter with [`ClientError::LostConnection`], oldest first,
    /// closes the queue and returns how many there were.
    pub fn fail_all(&mut self) -> usize {
        self.closed = true;
        let count = self.waiters.len();
        for tx in self.waiters.drain(..) {
            let _ = tx.send(Err(ClientError::LostConnection));
        }
        count
    }

    /// Drops every waiter without resolving it and closes the queue.
    pub fn discard(&mut self) -> usize {
        self.closed = true;
        let count = self.waiters.len();
        self.waiters.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// What the reader should do with one complete inbound message.
#[derive(Debug, PartialEq)]
pub enum Inbound {
    /// Resolve the oldest waiter with this result.
    Response(Result<Value, ProtocolError>),
    /// Publish this table update to subscribers.
    Update(Value),
    /// The peer sent a sync request; answer with the canned acknowledgment.
    PeerSync,
    /// Async message that is not an update, or one that failed to decode.
    Ignored,
}

/// Classifies a complete message (header included) as produced by the framer.
///
/// # Errors
///
/// Only header errors are returned; body decode errors of a response are
/// carried inside [`Inbound::Response`] so they reach the waiting caller.
pub fn classify(message: &[u8], options: DecodeOptions) -> Result<Inbound, ProtocolError> {
    let header = MessageHeader::decode(message)?;
    let body = &message[HEADER_SIZE..];

    Ok(match header.kind {
        MessageKind::Response => Inbound::Response(decode_body(&header, body, options)),
        MessageKind::Sync => Inbound::PeerSync,
        MessageKind::Async => match decode_body(&header, body, options) {
            Ok(value) if value.as_update().is_some() => Inbound::Update(value),
            Ok(value) => {
                trace!(value_type = value.type_name(), "dropping non-update async message");
                Inbound::Ignored
            }
            Err(e) => {
                trace!(error = %e, "dropping undecodable async message");
                Inbound::Ignored
            }
        },
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
