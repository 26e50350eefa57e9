//! Per-connection runtime shared by servers and clients.
//!
//! A [`Connection`] owns the socket, the [`FrameReassembler`] wrapping the
//! protocol codec, and the receiving end of a command queue. Any task holding
//! a [`ConnectionHandle`] can queue writes or a close; the connection task
//! applies them in order between inbound frames.

use std::{
    fmt,
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::codec::{CodecError, Outbound};

mod driver;
mod handler;

pub use driver::Connection;
pub use handler::{ConnectionHandler, DefaultHandler};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier assigned to a connection, unique within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next identifier.
    #[must_use]
    pub fn next() -> Self { Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(self) -> u64 { self.0 }
}

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ConnectionId({})", self.0) }
}

/// Errors ending or affecting a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The codec rejected the byte stream.
    #[error(transparent)]
    Codec(CodecError),

    /// Socket I/O failed.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    /// The connection is closed; nothing more can be queued.
    #[error("connection closed")]
    Closed,

    /// The socket accepted fewer bytes than were written.
    #[error("short write: socket accepted no more bytes")]
    WriteShortfall,
}

impl ConnectionError {
    /// Returns true for closes the peer asked for.
    #[must_use]
    pub fn is_graceful_close(&self) -> bool {
        matches!(self, Self::Codec(err) if err.is_graceful_close())
    }

    /// Category label for logs and metrics.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Codec(err) => err.error_type(),
            Self::Io(_) => "io",
            Self::Closed => "closed",
            Self::WriteShortfall => "write_shortfall",
        }
    }
}

impl From<CodecError> for ConnectionError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) if e.kind() == io::ErrorKind::WriteZero => Self::WriteShortfall,
            CodecError::Io(e) => Self::Io(e),
            other => Self::Codec(other),
        }
    }
}

#[derive(Debug)]
pub(crate) enum Command {
    Send(Outbound),
    Close,
}

/// Cloneable handle to a live connection.
///
/// Writes and closes are queued to the task owning the socket and applied in
/// the order they were issued, so `send` followed by `close` always delivers
/// the bytes first.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: Arc<str>,
    tx: mpsc::UnboundedSender<Command>,
    open: Arc<AtomicBool>,
}

impl ConnectionHandle {
    pub(crate) fn new(peer: &str, tx: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            id: ConnectionId::next(),
            peer: Arc::from(peer),
            tx,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Identifier of this connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.id }

    /// Remote address as reported when the connection was established.
    #[must_use]
    pub fn remote_addr(&self) -> &str { &self.peer }

    /// Whether the connection still accepts writes.
    #[must_use]
    pub fn is_open(&self) -> bool { self.open.load(Ordering::Acquire) && !self.tx.is_closed() }

    /// Queue `outbound` for writing.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] once the connection has closed.
    pub fn send(&self, outbound: Outbound) -> Result<(), ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::Closed);
        }
        self.tx
            .send(Command::Send(outbound))
            .map_err(|_| ConnectionError::Closed)
    }

    /// Queue a close behind any pending writes. Closing twice is harmless.
    pub fn close(&self) {
        if self.open.load(Ordering::Acquire) {
            let _ = self.tx.send(Command::Close);
        }
    }

    pub(crate) fn mark_closed(&self) { self.open.store(false, Ordering::Release); }
}
