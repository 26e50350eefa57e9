//! Error types for the codec layer.
//!
//! Framing errors describe where the next frame boundary stands inside the
//! receive buffer. Some of them are not failures at all: [`FramingError::Empty`],
//! [`FramingError::NotRecognized`] and [`FramingError::Incomplete`] only tell the
//! reassembler to wait for more bytes. Everything else ends the connection.
//!
//! # Error Categories
//!
//! - [`FramingError`]: boundary detection (empty buffer, missing marker, short buffer, unparsable
//!   or oversized lengths).
//! - [`ProtocolError`]: violations found while interpreting a complete frame or during the
//!   WebSocket handshake.
//! - [`EofError`]: end-of-stream with or without a partial frame buffered.
//! - [`CodecError`]: top-level enum wrapping all categories plus I/O errors.

use std::io;

use thiserror::Error;

/// Framing-level outcomes reported while locating a frame boundary.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The receive buffer holds no bytes.
    #[error("receive buffer is empty")]
    Empty,

    /// The framing marker (for HTTP, the `\r\n\r\n` header terminator) has not
    /// arrived yet.
    #[error("frame marker not found yet")]
    NotRecognized,

    /// The frame is declared but not fully buffered.
    #[error("incomplete frame: have {have}, need {need}")]
    Incomplete {
        /// Bytes currently available.
        have: usize,
        /// Bytes required for the complete frame (header plus body), if known.
        need: usize,
    },

    /// A length field could not be parsed.
    #[error("malformed length field: {0}")]
    MalformedLength(String),

    /// The declared frame would not fit in the receive buffer.
    #[error("frame exceeds receive buffer: {size} > {max}")]
    OversizedFrame {
        /// Declared frame size.
        size: usize,
        /// Receive buffer capacity.
        max: usize,
    },

    /// An outbound payload was empty where the wire format forbids it.
    #[error("empty frame not permitted")]
    EmptyFrame,
}

/// Protocol-level errors found in a complete frame.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The HTTP request or status line did not have three parts.
    #[error("malformed start line: {0:?}")]
    MalformedStartLine(String),

    /// The WebSocket upgrade exchange was rejected.
    #[error("handshake failed: {0}")]
    HandshakeFailure(String),

    /// The peer sent a WebSocket close frame.
    #[error("peer requested close")]
    CloseRequested,
}

/// End-of-stream variants.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// The peer closed with nothing left in the buffer.
    #[error("connection closed cleanly at frame boundary")]
    CleanClose,

    /// The peer closed while a frame was partially buffered.
    #[error("premature EOF with {bytes_buffered} bytes buffered")]
    MidFrame {
        /// Bytes left in the receive buffer.
        bytes_buffered: usize,
    },
}

/// Top-level codec error taxonomy.
///
/// # Examples
///
/// ```
/// use wiregate::codec::{CodecError, FramingError};
///
/// let err = CodecError::Framing(FramingError::Incomplete { have: 2, need: 4 });
/// assert!(err.is_retryable());
/// assert!(!err.should_disconnect());
///
/// let err = CodecError::Framing(FramingError::MalformedLength("abc".into()));
/// assert!(err.should_disconnect());
/// ```
#[derive(Debug, Error)]
pub enum CodecError {
    /// Framing layer outcome.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Protocol layer error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport layer I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// End-of-stream handling.
    #[error("EOF: {0}")]
    Eof(#[from] EofError),
}

impl CodecError {
    /// Returns true when the caller should simply wait for more bytes.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Framing(
                FramingError::Empty | FramingError::NotRecognized | FramingError::Incomplete { .. }
            )
        )
    }

    /// Returns true if the connection must be terminated.
    #[must_use]
    pub fn should_disconnect(&self) -> bool { !self.is_retryable() }

    /// Returns true for closes the peer asked for, which are not failures.
    ///
    /// ```
    /// use wiregate::codec::{CodecError, EofError, ProtocolError};
    ///
    /// assert!(CodecError::Eof(EofError::CleanClose).is_graceful_close());
    /// assert!(CodecError::Protocol(ProtocolError::CloseRequested).is_graceful_close());
    /// ```
    #[must_use]
    pub fn is_graceful_close(&self) -> bool {
        matches!(
            self,
            Self::Eof(EofError::CleanClose) | Self::Protocol(ProtocolError::CloseRequested)
        )
    }

    /// Returns the error category as a string for logging and metrics.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Framing(_) => "framing",
            Self::Protocol(_) => "protocol",
            Self::Io(_) => "io",
            Self::Eof(_) => "eof",
        }
    }
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => e,
            CodecError::Framing(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            CodecError::Protocol(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            CodecError::Eof(e) => io::Error::new(io::ErrorKind::UnexpectedEof, e),
        }
    }
}
