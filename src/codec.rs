//! Pluggable wire protocols.
//!
//! A [`ProtocolCodec`] owns everything protocol-specific about a connection:
//! where the next message ends inside the receive buffer, how a complete
//! frame turns into a structured message, and how outgoing payloads are
//! wrapped for the wire. Three codecs ship with the crate:
//!
//! - [`StreamCodec`]: 4-byte big-endian body length followed by the body.
//! - [`HttpCodec`]: an HTTP/1.1 subset with `Content-Length` bodies.
//! - [`WebSocketCodec`]: RFC 6455 frames behind an HTTP upgrade handshake.
//!
//! Codecs are stateful and live for exactly one connection. The
//! [`FrameReassembler`](crate::reassembler::FrameReassembler) drives them over
//! the connection's receive buffer.
//!
//! # Error Handling
//!
//! [`ProtocolCodec::first_msg_length`] reports "not enough bytes yet" through
//! the retryable [`FramingError`] variants; see [`CodecError::is_retryable`].
//! Every other error is fatal to the connection.

use std::{fmt, str::FromStr};

use bytes::{Bytes, BytesMut};

pub mod error;
pub mod http;
pub mod stream;
pub mod websocket;

pub use error::{CodecError, EofError, FramingError, ProtocolError};
pub use http::{HttpCodec, HttpMessage, HttpRequest, HttpResponse, StartLine, StatusCode};
pub use stream::StreamCodec;
pub use websocket::{HandshakeState, Role, WebSocketCodec, WebSocketFrame, WebSocketMessage};

/// Bytes queued for writing on a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// An application payload the codec wraps for the wire.
    Payload(Bytes),
    /// Fully formed bytes written verbatim (an HTTP response, a handshake).
    Raw(Bytes),
}

impl Outbound {
    /// Build a codec-wrapped payload from anything convertible into [`Bytes`].
    pub fn payload(bytes: impl Into<Bytes>) -> Self { Self::Payload(bytes.into()) }

    /// Build verbatim bytes from anything convertible into [`Bytes`].
    pub fn raw(bytes: impl Into<Bytes>) -> Self { Self::Raw(bytes.into()) }

    /// Number of bytes carried before any codec framing.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Payload(b) | Self::Raw(b) => b.len(),
        }
    }

    /// Returns true if no bytes are carried.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Protocol-level decision taken on a decoded message before the application
/// handler sees it.
#[derive(Debug)]
pub enum Step<M> {
    /// Hand the message to the connection handler.
    Deliver(M),
    /// Write bytes on the protocol's behalf and keep the connection open.
    Reply(Outbound),
    /// Optionally write bytes, then close the connection with `error`.
    Reject(Option<Outbound>, CodecError),
}

/// Names of the supported wire protocols.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    /// Length-prefixed binary stream.
    Stream,
    /// HTTP/1.1 subset.
    Http,
    /// WebSocket (RFC 6455).
    WebSocket,
}

impl ProtocolKind {
    /// Lower-case protocol name used in service names and on the command line.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Http => "http",
            Self::WebSocket => "websocket",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Error returned when parsing an unknown protocol name.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unsupported protocol: {0}")]
pub struct UnsupportedProtocol(pub String);

impl FromStr for ProtocolKind {
    type Err = UnsupportedProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stream" => Ok(Self::Stream),
            "http" => Ok(Self::Http),
            "websocket" => Ok(Self::WebSocket),
            other => Err(UnsupportedProtocol(other.to_owned())),
        }
    }
}

/// Contract implemented once per wire protocol.
///
/// ```
/// use bytes::BytesMut;
/// use wiregate::codec::{ProtocolCodec, StreamCodec};
///
/// let mut codec = StreamCodec::new();
/// let mut wire = BytesMut::new();
/// codec.encode(b"hi", &mut wire).expect("encode");
/// let len = codec.first_msg_length(&wire).expect("complete frame");
/// assert_eq!(len, 6);
/// assert_eq!(codec.decode(&wire[..len]).expect("decode"), "hi");
/// ```
pub trait ProtocolCodec: Send + 'static {
    /// Structured message produced by [`decode`](Self::decode).
    type Message: fmt::Debug + Send + 'static;

    /// Which protocol this codec speaks.
    const KIND: ProtocolKind;

    /// Length of the first complete message in `buf`.
    ///
    /// # Errors
    ///
    /// Returns a retryable [`FramingError`] when more bytes are needed and a
    /// fatal [`CodecError`] when the buffer can never form a valid frame.
    fn first_msg_length(&mut self, buf: &[u8]) -> Result<usize, CodecError>;

    /// Decode one complete frame previously measured by
    /// [`first_msg_length`](Self::first_msg_length).
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the frame violates the protocol.
    fn decode(&mut self, frame: &[u8]) -> Result<Self::Message, CodecError>;

    /// Wrap `payload` for the wire and append it to `dst`.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the payload cannot be framed.
    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<(), CodecError>;

    /// Reply carrying `body` in this protocol's ordinary response form.
    fn text_reply(body: &str) -> Outbound;

    /// Bytes to send as soon as the connection is established.
    fn on_connect(&mut self) -> Option<Outbound> { None }

    /// Protocol-level processing of a decoded message.
    fn on_message(&mut self, message: Self::Message) -> Step<Self::Message> {
        Step::Deliver(message)
    }

    /// Whether one request/response exchange ends the connection.
    fn closes_after_reply(&self) -> bool { false }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("stream", ProtocolKind::Stream)]
    #[case("http", ProtocolKind::Http)]
    #[case("websocket", ProtocolKind::WebSocket)]
    fn protocol_names_round_trip(#[case] name: &str, #[case] kind: ProtocolKind) {
        assert_eq!(name.parse::<ProtocolKind>(), Ok(kind));
        assert_eq!(kind.to_string(), name);
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        assert_eq!(
            "tcp".parse::<ProtocolKind>(),
            Err(UnsupportedProtocol("tcp".into()))
        );
    }

    #[test]
    fn outbound_reports_length() {
        assert_eq!(Outbound::payload("abc").len(), 3);
        assert!(Outbound::raw(Bytes::new()).is_empty());
    }
}
