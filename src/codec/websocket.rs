//! WebSocket framing (RFC 6455) behind an HTTP upgrade handshake.
//!
//! Until the handshake completes every byte is handled by an embedded
//! [`HttpCodec`]. Afterwards the buffer carries binary frames:
//!
//! ```text
//!  0               1               2               3
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |                   Masking-key, if MASK set                    |
//! +---------------------------------------------------------------+
//! |                          Payload Data                         |
//! +---------------------------------------------------------------+
//! ```
//!
//! The server role writes unmasked frames. The client role masks what it
//! writes, as peers expect from clients.

use std::borrow::Cow;

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use md5::Md5;
use sha1::{Digest, Sha1};

use super::{
    CodecError,
    FramingError,
    HttpCodec,
    HttpMessage,
    HttpResponse,
    Outbound,
    ProtocolCodec,
    ProtocolError,
    ProtocolKind,
    StatusCode,
    Step,
};

/// GUID appended to `Sec-WebSocket-Key` before hashing.
pub const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Continuation frame.
pub const OPCODE_CONTINUATION: u8 = 0x0;
/// Text frame.
pub const OPCODE_TEXT: u8 = 0x1;
/// Binary frame.
pub const OPCODE_BINARY: u8 = 0x2;
/// Connection close.
pub const OPCODE_CLOSE: u8 = 0x8;
/// Ping.
pub const OPCODE_PING: u8 = 0x9;
/// Pong.
pub const OPCODE_PONG: u8 = 0xA;

/// Largest payload that fits the 7-bit length field.
pub const MAX_SHORT_PAYLOAD: usize = 125;
/// Largest payload that fits the 16-bit extended length.
pub const MAX_MEDIUM_PAYLOAD: usize = 65_535;

const LENGTH_CLASS_16: u8 = 126;
const LENGTH_CLASS_64: u8 = 127;
const FIN_BIT: u8 = 0b1000_0000;
const MASK_BIT: u8 = 0b1000_0000;
const MASKING_KEY_LEN: usize = 4;

/// Masking key used by the client role.
pub const CLIENT_MASKING_KEY: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

/// Seed hashed into the client's `Sec-WebSocket-Key`.
const CLIENT_KEY_SEED: &[u8] = b"client";

/// Which end of the connection this codec serves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Role {
    /// Accepts the upgrade and writes unmasked frames.
    #[default]
    Server,
    /// Requests the upgrade and writes masked frames.
    Client,
}

/// Whether the upgrade exchange has completed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HandshakeState {
    /// Bytes are still HTTP.
    #[default]
    NotShaken,
    /// Bytes are WebSocket frames.
    Shaken,
}

/// One decoded data frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebSocketFrame {
    /// Final fragment flag.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: u8,
    /// Unmasked payload.
    pub payload: Bytes,
}

impl WebSocketFrame {
    /// Payload as UTF-8 text, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> { String::from_utf8_lossy(&self.payload) }
}

/// Message produced by the WebSocket codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebSocketMessage {
    /// The HTTP upgrade request (server role) or response (client role).
    Handshake(HttpMessage),
    /// A data frame received after the handshake.
    Frame(WebSocketFrame),
}

/// XOR `data` with `key`, cycling over its four bytes.
///
/// Masking is its own inverse.
///
/// ```
/// use wiregate::codec::websocket::apply_mask;
///
/// let key = [1, 2, 3, 4];
/// let mut data = *b"hello";
/// apply_mask(&mut data, key);
/// apply_mask(&mut data, key);
/// assert_eq!(&data, b"hello");
/// ```
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % MASKING_KEY_LEN];
    }
}

/// `Sec-WebSocket-Accept` value for `key`.
///
/// ```
/// use wiregate::codec::websocket::accept_key;
///
/// assert_eq!(
///     accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
#[must_use]
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(ACCEPT_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Deterministic client `Sec-WebSocket-Key`.
#[must_use]
pub fn client_key() -> String { STANDARD.encode(Md5::digest(CLIENT_KEY_SEED)) }

fn handshake_failure(reason: &str) -> ProtocolError {
    ProtocolError::HandshakeFailure(reason.to_owned())
}

fn check_upgrade_headers(msg: &HttpMessage) -> Result<(), ProtocolError> {
    let connection = msg
        .header("connection")
        .ok_or_else(|| handshake_failure("http header missing connection"))?;
    let upgrade = msg
        .header("upgrade")
        .ok_or_else(|| handshake_failure("http header missing upgrade"))?;
    let wants_upgrade = connection.to_ascii_lowercase().contains("upgrade");
    let wants_websocket = upgrade.to_ascii_lowercase().contains("websocket");
    if !wants_upgrade || !wants_websocket {
        return Err(handshake_failure(
            "connection is not \"Upgrade\" or upgrade is not \"websocket\"",
        ));
    }
    Ok(())
}

/// Codec for WebSocket connections.
#[derive(Clone, Debug, Default)]
pub struct WebSocketCodec {
    role: Role,
    state: HandshakeState,
    http: HttpCodec,
    sec_websocket_key: Option<String>,
    fin: bool,
    opcode: u8,
    header_length: usize,
    masking_key: Option<[u8; 4]>,
}

impl WebSocketCodec {
    /// Server-side codec awaiting an upgrade request.
    #[must_use]
    pub fn server() -> Self { Self::default() }

    /// Client-side codec; its connect-time output is the upgrade request.
    #[must_use]
    pub fn client() -> Self {
        Self {
            role: Role::Client,
            ..Self::default()
        }
    }

    /// Role of this codec.
    #[must_use]
    pub fn role(&self) -> Role { self.role }

    /// Current handshake state.
    #[must_use]
    pub fn handshake_state(&self) -> HandshakeState { self.state }

    /// Mark the handshake complete.
    pub fn set_shaken(&mut self) { self.state = HandshakeState::Shaken; }

    /// Masking key cached by the last successful
    /// [`first_msg_length`](ProtocolCodec::first_msg_length).
    #[must_use]
    pub fn masking_key(&self) -> Option<[u8; 4]> { self.masking_key }

    /// Build the client upgrade request and remember its key.
    pub fn handshake_request(&mut self) -> String {
        let key = client_key();
        let request = format!(
            "GET /chat HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
             Sec-WebSocket-Key: {key}\r\nSec-WebSocket-Version: 13\r\n\r\n"
        );
        self.sec_websocket_key = Some(key);
        request
    }

    /// Validate a client upgrade request and build the `101` response.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::HandshakeFailure`] when a required header is
    /// missing or does not ask for a WebSocket upgrade.
    pub fn check_handshake_request(&self, msg: &HttpMessage) -> Result<String, ProtocolError> {
        check_upgrade_headers(msg)?;
        let key = msg
            .header("sec-websocket-key")
            .ok_or_else(|| handshake_failure("http header missing sec-websocket-key"))?;
        let accept = accept_key(key);
        Ok(format!(
            "HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\
             Sec-WebSocket-Accept: {accept}\r\nSec-WebSocket-Version: 13\r\nServer: \
             wiregate\r\n\r\n"
        ))
    }

    /// Validate the server's `101` response against the key we sent.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::HandshakeFailure`] when headers are missing or
    /// `Sec-WebSocket-Accept` does not match.
    pub fn check_handshake_response(&self, msg: &HttpMessage) -> Result<(), ProtocolError> {
        check_upgrade_headers(msg)?;
        let accept = msg
            .header("sec-websocket-accept")
            .ok_or_else(|| handshake_failure("http header missing sec-websocket-accept"))?;
        let key = self
            .sec_websocket_key
            .as_deref()
            .ok_or_else(|| handshake_failure("no upgrade request was sent"))?;
        if accept_key(key) != accept {
            return Err(handshake_failure("sec-websocket-accept is wrong"));
        }
        Ok(())
    }

    fn measure_frame(&mut self, buf: &[u8]) -> Result<usize, CodecError> {
        if buf.is_empty() {
            return Err(FramingError::Empty.into());
        }
        if buf.len() < 2 {
            return Err(FramingError::Incomplete {
                have: buf.len(),
                need: 2,
            }
            .into());
        }

        self.fin = buf[0] & FIN_BIT == FIN_BIT;
        self.opcode = buf[0] & 0x0F;
        if self.opcode == OPCODE_CLOSE {
            return Err(ProtocolError::CloseRequested.into());
        }

        let masked = buf[1] & MASK_BIT == MASK_BIT;
        let length_class = buf[1] & 0x7F;
        let mut header_length = 2;
        header_length += match length_class {
            LENGTH_CLASS_16 => 2,
            LENGTH_CLASS_64 => 8,
            _ => 0,
        };
        if masked {
            header_length += MASKING_KEY_LEN;
        }
        if header_length > buf.len() {
            return Err(FramingError::Incomplete {
                have: buf.len(),
                need: header_length,
            }
            .into());
        }

        let mut extended = &buf[2..];
        let payload_length = match length_class {
            LENGTH_CLASS_16 => u64::from(extended.get_u16()),
            LENGTH_CLASS_64 => extended.get_u64(),
            short => u64::from(short),
        };
        let malformed = || FramingError::MalformedLength(payload_length.to_string());
        let total = usize::try_from(payload_length)
            .ok()
            .and_then(|len| header_length.checked_add(len))
            .ok_or_else(malformed)?;
        if total > buf.len() {
            return Err(FramingError::Incomplete {
                have: buf.len(),
                need: total,
            }
            .into());
        }

        self.header_length = header_length;
        self.masking_key = masked.then(|| {
            let start = header_length - MASKING_KEY_LEN;
            [buf[start], buf[start + 1], buf[start + 2], buf[start + 3]]
        });
        Ok(total)
    }

    fn encode_frame(&self, payload: &[u8], dst: &mut BytesMut) -> Result<(), CodecError> {
        let len = payload.len();
        let mask_bit = match self.role {
            Role::Server => 0,
            Role::Client => MASK_BIT,
        };
        dst.reserve(14 + len);
        dst.put_u8(FIN_BIT | OPCODE_TEXT);
        if let Ok(short) = u8::try_from(len)
            && len <= MAX_SHORT_PAYLOAD
        {
            dst.put_u8(mask_bit | short);
        } else if let Ok(medium) = u16::try_from(len) {
            dst.put_u8(mask_bit | LENGTH_CLASS_16);
            dst.put_u16(medium);
        } else {
            let long = u64::try_from(len).map_err(|_| FramingError::OversizedFrame {
                size: len,
                max: usize::MAX,
            })?;
            dst.put_u8(mask_bit | LENGTH_CLASS_64);
            dst.put_u64(long);
        }

        match self.role {
            Role::Server => dst.extend_from_slice(payload),
            Role::Client => {
                dst.extend_from_slice(&CLIENT_MASKING_KEY);
                let start = dst.len();
                dst.extend_from_slice(payload);
                apply_mask(&mut dst[start..], CLIENT_MASKING_KEY);
            }
        }
        Ok(())
    }
}

impl ProtocolCodec for WebSocketCodec {
    type Message = WebSocketMessage;

    const KIND: ProtocolKind = ProtocolKind::WebSocket;

    fn first_msg_length(&mut self, buf: &[u8]) -> Result<usize, CodecError> {
        match self.state {
            HandshakeState::NotShaken => self.http.first_msg_length(buf),
            HandshakeState::Shaken => self.measure_frame(buf),
        }
    }

    fn decode(&mut self, frame: &[u8]) -> Result<Self::Message, CodecError> {
        if self.state == HandshakeState::NotShaken {
            return self.http.decode(frame).map(WebSocketMessage::Handshake);
        }

        let mut payload = frame
            .get(self.header_length..)
            .ok_or(FramingError::Incomplete {
                have: frame.len(),
                need: self.header_length,
            })?
            .to_vec();
        if let Some(key) = self.masking_key {
            apply_mask(&mut payload, key);
        }
        Ok(WebSocketMessage::Frame(WebSocketFrame {
            fin: self.fin,
            opcode: self.opcode,
            payload: Bytes::from(payload),
        }))
    }

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<(), CodecError> {
        self.encode_frame(payload, dst)
    }

    fn text_reply(body: &str) -> Outbound { Outbound::payload(body.to_owned()) }

    fn on_connect(&mut self) -> Option<Outbound> {
        match self.role {
            Role::Server => None,
            Role::Client => Some(Outbound::raw(self.handshake_request())),
        }
    }

    fn on_message(&mut self, message: Self::Message) -> Step<Self::Message> {
        let WebSocketMessage::Handshake(request) = &message else {
            return Step::Deliver(message);
        };
        match self.role {
            Role::Server => match self.check_handshake_request(request) {
                Ok(response) => {
                    self.set_shaken();
                    Step::Reply(Outbound::raw(response))
                }
                Err(err) => {
                    let reply = HttpResponse::new(StatusCode::BadRequest)
                        .into_outbound(&format!("handshake err: {err}"));
                    Step::Reject(Some(reply), err.into())
                }
            },
            Role::Client => match self.check_handshake_response(request) {
                Ok(()) => {
                    self.set_shaken();
                    Step::Deliver(message)
                }
                Err(err) => Step::Reject(None, err.into()),
            },
        }
    }
}
