//! HTTP/1.1 subset.
//!
//! A message is a start line, a header block terminated by `\r\n\r\n`, and a
//! body whose length is the `Content-Length` header (zero when absent). There
//! is no chunked encoding and no multi-value header support; a repeated header
//! keeps its last value.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use super::{CodecError, FramingError, Outbound, ProtocolCodec, ProtocolError, ProtocolKind};

mod request;
mod response;

pub use request::HttpRequest;
pub use response::{HttpResponse, StatusCode};

/// Separator between the header block and the body.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Media type whose body is parsed into [`HttpMessage::form`].
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// First line of an HTTP message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartLine {
    /// `METHOD TARGET VERSION`
    Request {
        /// Request method, for example `GET`.
        method: String,
        /// Raw request target including any query string.
        target: String,
        /// Target with the query string removed.
        path: String,
        /// Protocol version, for example `HTTP/1.1`.
        version: String,
    },
    /// `VERSION CODE REASON`
    Status {
        /// Protocol version.
        version: String,
        /// Numeric status code.
        code: u16,
        /// Reason phrase (may contain spaces).
        reason: String,
    },
}

/// A decoded HTTP request or response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpMessage {
    /// Request or status line.
    pub start_line: StartLine,
    /// Headers keyed by lower-cased name.
    pub headers: HashMap<String, String>,
    /// Query parameters keyed by lower-cased name.
    pub query: HashMap<String, String>,
    /// Form fields, parsed only for `application/x-www-form-urlencoded` bodies.
    pub form: HashMap<String, String>,
    /// Raw body bytes.
    pub body: Bytes,
}

impl HttpMessage {
    /// Request method, or `None` for responses.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match &self.start_line {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Status { .. } => None,
        }
    }

    /// Request path without its query string, or `None` for responses.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match &self.start_line {
            StartLine::Request { path, .. } => Some(path),
            StartLine::Status { .. } => None,
        }
    }

    /// Status code, or `None` for requests.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match &self.start_line {
            StartLine::Status { code, .. } => Some(*code),
            StartLine::Request { .. } => None,
        }
    }

    /// Header value looked up case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Body interpreted as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn body_text(&self) -> String { String::from_utf8_lossy(&self.body).into_owned() }
}

/// Codec for the HTTP subset.
#[derive(Clone, Debug, Default)]
pub struct HttpCodec {
    header_length: usize,
    content_length: usize,
}

impl HttpCodec {
    /// Create a codec with no message measured yet.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Header block length (terminator included) of the last measured message.
    #[must_use]
    pub fn header_length(&self) -> usize { self.header_length }

    /// Body length of the last measured message.
    #[must_use]
    pub fn content_length(&self) -> usize { self.content_length }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}

/// Split a header line at its first colon, trimming both sides.
fn split_header(line: &str) -> Option<(&str, &str)> {
    line.split_once(':')
        .map(|(key, value)| (key.trim(), value.trim()))
}

fn parse_content_length(header: &str) -> Result<usize, FramingError> {
    for line in header.split("\r\n").skip(1) {
        let Some((key, value)) = split_header(line) else {
            continue;
        };
        if key.eq_ignore_ascii_case("content-length") {
            return value
                .parse()
                .map_err(|_| FramingError::MalformedLength(value.to_owned()));
        }
    }
    Ok(0)
}

/// Split `a=b&c=d` into a map with lower-cased keys.
///
/// Pairs that do not split into exactly one key and one value are skipped.
fn parse_pairs(input: &str) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    for pair in input.split('&') {
        let mut kv = pair.split('=');
        if let (Some(key), Some(value), None) = (kv.next(), kv.next(), kv.next()) {
            pairs.insert(key.to_ascii_lowercase(), value.to_owned());
        }
    }
    pairs
}

fn parse_start_line(line: &str) -> Result<StartLine, ProtocolError> {
    let malformed = || ProtocolError::MalformedStartLine(line.to_owned());
    let mut parts = line.splitn(3, ' ');
    let (Some(first), Some(second), Some(third)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };
    if first.is_empty() || second.is_empty() || third.is_empty() {
        return Err(malformed());
    }

    if first.starts_with("HTTP/") {
        let code = second.parse().map_err(|_| malformed())?;
        return Ok(StartLine::Status {
            version: first.to_owned(),
            code,
            reason: third.to_owned(),
        });
    }

    let path = match second.find('?') {
        Some(index) if index > 0 => &second[..index],
        _ => second,
    };
    Ok(StartLine::Request {
        method: first.to_owned(),
        target: second.to_owned(),
        path: path.to_owned(),
        version: third.to_owned(),
    })
}

fn parse_query(target: &str) -> HashMap<String, String> {
    match target.find('?') {
        Some(index) if index > 0 && index + 1 < target.len() => parse_pairs(&target[index + 1..]),
        _ => HashMap::new(),
    }
}

fn is_form_encoded(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(FORM_URLENCODED))
}

impl ProtocolCodec for HttpCodec {
    type Message = HttpMessage;

    const KIND: ProtocolKind = ProtocolKind::Http;

    fn first_msg_length(&mut self, buf: &[u8]) -> Result<usize, CodecError> {
        if buf.is_empty() {
            return Err(FramingError::Empty.into());
        }
        let Some(index) = find_terminator(buf) else {
            return Err(FramingError::NotRecognized.into());
        };
        self.header_length = index + HEADER_TERMINATOR.len();

        let header = String::from_utf8_lossy(&buf[..self.header_length]);
        self.content_length = parse_content_length(&header)?;

        let total = self
            .header_length
            .checked_add(self.content_length)
            .ok_or_else(|| FramingError::MalformedLength(self.content_length.to_string()))?;
        if total > buf.len() {
            return Err(FramingError::Incomplete {
                have: buf.len(),
                need: total,
            }
            .into());
        }
        Ok(total)
    }

    fn decode(&mut self, frame: &[u8]) -> Result<Self::Message, CodecError> {
        let header_length = find_terminator(frame)
            .map(|index| index + HEADER_TERMINATOR.len())
            .ok_or(FramingError::NotRecognized)?;
        let header = String::from_utf8_lossy(&frame[..header_length - HEADER_TERMINATOR.len()]);
        let mut lines = header.split("\r\n");
        let start_line = parse_start_line(lines.next().unwrap_or_default())?;

        let headers: HashMap<String, String> = lines
            .filter_map(split_header)
            .map(|(key, value)| (key.to_ascii_lowercase(), value.to_owned()))
            .collect();

        let query = match &start_line {
            StartLine::Request { target, .. } => parse_query(target),
            StartLine::Status { .. } => HashMap::new(),
        };

        let body = Bytes::copy_from_slice(&frame[header_length..]);
        let form = if headers
            .get("content-type")
            .is_some_and(|ct| is_form_encoded(ct))
        {
            parse_pairs(&String::from_utf8_lossy(&body))
        } else {
            HashMap::new()
        };

        Ok(HttpMessage {
            start_line,
            headers,
            query,
            form,
            body,
        })
    }

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<(), CodecError> {
        dst.extend_from_slice(payload);
        Ok(())
    }

    fn text_reply(body: &str) -> Outbound { HttpResponse::new(StatusCode::Ok).into_outbound(body) }

    fn closes_after_reply(&self) -> bool { true }
}
