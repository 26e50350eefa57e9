//! HTTP request construction for clients.

use std::fmt::Write as _;

use crate::codec::Outbound;

/// Builder for an HTTP/1.1 request.
///
/// ```
/// use wiregate::codec::HttpRequest;
///
/// let text = HttpRequest::get("/api/user_name?id=1").render();
/// assert_eq!(text, "GET /api/user_name?id=1 HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
/// ```
#[derive(Clone, Debug)]
pub struct HttpRequest {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl HttpRequest {
    /// Start a request with an arbitrary method.
    #[must_use]
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Start a `GET` request.
    #[must_use]
    pub fn get(target: impl Into<String>) -> Self { Self::new("GET", target) }

    /// Start a `POST` request.
    #[must_use]
    pub fn post(target: impl Into<String>) -> Self { Self::new("POST", target) }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Set the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialise the request; `Content-Length` is computed from the body.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("{} {} HTTP/1.1\r\n", self.method, self.target);
        for (key, value) in &self.headers {
            let _ = write!(out, "{key}: {value}\r\n");
        }
        let _ = write!(out, "Content-Length: {}\r\n\r\n{}", self.body.len(), self.body);
        out
    }

    /// Render into verbatim outbound bytes.
    #[must_use]
    pub fn into_outbound(self) -> Outbound { Outbound::raw(self.render()) }
}
