//! HTTP response construction.

use std::fmt::Write as _;

use crate::codec::Outbound;

/// Status codes the framework produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// 200
    Ok,
    /// 400
    BadRequest,
    /// 404
    NotFound,
    /// 500
    InternalServerError,
}

impl StatusCode {
    /// Numeric code.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::InternalServerError => 500,
        }
    }

    /// Standard reason phrase.
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::InternalServerError => "Internal Server Error",
        }
    }
}

/// Content type used when none is set.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf8";

/// Builder for an HTTP/1.1 response.
///
/// `Content-Length` is always computed from the body; a `Content-Type` of
/// [`DEFAULT_CONTENT_TYPE`] is added when none was set.
///
/// ```
/// use wiregate::codec::{HttpResponse, StatusCode};
///
/// let text = HttpResponse::new(StatusCode::BadRequest).render("api not found.");
/// assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
/// assert!(text.ends_with("Content-Length: 14\r\n\r\napi not found."));
/// ```
#[derive(Clone, Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
}

impl HttpResponse {
    /// Start a response with `status` and no headers.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
        }
    }

    /// Status of this response.
    #[must_use]
    pub fn status(&self) -> StatusCode { self.status }

    /// Set a header, replacing any earlier value under the same name.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&key));
        self.headers.push((key, value.into()));
        self
    }

    /// Serialise the full response with `body`.
    #[must_use]
    pub fn render(&self, body: &str) -> String {
        let mut out = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status.code(),
            self.status.reason()
        );
        let mut has_content_type = false;
        for (key, value) in &self.headers {
            if key.eq_ignore_ascii_case("content-length") {
                continue;
            }
            has_content_type |= key.eq_ignore_ascii_case("content-type");
            let _ = write!(out, "{key}: {value}\r\n");
        }
        if !has_content_type {
            let _ = write!(out, "Content-Type: {DEFAULT_CONTENT_TYPE}\r\n");
        }
        let _ = write!(out, "Content-Length: {}\r\n\r\n{body}", body.len());
        out
    }

    /// Render into verbatim outbound bytes.
    #[must_use]
    pub fn into_outbound(self, body: &str) -> Outbound { Outbound::raw(self.render(body)) }
}
