//! Minimal HTTP/1.1 request reading and response rendering.
//!
//! WHY: The test server only needs the request line, headers and an
//! optional body, and always answers with `Connection: close`.
//!
//! WHAT: [`HttpRequest`] parsed from any `BufRead`, [`HttpResponse`] rendered
//! to bytes, and the [`Method`] token shared by both.
//!
//! HOW: Reads the head line by line up to a byte limit, then the body by
//! `Content-Length` or chunked framing up to a second limit. Bodies grow as
//! bytes arrive; nothing is allocated from a client-announced size.

use std::io::{BufRead, Read};

use crate::errors::{ServerError, ServerResult};

/// HTTP request method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    HEAD,
    POST,
    PUT,
    DELETE,
    PATCH,
    OPTIONS,
    Custom(String),
}

impl Method {
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        match token {
            "GET" => Self::GET,
            "HEAD" => Self::HEAD,
            "POST" => Self::POST,
            "PUT" => Self::PUT,
            "DELETE" => Self::DELETE,
            "PATCH" => Self::PATCH,
            "OPTIONS" => Self::OPTIONS,
            other => Self::Custom(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::GET => "GET",
            Self::HEAD => "HEAD",
            Self::POST => "POST",
            Self::PUT => "PUT",
            Self::DELETE => "DELETE",
            Self::PATCH => "PATCH",
            Self::OPTIONS => "OPTIONS",
            Self::Custom(token) => token,
        }
    }
}

impl core::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Path portion of the request target (e.g., "/test")
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: Option<String>,
    /// HTTP version (e.g., "HTTP/1.1")
    pub proto: String,
    /// Request headers in arrival order
    pub headers: Vec<(String, String)>,
    /// Body of the request
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Builds a bodiless HTTP/1.1 request, mostly for driving a chain directly.
    #[must_use]
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method,
            path,
            query,
            proto: "HTTP/1.1".to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First header value with the given name, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Reads one request from `reader`.
    ///
    /// # Errors
    ///
    /// [`ServerError::MalformedRequest`] for an unparseable head or body
    /// framing, [`ServerError::RequestTooLarge`] when the head exceeds
    /// `max_head_bytes`, [`ServerError::BodyTooLarge`] when the body exceeds
    /// `max_body_bytes`, and [`ServerError::Io`] for socket failures.
    pub fn read_from<R: BufRead>(
        reader: &mut R,
        max_head_bytes: usize,
        max_body_bytes: usize,
    ) -> ServerResult<Self> {
        let mut head_budget = max_head_bytes;

        let request_line = read_head_line(reader, &mut head_budget, max_head_bytes)?;
        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(target), Some(proto), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ServerError::malformed(format!(
                "bad request line {request_line:?}"
            )));
        };
        if !proto.starts_with("HTTP/") {
            return Err(ServerError::malformed(format!("bad protocol {proto:?}")));
        }

        let mut headers = Vec::new();
        loop {
            let line = read_head_line(reader, &mut head_budget, max_head_bytes)?;
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(ServerError::malformed(format!("bad header line {line:?}")));
            };
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        let (path, query) = split_target(target);
        let mut request = Self {
            method: Method::from_token(method),
            path,
            query,
            proto: proto.to_string(),
            headers,
            body: Vec::new(),
        };
        request.body = request.read_body(reader, max_body_bytes)?;

        tracing::debug!(
            "Parsed request: method: {}, path: {}, proto: {}, body bytes: {}",
            request.method,
            request.path,
            request.proto,
            request.body.len()
        );
        Ok(request)
    }

    fn read_body<R: BufRead>(&self, reader: &mut R, limit: usize) -> ServerResult<Vec<u8>> {
        let chunked = self
            .header("Transfer-Encoding")
            .is_some_and(|value| value.to_ascii_lowercase().contains("chunked"));
        if chunked {
            return read_chunked_body(reader, limit);
        }

        let Some(length) = self.header("Content-Length") else {
            return Ok(Vec::new());
        };
        let length: usize = length
            .parse()
            .map_err(|_| ServerError::malformed(format!("bad Content-Length {length:?}")))?;

        if length > limit {
            return Err(ServerError::BodyTooLarge(limit));
        }

        let mut body = Vec::new();
        read_exactly(reader, length, &mut body)?;
        Ok(body)
    }
}

fn split_target(target: &str) -> (String, Option<String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    }
}

fn read_head_line<R: BufRead>(
    reader: &mut R,
    budget: &mut usize,
    limit: usize,
) -> ServerResult<String> {
    if *budget == 0 {
        return Err(ServerError::RequestTooLarge(limit));
    }

    let mut raw = Vec::new();
    let allowed = u64::try_from(*budget).unwrap_or(u64::MAX);
    let read = reader.by_ref().take(allowed).read_until(b'\n', &mut raw)?;

    if read == 0 {
        return Err(ServerError::malformed("connection closed before request head ended"));
    }
    if raw.last() != Some(&b'\n') {
        return Err(ServerError::RequestTooLarge(limit));
    }
    *budget -= read;

    while matches!(raw.last(), Some(b'\n' | b'\r')) {
        raw.pop();
    }
    String::from_utf8(raw).map_err(|_| ServerError::malformed("request head is not UTF-8"))
}

/// Appends exactly `length` bytes from `reader` to `body`, growing it as
/// bytes arrive.
fn read_exactly<R: Read>(reader: &mut R, length: usize, body: &mut Vec<u8>) -> ServerResult<()> {
    let wanted = u64::try_from(length).unwrap_or(u64::MAX);
    let read = reader.by_ref().take(wanted).read_to_end(body)?;
    if read < length {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("request body ended after {read} of {length} bytes"),
        )
        .into());
    }
    Ok(())
}

const MAX_CHUNK_LINE: u64 = 4 * 1024;

/// Reads one chunk-size or trailer line, bounded so a client cannot stream
/// an endless line.
fn read_chunk_line<R: BufRead>(reader: &mut R) -> ServerResult<String> {
    let mut raw = Vec::new();
    let read = reader.by_ref().take(MAX_CHUNK_LINE).read_until(b'\n', &mut raw)?;
    if read as u64 == MAX_CHUNK_LINE && raw.last() != Some(&b'\n') {
        return Err(ServerError::malformed("chunk line too long"));
    }
    String::from_utf8(raw).map_err(|_| ServerError::malformed("chunk line is not UTF-8"))
}

fn read_chunked_body<R: BufRead>(reader: &mut R, limit: usize) -> ServerResult<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let size_line = read_chunk_line(reader)?;
        let size_token = size_line.trim().split(';').next().unwrap_or_default();
        let size = usize::from_str_radix(size_token, 16)
            .map_err(|_| ServerError::malformed(format!("bad chunk size {size_token:?}")))?;

        if size == 0 {
            // trailers, terminated by an empty line
            loop {
                let trailer = read_chunk_line(reader)?;
                if trailer.trim().is_empty() {
                    return Ok(body);
                }
            }
        }

        match body.len().checked_add(size) {
            Some(total) if total <= limit => {}
            _ => return Err(ServerError::BodyTooLarge(limit)),
        }
        read_exactly(reader, size, &mut body)?;

        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf)?;
        if &crlf != b"\r\n" {
            return Err(ServerError::malformed("chunk not terminated by CRLF"));
        }
    }
}

/// Response with a fully buffered body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code (e.g., 200)
    pub status: u16,
    /// Response headers, excluding the framing headers added on send
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create 200 OK response with a plain-text body.
    #[must_use]
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::with_status(200, body)
    }

    /// Create a plain-text response with any status.
    #[must_use]
    pub fn with_status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: vec![(
                "Content-Type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )],
            body: body.into(),
        }
    }

    /// Create 302 redirect response.
    #[must_use]
    pub fn redirect(location: &str) -> Self {
        Self {
            status: 302,
            headers: vec![("Location".to_string(), location.to_string())],
            body: Vec::new(),
        }
    }

    /// Create custom status response with no body.
    #[must_use]
    pub fn status(code: u16) -> Self {
        Self {
            status: code,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Render response to HTTP/1.1 format, framing headers included.
    #[must_use]
    pub fn render(&self) -> Vec<u8> {
        let mut response = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status,
            reason_phrase(self.status)
        );

        for (key, value) in &self.headers {
            response.push_str(&format!("{key}: {value}\r\n"));
        }
        response.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        response.push_str("Connection: close\r\n\r\n");

        let mut bytes = response.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

/// Canonical reason phrase for a status code, `Unknown` for codes outside
/// the registered set.
#[must_use]
pub fn reason_phrase(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown")
}
