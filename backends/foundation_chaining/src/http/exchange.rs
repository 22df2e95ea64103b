//! One request paired with the channel its response is written to.

use std::io::{self, Write};

use crate::http::wire::{reason_phrase, HttpRequest, HttpResponse, Method};

/// Body framing announced when the status line is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLength {
    /// Headers only; nothing follows.
    None,
    /// Exactly this many body bytes follow.
    Fixed(usize),
}

/// Request/response pair handed through the chain.
///
/// The response sink is released by [`HttpExchange::close`] or, failing
/// that, when the exchange is dropped.
pub struct HttpExchange {
    request: HttpRequest,
    sink: Option<Box<dyn Write + Send>>,
    response_headers: Vec<(String, String)>,
    status: Option<u16>,
}

impl HttpExchange {
    #[must_use]
    pub fn new(request: HttpRequest, sink: Box<dyn Write + Send>) -> Self {
        Self {
            request,
            sink: Some(sink),
            response_headers: Vec::new(),
            status: None,
        }
    }

    #[must_use]
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.request.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.request.path
    }

    /// Status sent so far, if the response has started.
    #[must_use]
    pub fn response_status(&self) -> Option<u16> {
        self.status
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }

    /// Queues a header for the next `send_response_headers`.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.response_headers.push((name.into(), value.into()));
    }

    fn sink(&mut self) -> io::Result<&mut Box<dyn Write + Send>> {
        self.sink
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "exchange already closed"))
    }

    /// Writes the status line and headers.
    ///
    /// # Errors
    ///
    /// Fails if headers were already sent, the exchange is closed, or the
    /// sink rejects the write.
    pub fn send_response_headers(&mut self, status: u16, length: ResponseLength) -> io::Result<()> {
        if self.status.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "response headers already sent",
            ));
        }

        let mut head = format!("HTTP/1.1 {status} {}\r\n", reason_phrase(status));
        for (key, value) in &self.response_headers {
            head.push_str(&format!("{key}: {value}\r\n"));
        }
        let content_length = match length {
            ResponseLength::None => 0,
            ResponseLength::Fixed(bytes) => bytes,
        };
        head.push_str(&format!("Content-Length: {content_length}\r\n"));
        head.push_str("Connection: close\r\n\r\n");

        self.sink()?.write_all(head.as_bytes())?;
        self.status = Some(status);
        Ok(())
    }

    /// Writes body bytes after the headers.
    ///
    /// # Errors
    ///
    /// Fails if headers were not sent yet or the sink rejects the write.
    pub fn write_body(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.status.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "response headers not sent",
            ));
        }
        self.sink()?.write_all(bytes)
    }

    /// Sends a buffered response; the body is omitted for HEAD requests.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`Self::send_response_headers`] and
    /// [`Self::write_body`].
    pub fn send(&mut self, response: HttpResponse) -> io::Result<()> {
        self.response_headers.extend(response.headers);
        if self.request.method == Method::HEAD || response.body.is_empty() {
            return self.send_response_headers(response.status, ResponseLength::None);
        }
        self.send_response_headers(response.status, ResponseLength::Fixed(response.body.len()))?;
        self.write_body(&response.body)
    }

    /// Flushes and releases the response sink. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(err) = sink.flush() {
                tracing::debug!(
                    "Failed to flush response for {} {}: {err}",
                    self.request.method,
                    self.request.path
                );
            }
        }
    }
}

impl Drop for HttpExchange {
    fn drop(&mut self) {
        self.close();
    }
}

impl core::fmt::Debug for HttpExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpExchange")
            .field("request", &self.request)
            .field("status", &self.status)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
