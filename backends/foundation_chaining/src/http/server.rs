//! Test HTTP server implementation.
//!
//! WHY: Gives tests a real socket to point clients at while the chain
//! decides who answers each request.
//!
//! WHAT: `TestHttpServer` that listens on localhost, parses one request per
//! connection and hands it to a [`ChainingHandler`].
//!
//! HOW: Uses stdlib's `TcpListener` polled from a background thread, with one
//! worker thread per accepted connection so response bodies stream in
//! parallel.

use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::chain::ChainingHandler;
use crate::counter::RequestId;
use crate::errors::{MultiCauseError, ServerError, ServerResult};
use crate::handler::{HandlerFactory, TrackingHandler};
use crate::precondition::Ready;

use super::config::ServerConfig;
use super::exchange::HttpExchange;
use super::wire::{HttpRequest, HttpResponse};

/// Test HTTP server with a chain of handlers in front of it.
///
/// # Purpose (WHY)
///
/// Lets a test register ordered expectations, drive real HTTP traffic and
/// get every mismatch back from one `assert_complete` call.
///
/// # Examples
///
/// ```rust
/// use foundation_chaining::{ExpectRequest, TestHttpServer};
///
/// let server = TestHttpServer::start().expect("server binds");
/// server.add_handler(ExpectRequest::get("/a").respond_with("OK"));
///
/// // point a client at server.url("/a") ...
///
/// // nothing was requested, so the expectation reports itself
/// assert!(server.assert_complete().is_err());
/// ```
pub struct TestHttpServer {
    addr: SocketAddr,
    base_url: String,
    chain: Arc<ChainingHandler>,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TestHttpServer {
    /// Start a new test HTTP server on a random localhost port.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the listener cannot be bound.
    pub fn start() -> ServerResult<Self> {
        Self::with_config(ServerConfig::new())
    }

    /// Start a server with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the listener cannot be bound or
    /// switched to non-blocking mode.
    pub fn with_config(config: ServerConfig) -> ServerResult<Self> {
        let listener = TcpListener::bind(config.get_bind_addr())?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let counter = config.get_counter().cloned().unwrap_or_default();
        let chain = Arc::new(ChainingHandler::new(counter, Ready::shared()));
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let chain = Arc::clone(&chain);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name(format!("test-http-accept-{}", addr.port()))
                .spawn(move || Self::accept_loop(&listener, &chain, &running, &config))?
        };

        tracing::info!("TestHttpServer listening on {addr}");
        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            chain,
            running,
            handle: Some(handle),
        })
    }

    fn accept_loop(
        listener: &TcpListener,
        chain: &Arc<ChainingHandler>,
        running: &AtomicBool,
        config: &ServerConfig,
    ) {
        while running.load(Ordering::Acquire) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    tracing::debug!("Got a client connection: {peer:?}");
                    let chain = Arc::clone(chain);
                    let config = config.clone();
                    let spawned = thread::Builder::new()
                        .name(format!("test-http-conn-{}", peer.port()))
                        .spawn(move || {
                            if let Err(err) = Self::handle_connection(stream, &chain, &config) {
                                tracing::info!("TestHttpServer connection error: {err}");
                            }
                        });
                    if let Err(err) = spawned {
                        tracing::error!("TestHttpServer failed to spawn connection thread: {err}");
                    }
                }
                Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(config.get_poll_interval());
                }
                Err(err) => {
                    tracing::error!("TestHttpServer accept error: {err}");
                    break;
                }
            }
        }
        tracing::debug!("TestHttpServer accept loop stopped");
    }

    /// Parses one request and passes it to the chain.
    fn handle_connection(
        stream: TcpStream,
        chain: &ChainingHandler,
        config: &ServerConfig,
    ) -> ServerResult<Option<RequestId>> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(config.get_read_timeout())?;

        let parsed = {
            let mut reader = BufReader::new(&stream);
            HttpRequest::read_from(
                &mut reader,
                config.get_max_head_bytes(),
                config.get_max_body_bytes(),
            )
        };

        match parsed {
            Ok(request) => {
                let exchange = HttpExchange::new(request, Box::new(stream));
                Ok(Some(chain.handle(exchange)))
            }
            Err(err @ ServerError::Io(_)) => Err(err),
            Err(err) => {
                tracing::error!("Rejecting unreadable request: {err}");
                Self::reject(stream, &err)?;
                Ok(None)
            }
        }
    }

    fn reject(mut stream: TcpStream, err: &ServerError) -> ServerResult<()> {
        let status = match err {
            ServerError::RequestTooLarge(_) => 431,
            ServerError::BodyTooLarge(_) => 413,
            _ => 400,
        };
        let response = HttpResponse::with_status(status, err.to_string());
        stream.write_all(&response.render())?;
        stream.flush()?;
        Ok(())
    }

    /// Get full URL for a path on this test server.
    ///
    /// ```rust
    /// use foundation_chaining::TestHttpServer;
    ///
    /// let server = TestHttpServer::start().unwrap();
    /// assert!(server.url("/test").starts_with("http://127.0.0.1:"));
    /// assert!(server.url("/test").ends_with("/test"));
    /// ```
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Base URL without path (e.g., "<http://127.0.0.1:54321>")
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The chain every request on this server is dispatched through.
    #[must_use]
    pub fn chain(&self) -> &Arc<ChainingHandler> {
        &self.chain
    }

    /// See [`ChainingHandler::add_handler`].
    pub fn add_handler<H, F>(&self, factory: F) -> Arc<H>
    where
        H: TrackingHandler + 'static,
        F: HandlerFactory<H>,
    {
        self.chain.add_handler(factory)
    }

    /// See [`ChainingHandler::wait_for_requests`].
    pub fn wait_for_requests(&self, count: usize) {
        self.chain.wait_for_requests(count);
    }

    /// See [`ChainingHandler::assert_complete`].
    ///
    /// # Errors
    ///
    /// Every failure recorded by the chain, as one error.
    pub fn assert_complete(&self) -> Result<(), MultiCauseError> {
        self.chain.assert_complete()
    }

    /// Stops accepting connections and joins the accept thread.
    ///
    /// Connections already accepted finish on their own threads.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("TestHttpServer accept thread panicked");
            }
        }
    }
}

impl Drop for TestHttpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl core::fmt::Debug for TestHttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestHttpServer")
            .field("addr", &self.addr)
            .field("chain", &self.chain)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::RequestCounter;
    use std::io::Read;

    fn raw_exchange(server: &TestHttpServer, raw: &[u8]) -> String {
        let mut client = TcpStream::connect(server.local_addr()).unwrap();
        client.write_all(raw).unwrap();
        let mut response = String::new();
        client.read_to_string(&mut response).unwrap();
        response
    }

    /// WHY: Verify TestHttpServer can start and provides valid URL
    /// WHAT: Tests basic construction and URL generation
    #[test]
    fn test_server_start() {
        let server = TestHttpServer::start().unwrap();
        assert!(server.base_url().starts_with("http://127.0.0.1:"));
        assert!(server.url("/test").ends_with("/test"));
    }

    /// WHY: Unparseable requests must not reach the chain
    /// WHAT: Garbage gets a 400 and the request count stays at zero
    #[test]
    #[ntest::timeout(10000)]
    fn test_malformed_request_is_rejected_before_the_chain() {
        let server = TestHttpServer::start().unwrap();
        let response = raw_exchange(&server, b"NOT-HTTP\r\n\r\n");

        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert_eq!(server.chain().request_count(), 0);
        assert!(server.assert_complete().is_ok());
    }

    /// WHY: A client-announced body size must never decide allocation
    /// WHAT: Oversized Content-Length values get 413 and never reach the chain
    #[test]
    #[ntest::timeout(10000)]
    fn test_oversized_body_is_rejected_with_413() {
        let config = ServerConfig::new().max_body_bytes(1024);
        let server = TestHttpServer::with_config(config).unwrap();

        for length in ["2048", "70368744177664", "18446744073709551615"] {
            let raw = format!("PUT /big HTTP/1.1\r\nContent-Length: {length}\r\n\r\n");
            let response = raw_exchange(&server, raw.as_bytes());
            assert!(
                response.starts_with("HTTP/1.1 413 Payload Too Large\r\n"),
                "{length}: {response}"
            );
        }

        assert_eq!(server.chain().request_count(), 0);
        assert!(server.assert_complete().is_ok());
    }

    /// WHY: A head that exactly fills the limit is still too large
    /// WHAT: The request is answered 431 rather than 400
    #[test]
    #[ntest::timeout(10000)]
    fn test_head_filling_the_limit_gets_431() {
        let head = "GET / HTTP/1.1\r\nX-A: b\r\n";
        let config = ServerConfig::new().max_head_bytes(head.len());
        let server = TestHttpServer::with_config(config).unwrap();

        let response = raw_exchange(&server, format!("{head}\r\n").as_bytes());
        assert!(response.starts_with("HTTP/1.1 431 Request Header Fields Too Large\r\n"));
    }

    /// WHY: Raw sockets see exactly the framing the chain writes
    /// WHAT: An unmatched GET over TCP returns the 500 body and closes
    #[test]
    #[ntest::timeout(10000)]
    fn test_unmatched_request_over_raw_socket() {
        let server = TestHttpServer::start().unwrap();
        let response = raw_exchange(&server, b"GET /nothing HTTP/1.1\r\nHost: x\r\n\r\n");

        assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(response.ends_with("Failed GET request to /nothing"));
    }

    /// WHY: Servers sharing a counter must never reuse an id
    /// WHAT: Two servers built from one counter hand out 1 then 2
    #[test]
    #[ntest::timeout(10000)]
    fn test_servers_share_a_counter() {
        let counter = RequestCounter::new();
        let config = ServerConfig::new().counter(counter.clone());
        let first = TestHttpServer::with_config(config.clone()).unwrap();
        let second = TestHttpServer::with_config(config).unwrap();

        raw_exchange(&first, b"GET /one HTTP/1.1\r\n\r\n");
        raw_exchange(&second, b"GET /two HTTP/1.1\r\n\r\n");

        assert_eq!(first.chain().request_ids(), vec![RequestId::new(1)]);
        assert_eq!(second.chain().request_ids(), vec![RequestId::new(2)]);
        assert_eq!(counter.current(), 2);
    }

    /// WHY: Verify server stops cleanly when dropped
    /// WHAT: Tests Drop implementation joins the accept thread
    #[test]
    #[ntest::timeout(10000)]
    fn test_server_drop() {
        let addr = {
            let server = TestHttpServer::start().unwrap();
            server.local_addr()
        };
        assert!(TcpStream::connect(addr).is_err());
    }
}
