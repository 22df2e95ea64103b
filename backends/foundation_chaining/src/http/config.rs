//! Test server configuration.

use core::time::Duration;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::counter::RequestCounter;

/// Configuration for [`super::TestHttpServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind; port 0 picks a free port
    bind_addr: SocketAddr,
    /// Socket read timeout while parsing a request
    read_timeout: Option<Duration>,
    /// Sleep between polls of the non-blocking listener
    poll_interval: Duration,
    /// Upper bound on request line plus headers
    max_head_bytes: usize,
    /// Upper bound on a request body, announced or streamed
    max_body_bytes: usize,
    /// Id source shared with other servers, if any
    counter: Option<RequestCounter>,
}

impl ServerConfig {
    /// Creates a configuration with default values.
    ///
    /// Defaults:
    /// - `bind_addr`: `127.0.0.1:0`
    /// - `read_timeout`: 30 seconds
    /// - `poll_interval`: 10 milliseconds
    /// - `max_head_bytes`: 64 KiB
    /// - `max_body_bytes`: 16 MiB
    /// - `counter`: a fresh counter per server
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)),
            read_timeout: Some(Duration::from_secs(30)),
            poll_interval: Duration::from_millis(10),
            max_head_bytes: 64 * 1024,
            max_body_bytes: 16 * 1024 * 1024,
            counter: None,
        }
    }

    #[must_use]
    pub const fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Sets the read timeout; `None` waits forever for slow clients.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn max_head_bytes(mut self, bytes: usize) -> Self {
        self.max_head_bytes = bytes;
        self
    }

    /// Larger bodies are answered with 413 before any of the body is read.
    #[must_use]
    pub const fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Draws request ids from `counter`, shared with whoever else holds it.
    #[must_use]
    pub fn counter(mut self, counter: RequestCounter) -> Self {
        self.counter = Some(counter);
        self
    }

    #[must_use]
    pub const fn get_bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    #[must_use]
    pub const fn get_read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    #[must_use]
    pub const fn get_poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub const fn get_max_head_bytes(&self) -> usize {
        self.max_head_bytes
    }

    #[must_use]
    pub const fn get_max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    #[must_use]
    pub fn get_counter(&self) -> Option<&RequestCounter> {
        self.counter.as_ref()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
